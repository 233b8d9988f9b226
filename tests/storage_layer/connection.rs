//! Connection lifecycle and the collection registry.

use crate::common::{unique_name, TestDb};
use chunkstore::{
    ClientOptions, CollectionConfig, Database, DocumentDriver, DriverConnector, DriverError,
    DriverResult, EngineConfig, Error, LoadOptions, MemoryConnector, Mode, SaveOptions,
};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct CountingConnector {
    inner: MemoryConnector,
    attempts: AtomicU64,
}

impl CountingConnector {
    fn new() -> Self {
        CountingConnector {
            inner: MemoryConnector::new(),
            attempts: AtomicU64::new(0),
        }
    }
}

#[async_trait::async_trait]
impl DriverConnector for CountingConnector {
    async fn connect(&self, options: &ClientOptions) -> DriverResult<Arc<dyn DocumentDriver>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.connect(options).await
    }
}

struct FailingConnector;

#[async_trait::async_trait]
impl DriverConnector for FailingConnector {
    async fn connect(&self, _options: &ClientOptions) -> DriverResult<Arc<dyn DocumentDriver>> {
        Err(DriverError::new("connection refused"))
    }
}

#[tokio::test]
async fn test_operations_share_one_connection() {
    let connector = Arc::new(CountingConnector::new());
    let db = Database::new(connector.clone(), EngineConfig::default());
    let docs = db.collection(CollectionConfig::new(unique_name("docs")));
    let more = db.collection(CollectionConfig::new(unique_name("more")));

    let saves: Vec<_> = (0..8)
        .map(|n| {
            let target = if n % 2 == 0 { Arc::clone(&docs) } else { Arc::clone(&more) };
            tokio::spawn(async move {
                target
                    .save(format!("p{n}"), json!({"n": n}), SaveOptions::default())
                    .await
                    .map(|_| ())
            })
        })
        .collect();
    for save in saves {
        save.await.unwrap().unwrap();
    }
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_production_startup_fails_fast() {
    let db = Database::new(Arc::new(FailingConnector), EngineConfig::with_mode(Mode::Production));
    let err = db.initialize().await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
}

#[tokio::test]
async fn test_development_startup_defers_failure_to_first_use() {
    let db = Database::new(Arc::new(FailingConnector), EngineConfig::default());
    db.initialize().await.unwrap();
    let docs = db.collection(CollectionConfig::new(unique_name("docs")));
    let err = docs.load("p1", LoadOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
}

#[tokio::test]
async fn test_close_then_reconnect_preserves_data() {
    let env = TestDb::new();
    let docs = env.db.collection(CollectionConfig::new(unique_name("docs")));
    docs.save("p1", json!({"a": 1}), SaveOptions::default()).await.unwrap();

    env.db.close().await;
    env.db.close().await;
    assert!(!env.db.connection().is_connected().await);

    // Next operation reconnects lazily and sees the same backing data.
    let loaded = docs.load("p1", LoadOptions::default()).await.unwrap();
    assert_eq!(loaded, Some(json!({"a": 1})));
    assert!(env.db.connection().is_connected().await);
}

#[tokio::test]
async fn test_registry_returns_shared_handles() {
    let env = TestDb::new();
    let name = unique_name("docs");
    let first = env.db.collection(CollectionConfig::new(&name));
    let second = env.db.collection(CollectionConfig::new(&name));
    assert!(Arc::ptr_eq(&first, &second));

    let err = env.db.define_collection(CollectionConfig::new(&name)).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn test_initialization_runs_once_per_collection() {
    let env = TestDb::new();
    let name = unique_name("docs");
    let docs = env.db.collection(CollectionConfig::new(&name));

    let writers: Vec<_> = (0..8)
        .map(|n| {
            let docs = Arc::clone(&docs);
            tokio::spawn(async move {
                docs.save(format!("p{n}"), json!({"n": n}), SaveOptions::default())
                    .await
                    .map(|_| ())
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap().unwrap();
    }
    // A single default path index regardless of racing initializers.
    let indexes = env.driver.list_indexes(&name).await.unwrap();
    assert_eq!(indexes.len(), 1);
}
