//! Shared test utilities for the storage-layer integration suite.

#![allow(dead_code)]

use chunkstore::{
    CollectionConfig, Database, EngineConfig, MemoryConnector, MemoryDriver, Mode,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};

static INIT_TRACING: Once = Once::new();

fn ensure_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
            .try_init();
    });
}

/// Test database wrapper keeping a handle on the physical driver so tests
/// can inspect raw chunk/reference records and inject faults.
pub struct TestDb {
    pub db: Database,
    pub driver: Arc<MemoryDriver>,
}

impl TestDb {
    pub fn new() -> Self {
        Self::with_mode(Mode::Development)
    }

    pub fn with_mode(mode: Mode) -> Self {
        ensure_tracing();
        let driver = Arc::new(MemoryDriver::new());
        let connector = Arc::new(MemoryConnector::with_driver(Arc::clone(&driver)));
        TestDb {
            db: Database::new(connector, EngineConfig::with_mode(mode)),
            driver,
        }
    }

    /// A fresh database over the same physical driver, as after a process
    /// restart: registry and initialization state reset, data retained.
    pub fn restart(&self) -> TestDb {
        let connector = Arc::new(MemoryConnector::with_driver(Arc::clone(&self.driver)));
        TestDb {
            db: Database::new(connector, EngineConfig::default()),
            driver: Arc::clone(&self.driver),
        }
    }
}

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// A collection name unique within the test process.
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}_{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// Small chunk size used by the chunking scenarios so a dozens-of-bytes
/// document spans several chunks.
pub const TINY_CHUNK: usize = 16;

/// Collection config with the tiny chunk size.
pub fn tiny_chunk_config(name: &str) -> CollectionConfig {
    CollectionConfig::new(name).chunk_size(TINY_CHUNK)
}
