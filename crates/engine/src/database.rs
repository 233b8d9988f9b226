//! Database facade and collection registry
//!
//! One [`Database`] owns the connection manager, the document codec and a
//! name-keyed registry of [`Collection`] handles. Registration is
//! idempotent by default: asking for an already-registered name returns
//! the existing handle, so every caller shares one initialization state
//! per collection. Exclusive registration is available for callers that
//! must own a name outright.

use chunkstore_core::{Error, Result};
use chunkstore_storage::{DocumentCodec, DriverConnector, JsonCodec};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::collection::{Collection, CollectionConfig};
use crate::config::EngineConfig;
use crate::connection::ConnectionManager;
use crate::reference::{DocRef, DocRefBuilder};

/// Entry point of the storage layer.
pub struct Database {
    conn: Arc<ConnectionManager>,
    codec: Arc<dyn DocumentCodec>,
    collections: DashMap<String, Arc<Collection>>,
}

impl Database {
    /// A database over `connector` with the JSON codec.
    pub fn new(connector: Arc<dyn DriverConnector>, config: EngineConfig) -> Self {
        Database::with_codec(connector, config, Arc::new(JsonCodec))
    }

    /// A database with an explicit document codec for chunked payloads.
    pub fn with_codec(
        connector: Arc<dyn DriverConnector>,
        config: EngineConfig,
        codec: Arc<dyn DocumentCodec>,
    ) -> Self {
        Database {
            conn: Arc::new(ConnectionManager::new(connector, config)),
            codec,
            collections: DashMap::new(),
        }
    }

    /// Apply the startup connect policy: block on connectivity in
    /// production, kick off a background attempt in development.
    pub async fn initialize(&self) -> Result<()> {
        self.conn.initialize().await
    }

    /// The connection manager.
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.conn
    }

    /// The registered collection for `config.name`, creating it on first
    /// request. A later registration under the same name returns the
    /// existing handle; its configuration wins.
    pub fn collection(&self, config: CollectionConfig) -> Arc<Collection> {
        let entry = self
            .collections
            .entry(config.name.clone())
            .or_insert_with(|| {
                debug!(collection = %config.name, "registering collection");
                Arc::new(Collection::new(
                    config,
                    Arc::clone(&self.conn),
                    Arc::clone(&self.codec),
                ))
            });
        Arc::clone(entry.value())
    }

    /// Register a collection that must not exist yet.
    pub fn define_collection(&self, config: CollectionConfig) -> Result<Arc<Collection>> {
        match self.collections.entry(config.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::Config(format!(
                "collection '{}' is already registered",
                config.name
            ))),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                debug!(collection = %config.name, "registering collection (exclusive)");
                let collection = Arc::new(Collection::new(
                    config,
                    Arc::clone(&self.conn),
                    Arc::clone(&self.codec),
                ));
                vacant.insert(Arc::clone(&collection));
                Ok(collection)
            }
        }
    }

    /// An already-registered collection by name.
    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Start building a reference into a registered-or-new collection.
    pub fn reference(
        &self,
        config: CollectionConfig,
        path: impl Into<chunkstore_core::DocPath>,
    ) -> DocRefBuilder {
        DocRef::builder(self.collection(config), path)
    }

    /// Drop the connection. Registered collections survive and reconnect
    /// lazily on next use.
    pub async fn close(&self) {
        self.conn.close().await;
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("codec", &self.codec.codec_id())
            .field("collections", &self.collections.len())
            .finish()
    }
}
