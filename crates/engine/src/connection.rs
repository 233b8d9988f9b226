//! Connection lifecycle management
//!
//! Single source of truth for "are we connected". The connect attempt runs
//! while holding the state mutex, so concurrent callers queue on the lock
//! and observe the established connection instead of starting their own —
//! at most one attempt is ever in flight.
//!
//! The manager also owns the list-once cache of physical collection names
//! used by lazy collection initialization.

use crate::config::EngineConfig;
use chunkstore_core::{Error, Result};
use chunkstore_storage::{DocumentDriver, DriverConnector};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Owns the database connection and its startup policy.
pub struct ConnectionManager {
    connector: Arc<dyn DriverConnector>,
    config: EngineConfig,
    driver: Mutex<Option<Arc<dyn DocumentDriver>>>,
    /// Physical collection names, listed once on first use and kept in
    /// step with collections created through [`Self::ensure_collection`].
    known_collections: Mutex<Option<HashSet<String>>>,
}

impl ConnectionManager {
    /// Build an unconnected manager.
    pub fn new(connector: Arc<dyn DriverConnector>, config: EngineConfig) -> Self {
        ConnectionManager {
            connector,
            config,
            driver: Mutex::new(None),
            known_collections: Mutex::new(None),
        }
    }

    /// The engine configuration this manager was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply the startup policy.
    ///
    /// Production mode connects synchronously and returns only once
    /// connected; a failure here is fatal to startup. Development mode
    /// starts connecting in the background and returns immediately —
    /// callers using the database wait via [`Self::ensure_connection`],
    /// where a background failure surfaces lazily.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        if self.config.mode.is_production() {
            self.ensure_connection().await?;
            return Ok(());
        }
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = manager.ensure_connection().await {
                warn!(error = %e, "background connection attempt failed");
            }
        });
        Ok(())
    }

    /// Connected driver handle, connecting on first use.
    ///
    /// No-op when already connected; otherwise concurrent callers await
    /// the single in-flight attempt. A failed attempt leaves the manager
    /// disconnected, so the next caller retries.
    pub async fn ensure_connection(&self) -> Result<Arc<dyn DocumentDriver>> {
        let mut driver = self.driver.lock().await;
        if let Some(connected) = driver.as_ref() {
            return Ok(Arc::clone(connected));
        }
        debug!(uri = %self.config.client.uri, "connecting");
        let connected = self
            .connector
            .connect(&self.config.client)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        info!(uri = %self.config.client.uri, mode = ?self.config.mode, "database connected");
        *driver = Some(Arc::clone(&connected));
        Ok(connected)
    }

    /// True when a connection is currently held.
    pub async fn is_connected(&self) -> bool {
        self.driver.lock().await.is_some()
    }

    /// Release the client. Idempotent; a later [`Self::ensure_connection`]
    /// reconnects lazily.
    pub async fn close(&self) {
        let released = self.driver.lock().await.take().is_some();
        *self.known_collections.lock().await = None;
        if released {
            info!("database connection closed");
        }
    }

    /// Make sure the named physical collection exists, creating it at most
    /// once per process using the cached name list.
    pub async fn ensure_collection(&self, name: &str) -> Result<()> {
        let driver = self.ensure_connection().await?;
        let mut known = self.known_collections.lock().await;
        if known.is_none() {
            let names = driver
                .list_collections()
                .await
                .map_err(|e| Error::storage("list_collections", name, e.to_string()))?;
            *known = Some(names.into_iter().collect());
        }
        if let Some(known) = known.as_mut() {
            if !known.contains(name) {
                driver
                    .create_collection(name)
                    .await
                    .map_err(|e| Error::storage("create_collection", name, e.to_string()))?;
                known.insert(name.to_string());
                debug!(collection = name, "physical collection created");
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("mode", &self.config.mode)
            .field("uri", &self.config.client.uri)
            .finish()
    }
}
