//! Chunkstore: chunked document storage over a document database
//!
//! A storage layer for logical JSON documents addressed by path, built for
//! backends that cap the size of a single record. Documents above the
//! configured chunk size are split into fixed-size chunk records plus a
//! reference record, written as one ordered batch so readers always see a
//! complete document. Collections self-initialize lazily (physical
//! collection, indexes, TTL reconciliation) and expire records a fixed
//! duration after their first write.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use chunkstore::{
//!     CollectionConfig, Database, EngineConfig, MemoryConnector, SaveOptions,
//! };
//! use serde_json::json;
//!
//! # async fn run() -> chunkstore::Result<()> {
//! let db = Database::new(Arc::new(MemoryConnector::new()), EngineConfig::default());
//! db.initialize().await?;
//!
//! let sessions = db.collection(
//!     CollectionConfig::new("sessions").ttl(std::time::Duration::from_secs(3600)),
//! );
//! sessions.save("sessions/alice", json!({"open": true}), SaveOptions::default()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Crate layout
//!
//! - [`chunkstore_core`]: document paths, reserved fields, merge rules,
//!   the error hierarchy
//! - [`chunkstore_storage`]: the codec and driver seams plus the in-memory
//!   reference driver
//! - [`chunkstore_engine`]: connection lifecycle, collections, references,
//!   the database facade

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use chunkstore_core::{
    fill_defaults, merge_into, DocPath, Error, Result, FIELD_CHUNK, FIELD_CHUNK_COUNT,
    FIELD_CREATED, FIELD_DATA, FIELD_PATH, FIELD_VALUE, FIELD_VERSION, PATH_SEPARATOR,
    REFERENCE_CHUNK_INDEX,
};
pub use chunkstore_engine::{
    Collection, CollectionConfig, ConnectionManager, Database, DefaultValue, DeleteOptions,
    DocContainer, DocRef, DocRefBuilder, EngineConfig, LoadHook, LoadOptions, Mode, SaveOptions,
    VersionTransform, DEFAULT_CHUNK_SIZE,
};
pub use chunkstore_storage::{
    BulkSummary, ClientOptions, DocumentCodec, DocumentDriver, DriverConnector, DriverError,
    DriverResult, FindOptions, IndexInfo, IndexSpec, JsonCodec, MemoryConnector, MemoryDriver,
    Record, SortOrder, UpdateDoc, WriteOp,
};
