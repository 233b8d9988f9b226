//! Chunked document storage engine
//!
//! This crate orchestrates the storage layer:
//! - ConnectionManager: connection lifecycle with production (blocking) and
//!   development (background) startup policies
//! - Collection: path-addressed CRUD with chunking, TTL reconciliation and
//!   index lifecycle over one physical collection
//! - DocRef / DocContainer: query + load-policy binding with record-version
//!   transforms, defaults and load hooks
//! - Database: owner of the connection manager and the name-keyed
//!   collection registry

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collection;
pub mod config;
pub mod connection;
pub mod database;
pub mod reference;

pub use collection::{
    Collection, CollectionConfig, DeleteOptions, LoadOptions, SaveOptions, DEFAULT_CHUNK_SIZE,
};
pub use config::{EngineConfig, Mode};
pub use connection::ConnectionManager;
pub use database::Database;
pub use reference::{DefaultValue, DocContainer, DocRef, DocRefBuilder, LoadHook, VersionTransform};
