//! Storage seams for the chunked document layer
//!
//! This crate defines the two external collaborators of the storage layer
//! and a reference in-memory engine:
//! - DocumentCodec: byte-exact encode/decode of logical documents
//! - DocumentDriver / DriverConnector: the document-database seam
//!   (upserts, ordered bulk writes, secondary/TTL indexes, filtered finds)
//! - MemoryDriver: in-memory driver with read-time TTL expiry, used by the
//!   test suites and as the development backend

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod driver;
pub mod filter;
pub mod memory;

pub use codec::{DocumentCodec, JsonCodec};
pub use driver::{
    BulkSummary, ClientOptions, DocumentDriver, DriverConnector, DriverError, DriverResult,
    FindOptions, IndexInfo, IndexSpec, Record, SortOrder, UpdateDoc, WriteOp,
};
pub use memory::{MemoryConnector, MemoryDriver};
