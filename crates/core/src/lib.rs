//! Core types for the chunked document storage layer
//!
//! This crate defines the foundational types used throughout the system:
//! - DocPath: typed document address (string key or filter object)
//! - Reserved physical-record fields and wrap/strip helpers
//! - Deep key-fill and structural merge over JSON values
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod fields;
pub mod merge;
pub mod path;

pub use error::{Error, Result};
pub use fields::{
    FIELD_CHUNK, FIELD_CHUNK_COUNT, FIELD_CREATED, FIELD_DATA, FIELD_PATH, FIELD_VALUE,
    FIELD_VERSION, PATH_SEPARATOR, REFERENCE_CHUNK_INDEX, RESERVED_FIELDS,
};
pub use merge::{fill_defaults, merge_into};
pub use path::DocPath;
