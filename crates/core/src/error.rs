//! Error types for the chunked document storage layer
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! "Not found" is deliberately **not** an error: the load surface returns
//! `Option<Value>`, so callers can never mistake a configuration mistake for
//! a missing document.

use thiserror::Error;

/// Result type alias for storage-layer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the chunked document storage layer
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration or API misuse (e.g. record version without a
    /// transform function, mutually exclusive load options). Fatal, never
    /// retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection failure. Fatal at startup in production mode,
    /// surfaced lazily to the first caller in development mode.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Underlying driver failure during a read/write/list/aggregate
    /// operation. The failing operation and collection are included so
    /// callers can decide their own retry policy; this layer never retries.
    #[error("storage {op} failed on collection '{collection}': {message}")]
    Storage {
        /// The operation that failed (e.g. `find`, `bulk_write`)
        op: &'static str,
        /// Name of the physical collection
        collection: String,
        /// Driver-supplied failure description, including the path when known
        message: String,
    },

    /// Operation that the addressed document shape cannot support
    /// (e.g. partial save on a chunked reference).
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Codec failure while encoding or decoding a logical document.
    #[error("codec error: {0}")]
    Codec(String),
}

impl Error {
    /// Build a [`Error::Storage`] with operation and collection context.
    pub fn storage(
        op: &'static str,
        collection: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Storage {
            op,
            collection: collection.into(),
            message: message.into(),
        }
    }
}
