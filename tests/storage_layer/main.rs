//! Integration suite for the chunked document storage layer.
//!
//! Exercises the public crate surface end to end against the in-memory
//! driver: CRUD and listing, chunked round trips and the chunk-count
//! invariant, TTL anchoring and index reconciliation, reference load
//! policies, and the connection lifecycle.

mod common;

mod chunking;
mod connection;
mod references;
