//! Reserved physical-record fields
//!
//! Physical records carry bookkeeping fields owned by the storage layer:
//! the path key, the TTL anchor timestamp, the record-version marker, and
//! the chunk bookkeeping fields. Caller-supplied documents must never carry
//! them, so [`strip_reserved`] evicts them before any write.
//!
//! Non-object logical documents (strings, numbers, arrays, ...) cannot be
//! merged into a record directly; they are stored under the [`FIELD_VALUE`]
//! wrapper and unwrapped again on load.

use serde_json::{Map, Value};

/// Path key of a physical record.
pub const FIELD_PATH: &str = "path";

/// TTL anchor: millisecond epoch timestamp stamped on first insert.
pub const FIELD_CREATED: &str = "created";

/// Record-version marker embedded in the stored logical form.
pub const FIELD_VERSION: &str = "version";

/// Zero-based chunk index of a chunk record ([`REFERENCE_CHUNK_INDEX`] for
/// the reference record).
pub const FIELD_CHUNK: &str = "chunk";

/// Total chunk count, carried by the reference record only.
pub const FIELD_CHUNK_COUNT: &str = "chunks";

/// Base64 byte-slice payload of a chunk record.
pub const FIELD_DATA: &str = "data";

/// Wrapper field holding a non-object logical document.
pub const FIELD_VALUE: &str = "value";

/// Sentinel chunk index tagging the reference record of a chunked document.
pub const REFERENCE_CHUNK_INDEX: i64 = -1;

/// Separator used by prefix listing over hierarchical path namespaces.
pub const PATH_SEPARATOR: char = '/';

/// All fields owned by the storage layer. Evicted from caller documents
/// before write.
pub const RESERVED_FIELDS: &[&str] = &[
    FIELD_PATH,
    FIELD_CREATED,
    FIELD_VERSION,
    FIELD_CHUNK,
    FIELD_CHUNK_COUNT,
    FIELD_DATA,
    FIELD_VALUE,
];

/// Fields stripped from a loaded record before it is handed to the caller.
///
/// `version` is intentionally absent: the record-version marker is part of
/// the stored logical form and references read it during load.
const LOAD_STRIPPED: &[&str] = &[
    FIELD_PATH,
    FIELD_CREATED,
    FIELD_CHUNK,
    FIELD_CHUNK_COUNT,
    FIELD_DATA,
];

/// Evict every reserved field from a caller-supplied document.
pub fn strip_reserved(doc: &mut Map<String, Value>) {
    for field in RESERVED_FIELDS {
        doc.remove(*field);
    }
}

/// Wrap a non-object logical value into its stored record form.
pub fn wrap_value(value: Value) -> Map<String, Value> {
    let mut record = Map::new();
    record.insert(FIELD_VALUE.to_string(), value);
    record
}

/// Turn a loaded physical record back into its logical document.
///
/// Strips the storage-owned bookkeeping fields and unwraps the
/// [`FIELD_VALUE`] wrapper for non-object documents. The `version` marker is
/// kept on object documents.
pub fn unwrap_record(mut record: Map<String, Value>) -> Value {
    for field in LOAD_STRIPPED {
        record.remove(*field);
    }
    // A caller object can never contain the wrapper field (it is reserved),
    // so its presence means the record holds a wrapped non-object value.
    match record.remove(FIELD_VALUE) {
        Some(value) => value,
        None => Value::Object(record),
    }
}
