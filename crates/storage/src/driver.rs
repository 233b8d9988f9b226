//! Document-database driver seam
//!
//! The storage layer treats the database engine as an external collaborator
//! behind [`DocumentDriver`]: named-collection creation, filtered finds with
//! projection and sort, `$set`/`$setOnInsert` upserts, ordered bulk writes,
//! index lifecycle with TTL support, and aggregation passthrough.
//!
//! [`DriverConnector`] builds a connected driver from [`ClientOptions`];
//! the connection manager owns when that happens (blocking in production,
//! in the background in development).

use chunkstore_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error as ThisError;

/// A physical record as stored by the driver.
pub type Record = Map<String, Value>;

/// Failure reported by the underlying driver.
///
/// Deliberately opaque: the collection layer wraps it into
/// [`chunkstore_core::Error::Storage`] with operation and path context, and
/// retry policy is left to the caller.
#[derive(Debug, Clone, ThisError)]
#[error("{0}")]
pub struct DriverError(pub String);

impl DriverError {
    /// Build a driver error from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        DriverError(message.into())
    }
}

/// Result type for driver operations.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Sort direction for a find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest value first.
    Ascending,
    /// Largest value first.
    Descending,
}

/// Options for `find`/`find_one`.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Field-inclusion projection; `None` returns whole records.
    pub projection: Option<Vec<String>>,
    /// Single-field sort.
    pub sort: Option<(String, SortOrder)>,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
}

impl FindOptions {
    /// Sort ascending by the given field.
    pub fn sorted_by(field: impl Into<String>) -> Self {
        FindOptions {
            sort: Some((field.into(), SortOrder::Ascending)),
            ..Default::default()
        }
    }

    /// Include only the given fields.
    pub fn project(fields: Vec<String>) -> Self {
        FindOptions {
            projection: Some(fields),
            ..Default::default()
        }
    }
}

/// Update document with `$set`-family operator semantics.
///
/// `set_on_insert` fields are applied only when the upsert inserts a new
/// record; this is what anchors TTL timestamps to first-write time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateDoc {
    /// Fields written on every matching update.
    pub set: Record,
    /// Fields written only when the upsert inserts a new record.
    pub set_on_insert: Record,
    /// Fields removed from the record.
    pub unset: Vec<String>,
    /// Numeric fields incremented by the given amount.
    pub inc: Record,
}

impl UpdateDoc {
    /// Plain `$set` update of the given fields.
    pub fn set(fields: Record) -> Self {
        UpdateDoc {
            set: fields,
            ..Default::default()
        }
    }

    /// Parse a caller-supplied raw operator object
    /// (`$set` / `$setOnInsert` / `$unset` / `$inc`).
    ///
    /// Unknown operators are a configuration error, not silently ignored.
    pub fn from_operators(operators: &Record) -> Result<Self> {
        let mut update = UpdateDoc::default();
        for (op, payload) in operators {
            let fields = match payload {
                Value::Object(map) => map,
                _ => {
                    return Err(Error::Config(format!(
                        "update operator '{op}' requires an object payload"
                    )))
                }
            };
            match op.as_str() {
                "$set" => update.set.extend(fields.clone()),
                "$setOnInsert" => update.set_on_insert.extend(fields.clone()),
                "$unset" => update.unset.extend(fields.keys().cloned()),
                "$inc" => update.inc.extend(fields.clone()),
                other => {
                    return Err(Error::Config(format!(
                        "unsupported update operator '{other}'"
                    )))
                }
            }
        }
        Ok(update)
    }
}

/// One unexecuted write, for caller-side batching via ordered bulk writes.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Upsert the single record matching `filter`.
    Upsert {
        /// Record selector; equality fields seed an inserted record.
        filter: Record,
        /// Update to apply.
        update: UpdateDoc,
    },
    /// Delete the first record matching `filter`.
    DeleteOne {
        /// Record selector.
        filter: Record,
    },
    /// Delete every record matching `filter`.
    DeleteMany {
        /// Record selector.
        filter: Record,
    },
}

/// Aggregate counters returned by write operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkSummary {
    /// Records matched by update filters.
    pub matched: u64,
    /// Records modified in place.
    pub modified: u64,
    /// Records inserted by upserts.
    pub upserted: u64,
    /// Records deleted.
    pub deleted: u64,
}

/// Descriptor for creating one secondary index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    /// Indexed key names, all ascending.
    pub keys: Vec<String>,
    /// Explicit index name; derived from the keys when absent.
    pub name: Option<String>,
    /// Reject writes that would duplicate the indexed key combination.
    pub unique: bool,
    /// Best-effort drop any existing index with the same name first.
    pub forced: bool,
    /// TTL: delete records once this many seconds elapse past the indexed
    /// timestamp field.
    pub expire_after: Option<Duration>,
}

impl IndexSpec {
    /// Single-key ascending index.
    pub fn on(key: impl Into<String>) -> Self {
        IndexSpec {
            keys: vec![key.into()],
            name: None,
            unique: false,
            forced: false,
            expire_after: None,
        }
    }

    /// Composite ascending index over the given keys.
    pub fn compound(keys: Vec<String>) -> Self {
        IndexSpec {
            keys,
            name: None,
            unique: false,
            forced: false,
            expire_after: None,
        }
    }

    /// Require uniqueness of the indexed key combination.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Drop any same-named index before creating this one.
    pub fn forced(mut self) -> Self {
        self.forced = true;
        self
    }

    /// Use an explicit index name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Expire indexed records after the given duration (floored to seconds).
    pub fn expire_after(mut self, ttl: Duration) -> Self {
        self.expire_after = Some(ttl);
        self
    }

    /// Explicit name, or the `key_1[_key_1...]` name derived from the keys.
    pub fn index_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .keys
                .iter()
                .map(|k| format!("{k}_1"))
                .collect::<Vec<_>>()
                .join("_"),
        }
    }
}

/// An index as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Indexed key names.
    pub keys: Vec<String>,
    /// Uniqueness constraint.
    pub unique: bool,
    /// TTL expiry in whole seconds, when this is a TTL index.
    pub expire_after_secs: Option<u64>,
}

/// Client construction options.
///
/// The connection manager merges these baseline values with caller
/// overrides before handing them to the connector: API version pinned,
/// strict mode on, deprecation warnings on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Connection URI understood by the concrete driver.
    pub uri: String,
    /// Optional application name reported to the server.
    pub app_name: Option<String>,
    /// Pinned server API version.
    pub api_version: String,
    /// Reject server features outside the pinned API version.
    pub strict: bool,
    /// Surface deprecated-feature warnings.
    pub deprecation_warnings: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            uri: "memory://".to_string(),
            app_name: None,
            api_version: "1".to_string(),
            strict: true,
            deprecation_warnings: true,
        }
    }
}

/// The document-database seam.
///
/// Implementations must provide atomic single-record upserts, ordered
/// multi-record bulk writes, secondary indexes (including TTL indexes) and
/// query-by-filter. Everything above this trait is database-agnostic.
#[async_trait::async_trait]
pub trait DocumentDriver: Send + Sync {
    /// Names of the existing physical collections.
    async fn list_collections(&self) -> DriverResult<Vec<String>>;

    /// Create a physical collection; creating an existing one is a no-op.
    async fn create_collection(&self, collection: &str) -> DriverResult<()>;

    /// All records matching `filter`, honoring projection/sort/limit.
    async fn find(
        &self,
        collection: &str,
        filter: &Record,
        options: &FindOptions,
    ) -> DriverResult<Vec<Record>>;

    /// First record matching `filter`.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Record,
        options: &FindOptions,
    ) -> DriverResult<Option<Record>>;

    /// Number of records matching `filter`.
    async fn count(&self, collection: &str, filter: &Record) -> DriverResult<u64>;

    /// Update the first record matching `filter`; insert when `upsert` and
    /// nothing matches (equality fields of the filter seed the new record).
    async fn update_one(
        &self,
        collection: &str,
        filter: &Record,
        update: &UpdateDoc,
        upsert: bool,
    ) -> DriverResult<BulkSummary>;

    /// Execute writes in order. With `ordered`, a failure stops the
    /// remainder of the batch and is returned as the error.
    async fn bulk_write(
        &self,
        collection: &str,
        ops: &[WriteOp],
        ordered: bool,
    ) -> DriverResult<BulkSummary>;

    /// Delete the first record matching `filter`; returns the delete count.
    async fn delete_one(&self, collection: &str, filter: &Record) -> DriverResult<u64>;

    /// Delete every record matching `filter`; returns the delete count.
    async fn delete_many(&self, collection: &str, filter: &Record) -> DriverResult<u64>;

    /// Create an index; returns its name. Creating an identical index again
    /// is a no-op.
    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> DriverResult<String>;

    /// List the indexes of a collection.
    async fn list_indexes(&self, collection: &str) -> DriverResult<Vec<IndexInfo>>;

    /// Drop an index by name; dropping a missing index is an error.
    async fn drop_index(&self, collection: &str, name: &str) -> DriverResult<()>;

    /// Run an aggregation pipeline.
    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> DriverResult<Vec<Record>>;
}

/// Builds a connected [`DocumentDriver`].
///
/// Connection establishment is owned by the connection manager, which
/// guarantees at most one concurrent attempt.
#[async_trait::async_trait]
pub trait DriverConnector: Send + Sync {
    /// Establish a connection and return the driver handle.
    async fn connect(&self, options: &ClientOptions) -> DriverResult<Arc<dyn DocumentDriver>>;
}
