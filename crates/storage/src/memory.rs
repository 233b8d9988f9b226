//! In-memory document driver
//!
//! Reference implementation of [`DocumentDriver`] used by the test suites
//! and as the development backend:
//! - `parking_lot::RwLock` around a `BTreeMap<name, collection>`
//! - Logical TTL expiration: expired records are purged at read time based
//!   on the collection's TTL index metadata, mirroring the out-of-band
//!   expiry sweep of a real engine
//! - Unique-index enforcement on insert
//! - Test instrumentation: an index-mutation counter and read fault
//!   injection

use crate::driver::{
    BulkSummary, ClientOptions, DocumentDriver, DriverConnector, DriverError, DriverResult,
    FindOptions, IndexInfo, IndexSpec, Record, SortOrder, UpdateDoc, WriteOp,
};
use crate::filter;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct StoredCollection {
    records: Vec<Record>,
    indexes: Vec<IndexInfo>,
}

impl StoredCollection {
    /// Drop records whose TTL-indexed timestamp has elapsed.
    fn purge_expired(&mut self, now_ms: i64) {
        let ttl_fields: Vec<(String, i64)> = self
            .indexes
            .iter()
            .filter_map(|index| {
                let secs = index.expire_after_secs?;
                let field = index.keys.first()?;
                Some((field.clone(), secs as i64))
            })
            .collect();
        if ttl_fields.is_empty() {
            return;
        }
        self.records.retain(|record| {
            !ttl_fields.iter().any(|(field, secs)| {
                record
                    .get(field)
                    .and_then(Value::as_i64)
                    .is_some_and(|anchor_ms| now_ms >= anchor_ms + secs * 1000)
            })
        });
    }

    /// True iff inserting `candidate` would duplicate a unique key combination.
    fn violates_unique(&self, candidate: &Record) -> Option<&IndexInfo> {
        self.indexes.iter().find(|index| {
            index.unique
                && index.keys.iter().all(|k| candidate.contains_key(k))
                && self.records.iter().any(|existing| {
                    index.keys.iter().all(|k| {
                        match (existing.get(k), candidate.get(k)) {
                            (Some(a), Some(b)) => filter::values_equal(a, b),
                            _ => false,
                        }
                    })
                })
        })
    }
}

/// In-memory document engine.
///
/// Thread-safe through `parking_lot::RwLock`; every entry point takes the
/// write lock because reads purge expired records first.
#[derive(Default)]
pub struct MemoryDriver {
    collections: RwLock<BTreeMap<String, StoredCollection>>,
    index_mutations: AtomicU64,
    fail_reads: AtomicBool,
}

impl MemoryDriver {
    /// Create an empty driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of index create/drop mutations performed so far.
    ///
    /// Used by tests to assert TTL reconciliation idempotence.
    pub fn index_mutations(&self) -> u64 {
        self.index_mutations.load(Ordering::SeqCst)
    }

    /// Make every subsequent read operation fail (fault injection).
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of the physical records of a collection, expired records
    /// purged. For test inspection of chunk/reference bookkeeping.
    pub fn records(&self, collection: &str) -> Vec<Record> {
        let mut collections = self.collections.write();
        match collections.get_mut(collection) {
            Some(coll) => {
                coll.purge_expired(Utc::now().timestamp_millis());
                coll.records.clone()
            }
            None => Vec::new(),
        }
    }

    fn check_read(&self, op: &str) -> DriverResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DriverError::new(format!("simulated {op} failure")));
        }
        Ok(())
    }

    fn do_update_one(
        &self,
        collection: &str,
        op_filter: &Record,
        update: &UpdateDoc,
        upsert: bool,
    ) -> DriverResult<BulkSummary> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        coll.purge_expired(Utc::now().timestamp_millis());

        if let Some(record) = coll.records.iter_mut().find(|r| filter::matches(r, op_filter)) {
            filter::apply_update(record, update, false);
            return Ok(BulkSummary {
                matched: 1,
                modified: 1,
                ..Default::default()
            });
        }
        if !upsert {
            return Ok(BulkSummary::default());
        }
        let mut inserted = filter::equality_fields(op_filter);
        filter::apply_update(&mut inserted, update, true);
        if let Some(index) = coll.violates_unique(&inserted) {
            return Err(DriverError::new(format!(
                "duplicate key for unique index '{}'",
                index.name
            )));
        }
        coll.records.push(inserted);
        Ok(BulkSummary {
            upserted: 1,
            ..Default::default()
        })
    }

    fn do_delete(&self, collection: &str, op_filter: &Record, many: bool) -> u64 {
        let mut collections = self.collections.write();
        let Some(coll) = collections.get_mut(collection) else {
            return 0;
        };
        coll.purge_expired(Utc::now().timestamp_millis());
        if many {
            let before = coll.records.len();
            coll.records.retain(|r| !filter::matches(r, op_filter));
            (before - coll.records.len()) as u64
        } else {
            match coll.records.iter().position(|r| filter::matches(r, op_filter)) {
                Some(idx) => {
                    coll.records.remove(idx);
                    1
                }
                None => 0,
            }
        }
    }

    fn find_records(
        &self,
        collection: &str,
        find_filter: &Record,
        options: &FindOptions,
    ) -> Vec<Record> {
        let mut collections = self.collections.write();
        let Some(coll) = collections.get_mut(collection) else {
            return Vec::new();
        };
        coll.purge_expired(Utc::now().timestamp_millis());
        let mut found: Vec<Record> = coll
            .records
            .iter()
            .filter(|r| filter::matches(r, find_filter))
            .cloned()
            .collect();
        if let Some((field, order)) = &options.sort {
            found.sort_by(|a, b| {
                let ordering = filter::compare_fields(a.get(field), b.get(field));
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = options.limit {
            found.truncate(limit);
        }
        if let Some(fields) = &options.projection {
            found = found.iter().map(|r| filter::project(r, fields)).collect();
        }
        found
    }
}

impl std::fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let collections = self.collections.read();
        f.debug_struct("MemoryDriver")
            .field("collections", &collections.len())
            .field("index_mutations", &self.index_mutations())
            .finish()
    }
}

#[async_trait::async_trait]
impl DocumentDriver for MemoryDriver {
    async fn list_collections(&self) -> DriverResult<Vec<String>> {
        self.check_read("list_collections")?;
        Ok(self.collections.read().keys().cloned().collect())
    }

    async fn create_collection(&self, collection: &str) -> DriverResult<()> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default();
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        find_filter: &Record,
        options: &FindOptions,
    ) -> DriverResult<Vec<Record>> {
        self.check_read("find")?;
        Ok(self.find_records(collection, find_filter, options))
    }

    async fn find_one(
        &self,
        collection: &str,
        find_filter: &Record,
        options: &FindOptions,
    ) -> DriverResult<Option<Record>> {
        self.check_read("find_one")?;
        let mut options = options.clone();
        options.limit = Some(1);
        Ok(self
            .find_records(collection, find_filter, &options)
            .into_iter()
            .next())
    }

    async fn count(&self, collection: &str, count_filter: &Record) -> DriverResult<u64> {
        self.check_read("count")?;
        Ok(self
            .find_records(collection, count_filter, &FindOptions::default())
            .len() as u64)
    }

    async fn update_one(
        &self,
        collection: &str,
        op_filter: &Record,
        update: &UpdateDoc,
        upsert: bool,
    ) -> DriverResult<BulkSummary> {
        self.do_update_one(collection, op_filter, update, upsert)
    }

    async fn bulk_write(
        &self,
        collection: &str,
        ops: &[WriteOp],
        ordered: bool,
    ) -> DriverResult<BulkSummary> {
        let mut summary = BulkSummary::default();
        for op in ops {
            let result = match op {
                WriteOp::Upsert { filter, update } => {
                    self.do_update_one(collection, filter, update, true)
                }
                WriteOp::DeleteOne { filter } => Ok(BulkSummary {
                    deleted: self.do_delete(collection, filter, false),
                    ..Default::default()
                }),
                WriteOp::DeleteMany { filter } => Ok(BulkSummary {
                    deleted: self.do_delete(collection, filter, true),
                    ..Default::default()
                }),
            };
            match result {
                Ok(partial) => {
                    summary.matched += partial.matched;
                    summary.modified += partial.modified;
                    summary.upserted += partial.upserted;
                    summary.deleted += partial.deleted;
                }
                // Ordered batches stop at the first failure so later writes
                // are never applied out of order.
                Err(e) if ordered => return Err(e),
                Err(e) => warn!(collection, error = %e, "unordered bulk write op failed"),
            }
        }
        Ok(summary)
    }

    async fn delete_one(&self, collection: &str, op_filter: &Record) -> DriverResult<u64> {
        Ok(self.do_delete(collection, op_filter, false))
    }

    async fn delete_many(&self, collection: &str, op_filter: &Record) -> DriverResult<u64> {
        Ok(self.do_delete(collection, op_filter, true))
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> DriverResult<String> {
        let name = spec.index_name();
        let info = IndexInfo {
            name: name.clone(),
            keys: spec.keys.clone(),
            unique: spec.unique,
            expire_after_secs: spec.expire_after.map(|ttl| ttl.as_secs()),
        };
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        if let Some(existing) = coll.indexes.iter().find(|i| i.name == name) {
            if *existing == info {
                return Ok(name);
            }
            return Err(DriverError::new(format!(
                "index '{name}' already exists with different options"
            )));
        }
        coll.indexes.push(info);
        self.index_mutations.fetch_add(1, Ordering::SeqCst);
        debug!(collection, index = %name, "index created");
        Ok(name)
    }

    async fn list_indexes(&self, collection: &str) -> DriverResult<Vec<IndexInfo>> {
        self.check_read("list_indexes")?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|coll| coll.indexes.clone())
            .unwrap_or_default())
    }

    async fn drop_index(&self, collection: &str, name: &str) -> DriverResult<()> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| DriverError::new(format!("collection '{collection}' not found")))?;
        match coll.indexes.iter().position(|i| i.name == name) {
            Some(idx) => {
                coll.indexes.remove(idx);
                self.index_mutations.fetch_add(1, Ordering::SeqCst);
                debug!(collection, index = name, "index dropped");
                Ok(())
            }
            None => Err(DriverError::new(format!("index not found: {name}"))),
        }
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> DriverResult<Vec<Record>> {
        self.check_read("aggregate")?;
        let mut records = self.find_records(collection, &Record::new(), &FindOptions::default());
        for stage in pipeline {
            let Value::Object(stage) = stage else {
                return Err(DriverError::new("pipeline stage must be an object"));
            };
            let Some((name, operand)) = stage.iter().next() else {
                continue;
            };
            match (name.as_str(), operand) {
                ("$match", Value::Object(match_filter)) => {
                    records.retain(|r| filter::matches(r, match_filter));
                }
                ("$sort", Value::Object(sort)) => {
                    if let Some((field, direction)) = sort.iter().next() {
                        let descending = direction.as_i64() == Some(-1);
                        records.sort_by(|a, b| {
                            let ordering = filter::compare_fields(a.get(field), b.get(field));
                            if descending {
                                ordering.reverse()
                            } else {
                                ordering
                            }
                        });
                    }
                }
                ("$limit", limit) => {
                    let Some(limit) = limit.as_u64() else {
                        return Err(DriverError::new("$limit requires a number"));
                    };
                    records.truncate(limit as usize);
                }
                ("$count", Value::String(count_field)) => {
                    let mut count = Record::new();
                    count.insert(
                        count_field.clone(),
                        Value::Number(Number::from(records.len() as u64)),
                    );
                    records = vec![count];
                }
                (other, _) => {
                    return Err(DriverError::new(format!(
                        "unsupported pipeline stage '{other}'"
                    )));
                }
            }
        }
        Ok(records)
    }
}

/// Connector handing out a shared [`MemoryDriver`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    driver: Arc<MemoryDriver>,
}

impl MemoryConnector {
    /// Connector with a fresh driver.
    pub fn new() -> Self {
        Self::with_driver(Arc::new(MemoryDriver::new()))
    }

    /// Connector over an existing driver, so tests can keep a handle for
    /// physical inspection.
    pub fn with_driver(driver: Arc<MemoryDriver>) -> Self {
        MemoryConnector { driver }
    }

    /// The shared driver handle.
    pub fn driver(&self) -> Arc<MemoryDriver> {
        Arc::clone(&self.driver)
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DriverConnector for MemoryConnector {
    async fn connect(&self, options: &ClientOptions) -> DriverResult<Arc<dyn DocumentDriver>> {
        debug!(uri = %options.uri, "memory driver connected");
        Ok(Arc::clone(&self.driver) as Arc<dyn DocumentDriver>)
    }
}
