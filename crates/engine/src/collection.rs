//! Collection: path-addressed CRUD with chunking and index lifecycle
//!
//! One `Collection` owns one named physical collection, its index set and
//! its TTL configuration. Logical documents whose encoded form exceeds the
//! configured chunk size are split across chunk records plus one reference
//! record (chunk index −1) carrying the total chunk count.
//!
//! # Chunk-count invariant
//!
//! A chunked save writes every chunk record and the reference record as a
//! single ordered bulk write (chunks first, reference last), then — only
//! when the document shrank — trims chunk records at index ≥ the new count.
//! A crash mid-write therefore leaves either the old complete document
//! readable or a not-yet-finalized reference that the next write
//! overwrites; the read path concatenates chunks 0..count by ascending
//! index, where count is the reference record's finalized value, so a
//! not-yet-trimmed tail never reaches the decoder.
//!
//! # Concurrency
//!
//! Initialization is memoized: concurrent first callers converge on a
//! single physical-collection-creation and index pass. Concurrent chunked
//! saves to the *same* path are not serialized — no per-path lock or
//! optimistic check on the reference record — and a reader racing two
//! writers may observe a torn document. Known limitation.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use chunkstore_core::{
    fields, merge, DocPath, Error, Result, FIELD_CHUNK, FIELD_CHUNK_COUNT, FIELD_CREATED,
    FIELD_DATA, FIELD_PATH, FIELD_VERSION, PATH_SEPARATOR, REFERENCE_CHUNK_INDEX,
};
use chunkstore_storage::{
    BulkSummary, DocumentCodec, DocumentDriver, DriverError, FindOptions, IndexSpec, Record,
    UpdateDoc, WriteOp,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::connection::ConnectionManager;

/// Default chunk size: 4 MiB of encoded document bytes per chunk record.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Static configuration of one collection.
///
/// Not designed for mutation after construction; only the data the
/// collection addresses is expected to change concurrently.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Physical collection name.
    pub name: String,
    /// TTL duration; `None` means no expiry.
    pub ttl: Option<Duration>,
    /// Index set applied on first use. When empty, a single non-unique
    /// index on the path field is created instead.
    pub indexes: Vec<IndexSpec>,
    /// Chunk size in bytes for chunked documents.
    pub chunk_size: usize,
}

impl CollectionConfig {
    /// Configuration with no TTL, no explicit indexes, default chunk size.
    pub fn new(name: impl Into<String>) -> Self {
        CollectionConfig {
            name: name.into(),
            ttl: None,
            indexes: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Expire documents this long after their first write.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Add an index descriptor.
    pub fn index(mut self, spec: IndexSpec) -> Self {
        self.indexes.push(spec);
        self
    }

    /// Override the chunk size.
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }
}

/// Options for [`Collection::load`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Reassemble a chunked document. Mutually exclusive with projections.
    pub chunked: bool,
    /// Raw field-inclusion projection.
    pub projection: Option<Vec<String>>,
    /// Field-name allowlist, translated to a projection that always
    /// includes the path field.
    pub attributes: Option<Vec<String>>,
    /// Returned when nothing is found. A plain-object default is deep
    /// key-filled into a fresh object; anything else is returned verbatim.
    pub default: Option<Value>,
}

impl LoadOptions {
    /// Load a chunked document.
    pub fn chunked() -> Self {
        LoadOptions {
            chunked: true,
            ..Default::default()
        }
    }

    /// Substitute this value when nothing is found.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Load only the given fields.
    pub fn attributes(mut self, fields: Vec<String>) -> Self {
        self.attributes = Some(fields);
        self
    }
}

/// Options for [`Collection::save`].
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Store through the chunked write path.
    pub chunked: bool,
    /// Record-version marker stamped onto the stored form.
    pub version: Option<i64>,
    /// Treat the content as a raw update-operator object instead of
    /// `$set` fields.
    pub raw_operators: bool,
}

impl SaveOptions {
    /// Save through the chunked write path.
    pub fn chunked() -> Self {
        SaveOptions {
            chunked: true,
            ..Default::default()
        }
    }

    /// Stamp this record version.
    pub fn version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }
}

/// Options for [`Collection::delete`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    /// Delete all chunk and reference records sharing the path.
    pub chunked: bool,
}

impl DeleteOptions {
    /// Delete a chunked document.
    pub fn chunked() -> Self {
        DeleteOptions { chunked: true }
    }
}

/// The chunked-storage engine over one physical collection.
///
/// Lazily self-initializes on first use: ensures connectivity, creates the
/// physical collection and its indexes exactly once, and reconciles the
/// TTL index. All public operations ensure initialization first.
pub struct Collection {
    config: CollectionConfig,
    conn: Arc<ConnectionManager>,
    codec: Arc<dyn DocumentCodec>,
    init: OnceCell<()>,
}

impl Collection {
    pub(crate) fn new(
        config: CollectionConfig,
        conn: Arc<ConnectionManager>,
        codec: Arc<dyn DocumentCodec>,
    ) -> Self {
        Collection {
            config,
            conn,
            codec,
            init: OnceCell::new(),
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The configuration this collection was registered with.
    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Ensure connectivity and one-shot initialization, returning the
    /// driver handle. Safe to call concurrently: initializers converge on
    /// a single creation/index pass.
    async fn ensure_init(&self) -> Result<Arc<dyn DocumentDriver>> {
        let driver = self.conn.ensure_connection().await?;
        self.init
            .get_or_try_init(|| async {
                self.conn.ensure_collection(&self.config.name).await?;
                if self.config.indexes.is_empty() {
                    self.create_index_with(&driver, &IndexSpec::on(FIELD_PATH)).await?;
                } else {
                    for spec in &self.config.indexes {
                        self.create_index_with(&driver, spec).await?;
                    }
                }
                if self.config.ttl.is_some() {
                    self.reconcile_ttl_with(&driver).await?;
                }
                debug!(collection = %self.config.name, "collection initialized");
                Ok::<(), Error>(())
            })
            .await?;
        Ok(driver)
    }

    /// Reconcile the TTL index against the configured duration.
    ///
    /// Idempotent: absent → create; present with a different expiry →
    /// drop and recreate (the engine cannot change this property in
    /// place); present with the same expiry → no-op. TTL duration is a
    /// live configuration value, not a one-time creation parameter.
    pub async fn reconcile_ttl(&self) -> Result<()> {
        let driver = self.ensure_init().await?;
        self.reconcile_ttl_with(&driver).await
    }

    async fn reconcile_ttl_with(&self, driver: &Arc<dyn DocumentDriver>) -> Result<()> {
        let Some(ttl) = self.config.ttl else {
            return Ok(());
        };
        let desired_secs = ttl.as_secs();
        let name = &self.config.name;
        let indexes = driver
            .list_indexes(name)
            .await
            .map_err(|e| Error::storage("list_indexes", name, e.to_string()))?;
        let existing = indexes
            .iter()
            .find(|index| index.keys == [FIELD_CREATED] && index.expire_after_secs.is_some());
        match existing {
            Some(index) if index.expire_after_secs == Some(desired_secs) => {
                debug!(collection = %name, secs = desired_secs, "ttl index up to date");
                Ok(())
            }
            Some(index) => {
                driver
                    .drop_index(name, &index.name)
                    .await
                    .map_err(|e| Error::storage("drop_index", name, e.to_string()))?;
                self.create_ttl_index(driver, desired_secs).await?;
                info!(
                    collection = %name,
                    old_secs = index.expire_after_secs,
                    new_secs = desired_secs,
                    "ttl index recreated"
                );
                Ok(())
            }
            None => {
                self.create_ttl_index(driver, desired_secs).await?;
                info!(collection = %name, secs = desired_secs, "ttl index created");
                Ok(())
            }
        }
    }

    async fn create_ttl_index(
        &self,
        driver: &Arc<dyn DocumentDriver>,
        secs: u64,
    ) -> Result<String> {
        let spec = IndexSpec::on(FIELD_CREATED).expire_after(Duration::from_secs(secs));
        driver
            .create_index(&self.config.name, &spec)
            .await
            .map_err(|e| Error::storage("create_index", &self.config.name, e.to_string()))
    }

    /// True iff any record (plain, chunk, or chunked reference) matches
    /// the path.
    pub async fn exists(&self, path: impl Into<DocPath>) -> Result<bool> {
        let path = path.into();
        let driver = self.ensure_init().await?;
        let filter = path.to_filter()?;
        let count = driver
            .count(&self.config.name, &filter)
            .await
            .map_err(|e| self.read_err("count", &path, e))?;
        Ok(count > 0)
    }

    /// Load the logical document at `path`.
    ///
    /// Returns `Ok(None)` when nothing matches and no default is
    /// configured — distinguishable from a document that is legitimately
    /// `null`. Defaults are substituted only for the not-found case,
    /// never for the error case.
    pub async fn load(
        &self,
        path: impl Into<DocPath>,
        options: LoadOptions,
    ) -> Result<Option<Value>> {
        let path = path.into();
        if options.chunked && (options.projection.is_some() || options.attributes.is_some()) {
            return Err(Error::Config(
                "load options `projection`/`attributes` cannot be combined with `chunked`".into(),
            ));
        }
        let driver = self.ensure_init().await?;
        let filter = path.to_filter()?;
        let found = if options.chunked {
            self.load_chunked(&driver, &filter, &path).await?
        } else {
            let find = FindOptions {
                projection: self.build_projection(&options),
                ..Default::default()
            };
            driver
                .find_one(&self.config.name, &filter, &find)
                .await
                .map_err(|e| self.read_err("find_one", &path, e))?
                .map(fields::unwrap_record)
        };
        match found {
            Some(value) => Ok(Some(value)),
            None => Ok(options.default.as_ref().map(computed_default)),
        }
    }

    fn build_projection(&self, options: &LoadOptions) -> Option<Vec<String>> {
        if let Some(projection) = &options.projection {
            return Some(projection.clone());
        }
        options.attributes.as_ref().map(|attributes| {
            let mut projection = attributes.clone();
            if !projection.iter().any(|f| f == FIELD_PATH) {
                projection.push(FIELD_PATH.to_string());
            }
            projection
        })
    }

    /// Finalized chunk count from the path's reference record, `None` when
    /// no reference record exists.
    async fn stored_chunk_count(
        &self,
        driver: &Arc<dyn DocumentDriver>,
        filter: &Map<String, Value>,
        path: &DocPath,
    ) -> Result<Option<i64>> {
        let mut reference_filter = filter.clone();
        reference_filter.insert(FIELD_CHUNK.to_string(), json!(REFERENCE_CHUNK_INDEX));
        let reference = driver
            .find_one(&self.config.name, &reference_filter, &FindOptions::default())
            .await
            .map_err(|e| self.read_err("find_one", path, e))?;
        Ok(reference.and_then(|r| r.get(FIELD_CHUNK_COUNT).and_then(Value::as_i64)))
    }

    /// Retrieve the chunk records named by the reference record's finalized
    /// count, in ascending index order, concatenate their payloads and
    /// decode. Bounding the read by the count keeps a not-yet-trimmed tail
    /// (a shrinking save interrupted before its trim) out of the decoder.
    async fn load_chunked(
        &self,
        driver: &Arc<dyn DocumentDriver>,
        filter: &Map<String, Value>,
        path: &DocPath,
    ) -> Result<Option<Value>> {
        let Some(count) = self.stored_chunk_count(driver, filter, path).await? else {
            return Ok(None);
        };
        let mut chunk_filter = filter.clone();
        chunk_filter.insert(FIELD_CHUNK.to_string(), json!({"$gte": 0, "$lt": count}));
        let chunks = driver
            .find(
                &self.config.name,
                &chunk_filter,
                &FindOptions::sorted_by(FIELD_CHUNK),
            )
            .await
            .map_err(|e| self.read_err("find", path, e))?;
        if chunks.is_empty() {
            return Ok(None);
        }
        let mut bytes = Vec::new();
        for chunk in &chunks {
            let payload = chunk
                .get(FIELD_DATA)
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::storage(
                        "load_chunked",
                        &self.config.name,
                        format!("chunk record missing payload (path '{path}')"),
                    )
                })?;
            let decoded = BASE64
                .decode(payload)
                .map_err(|e| Error::Codec(format!("chunk payload: {e}")))?;
            bytes.extend_from_slice(&decoded);
        }
        self.codec.decode(&bytes).map(Some)
    }

    /// Save the logical document at `path`, returning the content.
    ///
    /// Non-object values are wrapped; objects have reserved fields evicted
    /// before write. When TTL is configured the expiry anchor is set only
    /// on insert, never refreshed on update. Concurrent chunked saves to
    /// the same path are not serialized; see the module docs.
    pub async fn save(
        &self,
        path: impl Into<DocPath>,
        content: Value,
        options: SaveOptions,
    ) -> Result<Value> {
        let path = path.into();
        let driver = self.ensure_init().await?;
        if options.chunked {
            self.save_chunked(&driver, &path, &content, &options).await?;
            return Ok(content);
        }
        let filter = path.to_filter()?;
        let update = self.build_update(&content, &options)?;
        driver
            .update_one(&self.config.name, &filter, &update, true)
            .await
            .map_err(|e| self.write_err("update_one", &path, e))?;
        Ok(content)
    }

    /// Build the unexecuted upsert descriptor a plain save would run, for
    /// caller-side batching via [`Collection::bulk`].
    pub fn save_op(
        &self,
        path: impl Into<DocPath>,
        content: &Value,
        options: &SaveOptions,
    ) -> Result<WriteOp> {
        if options.chunked {
            return Err(Error::Unsupported(
                "bulk descriptors cannot express a chunked save".into(),
            ));
        }
        let filter = path.into().to_filter()?;
        let update = self.build_update(content, options)?;
        Ok(WriteOp::Upsert { filter, update })
    }

    fn build_update(&self, content: &Value, options: &SaveOptions) -> Result<UpdateDoc> {
        let mut update = if options.raw_operators {
            match content {
                Value::Object(operators) => UpdateDoc::from_operators(operators)?,
                _ => {
                    return Err(Error::Config(
                        "raw operator save requires an operator object".into(),
                    ))
                }
            }
        } else {
            let mut set = match content {
                Value::Object(doc) => {
                    let mut doc = doc.clone();
                    fields::strip_reserved(&mut doc);
                    doc
                }
                other => fields::wrap_value(other.clone()),
            };
            if let Some(version) = options.version {
                set.insert(FIELD_VERSION.to_string(), json!(version));
            }
            UpdateDoc::set(set)
        };
        self.stamp_ttl_anchor(&mut update);
        Ok(update)
    }

    /// TTL is anchored to first-write time: the expiry timestamp goes in
    /// `$setOnInsert` and is never refreshed by updates.
    fn stamp_ttl_anchor(&self, update: &mut UpdateDoc) {
        if self.config.ttl.is_some() {
            update.set_on_insert.insert(
                FIELD_CREATED.to_string(),
                json!(Utc::now().timestamp_millis()),
            );
        }
    }

    /// Chunked write: encode, upsert every chunk slice keyed by
    /// (path, chunk index), finalize the reference record's count in the
    /// same ordered batch, then trim stale tail chunks when the document
    /// shrank. Write order carries the chunk-count invariant; do not
    /// reorder.
    async fn save_chunked(
        &self,
        driver: &Arc<dyn DocumentDriver>,
        path: &DocPath,
        content: &Value,
        options: &SaveOptions,
    ) -> Result<()> {
        let filter = path.to_filter()?;
        let logical = match content {
            Value::Object(doc) => {
                let mut doc = doc.clone();
                fields::strip_reserved(&mut doc);
                if let Some(version) = options.version {
                    doc.insert(FIELD_VERSION.to_string(), json!(version));
                }
                Value::Object(doc)
            }
            other => other.clone(),
        };
        let bytes = self.codec.encode(&logical)?;
        let chunk_size = self.config.chunk_size.max(1);
        let new_count = bytes.len().div_ceil(chunk_size) as i64;

        let mut reference_filter = filter.clone();
        reference_filter.insert(FIELD_CHUNK.to_string(), json!(REFERENCE_CHUNK_INDEX));
        let old_count = self
            .stored_chunk_count(driver, &filter, path)
            .await?
            .unwrap_or(0);

        let mut ops = Vec::with_capacity(new_count as usize + 1);
        for (index, slice) in bytes.chunks(chunk_size).enumerate() {
            let mut chunk_filter = filter.clone();
            chunk_filter.insert(FIELD_CHUNK.to_string(), json!(index as i64));
            let mut set = Map::new();
            set.insert(FIELD_DATA.to_string(), json!(BASE64.encode(slice)));
            let mut update = UpdateDoc::set(set);
            self.stamp_ttl_anchor(&mut update);
            ops.push(WriteOp::Upsert {
                filter: chunk_filter,
                update,
            });
        }
        let mut set = Map::new();
        set.insert(FIELD_CHUNK_COUNT.to_string(), json!(new_count));
        let mut reference_update = UpdateDoc::set(set);
        self.stamp_ttl_anchor(&mut reference_update);
        ops.push(WriteOp::Upsert {
            filter: reference_filter,
            update: reference_update,
        });

        driver
            .bulk_write(&self.config.name, &ops, true)
            .await
            .map_err(|e| self.write_err("bulk_write", path, e))?;

        if new_count < old_count {
            let mut tail_filter = filter.clone();
            tail_filter.insert(FIELD_CHUNK.to_string(), json!({"$gte": new_count}));
            driver
                .delete_many(&self.config.name, &tail_filter)
                .await
                .map_err(|e| self.write_err("delete_many", path, e))?;
            debug!(
                collection = %self.config.name,
                path = %path,
                old_count,
                new_count,
                "trimmed stale tail chunks"
            );
        }
        Ok(())
    }

    /// Delete the document at `path`: the plain record, or every chunk and
    /// reference record sharing the path when chunked. Returns the number
    /// of physical records removed.
    pub async fn delete(&self, path: impl Into<DocPath>, options: DeleteOptions) -> Result<u64> {
        let path = path.into();
        let driver = self.ensure_init().await?;
        let filter = path.to_filter()?;
        let deleted = if options.chunked {
            driver
                .delete_many(&self.config.name, &filter)
                .await
                .map_err(|e| self.write_err("delete_many", &path, e))?
        } else {
            driver
                .delete_one(&self.config.name, &filter)
                .await
                .map_err(|e| self.write_err("delete_one", &path, e))?
        };
        Ok(deleted)
    }

    /// Build the unexecuted delete descriptor, mirroring
    /// [`Collection::save_op`].
    pub fn delete_op(&self, path: impl Into<DocPath>, options: DeleteOptions) -> Result<WriteOp> {
        let filter = path.into().to_filter()?;
        Ok(if options.chunked {
            WriteOp::DeleteMany { filter }
        } else {
            WriteOp::DeleteOne { filter }
        })
    }

    /// All logical documents whose path is lexically under
    /// `prefix` + `/` — the hierarchical-namespace listing.
    pub async fn list(&self, prefix: &str, options: FindOptions) -> Result<Vec<Value>> {
        let mut filter = Map::new();
        filter.insert(
            FIELD_PATH.to_string(),
            json!({"$prefix": format!("{prefix}{PATH_SEPARATOR}")}),
        );
        self.list_query(filter, options).await
    }

    /// Filter-based listing of logical documents (unwrapped values).
    pub async fn list_query(
        &self,
        filter: Map<String, Value>,
        options: FindOptions,
    ) -> Result<Vec<Value>> {
        let driver = self.ensure_init().await?;
        let records = driver
            .find(&self.config.name, &filter, &options)
            .await
            .map_err(|e| Error::storage("find", &self.config.name, e.to_string()))?;
        Ok(records.into_iter().map(fields::unwrap_record).collect())
    }

    /// Filter-based listing of raw physical records, reserved fields
    /// intact. For callers that need the bookkeeping fields.
    pub async fn list_all(
        &self,
        filter: Map<String, Value>,
        options: FindOptions,
    ) -> Result<Vec<Record>> {
        let driver = self.ensure_init().await?;
        driver
            .find(&self.config.name, &filter, &options)
            .await
            .map_err(|e| Error::storage("find", &self.config.name, e.to_string()))
    }

    /// Create an index from a descriptor, returning its name. With
    /// `forced`, any existing index with the derived/explicit name is
    /// best-effort dropped first (absence is not an error).
    pub async fn create_index(&self, spec: &IndexSpec) -> Result<String> {
        let driver = self.ensure_init().await?;
        self.create_index_with(&driver, spec).await
    }

    async fn create_index_with(
        &self,
        driver: &Arc<dyn DocumentDriver>,
        spec: &IndexSpec,
    ) -> Result<String> {
        let name = &self.config.name;
        if spec.forced {
            if let Err(e) = driver.drop_index(name, &spec.index_name()).await {
                debug!(collection = %name, index = %spec.index_name(), error = %e,
                    "forced index drop skipped");
            }
        }
        driver
            .create_index(name, spec)
            .await
            .map_err(|e| Error::storage("create_index", name, e.to_string()))
    }

    /// Execute caller-batched write descriptors as one ordered bulk write.
    ///
    /// Ordered on purpose: a failure stops subsequent operations in the
    /// batch instead of silently applying out-of-order partial writes.
    pub async fn bulk(&self, ops: &[WriteOp]) -> Result<BulkSummary> {
        let driver = self.ensure_init().await?;
        driver
            .bulk_write(&self.config.name, ops, true)
            .await
            .map_err(|e| Error::storage("bulk_write", &self.config.name, e.to_string()))
    }

    /// Run an aggregation pipeline against the physical collection.
    pub async fn aggregate(&self, pipeline: &[Value]) -> Result<Vec<Record>> {
        let driver = self.ensure_init().await?;
        driver
            .aggregate(&self.config.name, pipeline)
            .await
            .map_err(|e| Error::storage("aggregate", &self.config.name, e.to_string()))
    }

    fn read_err(&self, op: &'static str, path: &DocPath, e: DriverError) -> Error {
        warn!(collection = %self.config.name, path = %path, error = %e, "storage read failed");
        Error::storage(op, &self.config.name, format!("{e} (path '{path}')"))
    }

    fn write_err(&self, op: &'static str, path: &DocPath, e: DriverError) -> Error {
        warn!(collection = %self.config.name, path = %path, error = %e, "storage write failed");
        Error::storage(op, &self.config.name, format!("{e} (path '{path}')"))
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.config.name)
            .field("ttl", &self.config.ttl)
            .field("chunk_size", &self.config.chunk_size)
            .field("initialized", &self.init.initialized())
            .finish()
    }
}

/// Substitute a configured default for the not-found case: plain objects
/// are deep key-filled into a fresh document, everything else is returned
/// verbatim.
pub(crate) fn computed_default(default: &Value) -> Value {
    if default.is_object() {
        let mut filled = Value::Object(Map::new());
        merge::fill_defaults(&mut filled, default);
        filled
    } else {
        default.clone()
    }
}
