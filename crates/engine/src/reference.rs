//! Typed document references and in-memory containers
//!
//! A [`DocRef`] binds a collection, a document address and a load/save
//! policy: record-version gating with a migration transform, a default
//! substituted when nothing is stored, and an optional post-load hook.
//! [`DocContainer`] pairs a reference with an owned in-memory snapshot for
//! callers that mutate locally and persist explicitly.
//!
//! # Record versioning
//!
//! A reference declares the version its callers expect. Saves stamp that
//! version onto the stored form; loads compare it against the stored
//! marker (absent means version 1) and run the transform on mismatch
//! before any default-filling or hook. Declaring a version other than 1
//! without a transform is rejected at build time, not at first mismatched
//! load.

use chunkstore_core::{merge, DocPath, Error, Result, FIELD_VERSION};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::collection::{
    computed_default, Collection, DeleteOptions, LoadOptions, SaveOptions,
};

/// Default substituted when a reference finds nothing stored, and deep
/// key-filled into found objects that are missing keys.
#[derive(Clone)]
pub enum DefaultValue {
    /// A fixed value.
    Static(Value),
    /// A factory invoked per load, for defaults that must be fresh each
    /// time (timestamps, generated identifiers).
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    fn produce(&self) -> Value {
        match self {
            DefaultValue::Static(value) => computed_default(value),
            DefaultValue::Factory(factory) => factory(),
        }
    }

}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Static(value) => f.debug_tuple("Static").field(value).finish(),
            DefaultValue::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Migration function: receives the expected version and the stored
/// document, returns the document in the expected shape.
pub type VersionTransform = Arc<dyn Fn(i64, Value) -> Result<Value> + Send + Sync>;

/// Post-load hook applied after version gating and default filling.
pub type LoadHook = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// A stable handle to one logical document.
pub struct DocRef {
    collection: Arc<Collection>,
    path: DocPath,
    default: Option<DefaultValue>,
    chunked: bool,
    version: i64,
    transform: Option<VersionTransform>,
    on_load: Option<LoadHook>,
}

/// Builder for [`DocRef`].
pub struct DocRefBuilder {
    collection: Arc<Collection>,
    path: DocPath,
    default: Option<DefaultValue>,
    chunked: bool,
    version: i64,
    transform: Option<VersionTransform>,
    on_load: Option<LoadHook>,
}

impl DocRefBuilder {
    /// Start a reference to `path` in `collection`.
    pub fn new(collection: Arc<Collection>, path: impl Into<DocPath>) -> Self {
        DocRefBuilder {
            collection,
            path: path.into(),
            default: None,
            chunked: false,
            version: 1,
            transform: None,
            on_load: None,
        }
    }

    /// Fill missing keys from this fixed value, and substitute it whole
    /// when nothing is stored.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(DefaultValue::Static(value));
        self
    }

    /// Produce the default from this factory on each load instead of a
    /// fixed value.
    pub fn default_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Factory(Arc::new(factory)));
        self
    }

    /// Address a chunked document.
    pub fn chunked(mut self) -> Self {
        self.chunked = true;
        self
    }

    /// Expect this record version (default 1). Any version other than 1
    /// requires [`DocRefBuilder::transform`].
    pub fn version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Migrate stored documents whose version marker differs from the
    /// expected version.
    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(i64, Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Run this hook on every successfully loaded document.
    pub fn on_load<F>(mut self, hook: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.on_load = Some(Arc::new(hook));
        self
    }

    /// Validate and build the reference.
    pub fn build(self) -> Result<DocRef> {
        if self.version != 1 && self.transform.is_none() {
            return Err(Error::Config(format!(
                "record version {} on '{}' requires a transform function",
                self.version, self.path
            )));
        }
        Ok(DocRef {
            collection: self.collection,
            path: self.path,
            default: self.default,
            chunked: self.chunked,
            version: self.version,
            transform: self.transform,
            on_load: self.on_load,
        })
    }
}

impl DocRef {
    /// Builder entry point; see [`DocRefBuilder`].
    pub fn builder(collection: Arc<Collection>, path: impl Into<DocPath>) -> DocRefBuilder {
        DocRefBuilder::new(collection, path)
    }

    /// A plain version-1 reference with no default.
    pub fn new(collection: Arc<Collection>, path: impl Into<DocPath>) -> Self {
        DocRef {
            collection,
            path: path.into(),
            default: None,
            chunked: false,
            version: 1,
            transform: None,
            on_load: None,
        }
    }

    /// The document address.
    pub fn path(&self) -> &DocPath {
        &self.path
    }

    /// The collection this reference resolves against.
    pub fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }

    /// True iff anything is stored at the address.
    pub async fn exists(&self) -> Result<bool> {
        self.collection.exists(self.path.clone()).await
    }

    /// Load the document: version-gate, fill defaults, run the hook.
    ///
    /// `Ok(None)` means nothing stored and no default configured. The
    /// default never masks a driver error.
    pub async fn load(&self) -> Result<Option<Value>> {
        let options = LoadOptions {
            chunked: self.chunked,
            ..Default::default()
        };
        let found = self.collection.load(self.path.clone(), options).await?;
        match found {
            Some(value) => self.apply_load_policy(value).map(Some),
            None => Ok(self.default.as_ref().map(DefaultValue::produce)),
        }
    }

    fn apply_load_policy(&self, value: Value) -> Result<Value> {
        let stored_version = value
            .get(FIELD_VERSION)
            .and_then(Value::as_i64)
            .unwrap_or(1);
        let mut value = if stored_version != self.version {
            let transform = self.transform.as_ref().ok_or_else(|| {
                Error::Config(format!(
                    "stored version {stored_version} on '{}' does not match expected {} \
                     and no transform is configured",
                    self.path, self.version
                ))
            })?;
            transform(self.version, value)?
        } else {
            value
        };
        if let Some(default) = &self.default {
            merge::fill_defaults(&mut value, &default.produce());
        }
        if let Some(hook) = &self.on_load {
            value = hook(value);
        }
        Ok(value)
    }

    /// Load only the given fields. Unsupported on chunked references: a
    /// chunked document has no per-field physical form to project.
    pub async fn load_partial(&self, attributes: Vec<String>) -> Result<Option<Value>> {
        if self.chunked {
            return Err(Error::Unsupported(format!(
                "partial load on chunked reference '{}'",
                self.path
            )));
        }
        let options = LoadOptions::default().attributes(attributes);
        self.collection.load(self.path.clone(), options).await
    }

    /// Persist `data` at the address, stamping the expected version.
    pub async fn save(&self, data: Value) -> Result<Value> {
        let options = SaveOptions {
            chunked: self.chunked,
            version: Some(self.version),
            raw_operators: false,
        };
        self.collection.save(self.path.clone(), data, options).await
    }

    /// `$set` only the given fields, leaving the rest of the stored
    /// document untouched. Unsupported on chunked references: chunk
    /// payloads are opaque byte slices.
    pub async fn save_partial(&self, fields: Value) -> Result<Value> {
        if self.chunked {
            return Err(Error::Unsupported(format!(
                "partial save on chunked reference '{}'",
                self.path
            )));
        }
        self.collection
            .save(self.path.clone(), fields, SaveOptions::default())
            .await
    }

    /// Delete the document (all chunk records when chunked).
    pub async fn delete(&self) -> Result<u64> {
        self.collection
            .delete(self.path.clone(), DeleteOptions { chunked: self.chunked })
            .await
    }
}

impl fmt::Debug for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocRef")
            .field("collection", &self.collection.name())
            .field("path", &self.path)
            .field("chunked", &self.chunked)
            .field("version", &self.version)
            .field("default", &self.default)
            .finish()
    }
}

/// A reference paired with an owned in-memory snapshot.
///
/// The snapshot and the stored document drift freely between explicit
/// `reload`/`save` calls; nothing synchronizes them implicitly.
#[derive(Debug)]
pub struct DocContainer {
    reference: DocRef,
    data: Option<Value>,
}

impl DocContainer {
    /// An empty container over `reference`.
    pub fn new(reference: DocRef) -> Self {
        DocContainer {
            reference,
            data: None,
        }
    }

    /// A container pre-seeded with a snapshot.
    pub fn with_data(reference: DocRef, data: Value) -> Self {
        DocContainer {
            reference,
            data: Some(data),
        }
    }

    /// The underlying reference.
    pub fn reference(&self) -> &DocRef {
        &self.reference
    }

    /// Replace the snapshot from storage. `Ok(false)` means nothing was
    /// found (and no default applied); the snapshot is left untouched.
    pub async fn reload(&mut self) -> Result<bool> {
        match self.reference.load().await? {
            Some(value) => {
                self.data = Some(value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The current snapshot, if any.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Mutable access to the current snapshot.
    pub fn data_mut(&mut self) -> Option<&mut Value> {
        self.data.as_mut()
    }

    /// Replace the snapshot locally without touching storage.
    pub fn set_data(&mut self, data: Value) {
        self.data = Some(data);
    }

    /// Persist the snapshot. Saving an empty container is a configuration
    /// error, not a delete.
    pub async fn save(&self) -> Result<Value> {
        let data = self.data.clone().ok_or_else(|| {
            Error::Config(format!(
                "container for '{}' holds no data to save",
                self.reference.path
            ))
        })?;
        self.reference.save(data).await
    }

    /// `$set` the given fields in storage and merge them into the local
    /// snapshot so the two stay aligned.
    pub async fn save_partial(&mut self, fields: Value) -> Result<Value> {
        let saved = self.reference.save_partial(fields.clone()).await?;
        if let Some(snapshot) = self.data.as_mut() {
            merge::merge_into(snapshot, &fields);
        }
        Ok(saved)
    }

    /// Delete the stored document and clear the snapshot.
    pub async fn delete(&mut self) -> Result<u64> {
        let deleted = self.reference.delete().await?;
        self.data = None;
        Ok(deleted)
    }
}
