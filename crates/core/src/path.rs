//! Typed document paths
//!
//! A path addresses one logical document and is either a plain string key
//! or an arbitrary filter object. The source-of-truth representation is the
//! tagged [`DocPath`] union, resolved exactly once at the public API
//! boundary into a normalized filter map (`{path: key}` for string keys)
//! rather than re-checked per call.

use crate::error::{Error, Result};
use crate::fields::FIELD_PATH;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Address of one logical document: a string key or a filter object.
///
/// Paths are opaque to the storage layer beyond being used as a filter key.
/// `DocPath` is cheap to clone and serializable, so references can carry it
/// across boundaries before any load decision is made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocPath {
    /// Plain string key, normalized to a `{path: key}` filter.
    Key(String),
    /// Arbitrary filter object matched against physical records.
    Filter(Map<String, Value>),
}

impl DocPath {
    /// Build a string-key path.
    pub fn key(key: impl Into<String>) -> Self {
        DocPath::Key(key.into())
    }

    /// Build a filter-object path.
    pub fn filter(filter: Map<String, Value>) -> Self {
        DocPath::Filter(filter)
    }

    /// Resolve into the normalized filter map used against the driver.
    ///
    /// An empty key or empty filter addresses nothing and is rejected as a
    /// programming error.
    pub fn to_filter(&self) -> Result<Map<String, Value>> {
        match self {
            DocPath::Key(key) if key.is_empty() => {
                Err(Error::Config("document path key must not be empty".into()))
            }
            DocPath::Key(key) => {
                let mut filter = Map::new();
                filter.insert(FIELD_PATH.to_string(), Value::String(key.clone()));
                Ok(filter)
            }
            DocPath::Filter(filter) if filter.is_empty() => Err(Error::Config(
                "document path filter must not be empty".into(),
            )),
            DocPath::Filter(filter) => Ok(filter.clone()),
        }
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocPath::Key(key) => write!(f, "{key}"),
            DocPath::Filter(filter) => write!(f, "{}", Value::Object(filter.clone())),
        }
    }
}

impl From<&str> for DocPath {
    fn from(key: &str) -> Self {
        DocPath::Key(key.to_string())
    }
}

impl From<String> for DocPath {
    fn from(key: String) -> Self {
        DocPath::Key(key)
    }
}

impl From<Map<String, Value>> for DocPath {
    fn from(filter: Map<String, Value>) -> Self {
        DocPath::Filter(filter)
    }
}
