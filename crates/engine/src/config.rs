//! Engine configuration
//!
//! The mode flag controls the connection startup policy: production
//! connects synchronously and aborts startup on failure, development
//! connects in the background so application startup is never blocked by
//! database latency.

use chunkstore_storage::ClientOptions;
use serde::{Deserialize, Serialize};

/// Runtime mode controlling the connection startup policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Background connect on `initialize()`; connection failures surface
    /// lazily to the first caller that needs the database.
    #[default]
    Development,
    /// Blocking connect on `initialize()`; a connection failure is fatal
    /// to startup.
    Production,
}

impl Mode {
    /// True for [`Mode::Production`].
    pub fn is_production(&self) -> bool {
        matches!(self, Mode::Production)
    }
}

/// Engine configuration: mode plus client construction options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Connection startup policy.
    pub mode: Mode,
    /// Client options handed to the driver connector. Baseline values
    /// (pinned API version, strict mode, deprecation warnings) come from
    /// [`ClientOptions::default`]; callers override individual fields.
    pub client: ClientOptions,
}

impl EngineConfig {
    /// Configuration for the given mode with baseline client options.
    pub fn with_mode(mode: Mode) -> Self {
        EngineConfig {
            mode,
            client: ClientOptions::default(),
        }
    }
}
