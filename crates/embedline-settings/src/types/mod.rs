//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]`. Each type implements
//! [`Default`] with production values, and `#[serde(default)]` lets a
//! settings file name only the fields it changes.

mod embedding;

pub use embedding::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// Loaded from `~/.embedline/settings.json` with defaults applied for
/// missing fields. Environment variables can override specific values.
///
/// ```json
/// {
///   "embedding": { "model": "nomic-embed-text-v1.5", "dimensions": 256 },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbedlineSettings {
    /// Settings schema version.
    pub version: String,
    /// Embedding pipeline settings.
    pub embedding: EmbeddingSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for EmbedlineSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            embedding: EmbeddingSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level for the stderr subscriber (`RUST_LOG` wins when set).
    pub level: String,
    /// Emit newline-delimited JSON instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}
