//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`EmbedlineSettings::default()`]
//! 2. If `~/.embedline/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `EMBEDLINE_*` environment variable overrides (highest priority)
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::EmbedlineSettings;

/// Resolve the path to the settings file (`~/.embedline/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".embedline").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<EmbedlineSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or values that fail
/// validation are errors.
pub fn load_settings_from_path(path: &Path) -> Result<EmbedlineSettings> {
    load_with_overrides(path, |name| std::env::var(name).ok())
}

/// Load settings from `path`, taking overrides from `lookup` instead of the
/// process environment.
pub fn load_with_overrides<F>(path: &Path, lookup: F) -> Result<EmbedlineSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(EmbedlineSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: EmbedlineSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut EmbedlineSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply `EMBEDLINE_*` overrides read through `lookup`.
///
/// Integers must parse and fall within range; booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Invalid values are
/// ignored with a warning.
pub fn apply_overrides<F>(settings: &mut EmbedlineSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };
    let embedding = &mut settings.embedding;

    if let Some(v) = env.string("EMBEDLINE_MODEL") {
        embedding.model = v;
    }
    if let Some(v) = env.string("EMBEDLINE_CACHE_DIR") {
        embedding.cache_dir = v;
    }
    if let Some(v) = env.usize("EMBEDLINE_CHUNK_OVERLAP", 0, 4096) {
        embedding.chunk_overlap = v;
    }
    if let Some(v) = env.usize("EMBEDLINE_LONG_DOCUMENT_MAX_TOKENS", 1, 1_048_576) {
        embedding.long_document_max_tokens = v;
    }
    if let Some(v) = env.usize("EMBEDLINE_DIMENSIONS", 1, 65_536) {
        embedding.dimensions = Some(v);
    }
    if let Some(v) = env.bool("EMBEDLINE_MEAN_ACROSS_CHUNKS") {
        embedding.mean_across_chunks = v;
    }
    if let Some(v) = env.usize("EMBEDLINE_MAX_BATCH_TOKENS", 1, 1_048_576) {
        embedding.max_batch_tokens = v;
    }
    if let Some(v) = env.string("EMBEDLINE_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Reject combinations no embed call could satisfy.
pub fn validate(settings: &EmbedlineSettings) -> Result<()> {
    let e = &settings.embedding;
    if e.max_batch_tokens == 0 {
        return Err(SettingsError::InvalidValue(
            "maxBatchTokens must be positive".into(),
        ));
    }
    if e.native_dimensions == 0 {
        return Err(SettingsError::InvalidValue(
            "nativeDimensions must be positive".into(),
        ));
    }
    if e.chunk_overlap >= e.max_batch_tokens {
        return Err(SettingsError::InvalidValue(format!(
            "chunkOverlap ({}) must be below maxBatchTokens ({})",
            e.chunk_overlap, e.max_batch_tokens
        )));
    }
    if e.dimensions == Some(0) {
        return Err(SettingsError::InvalidValue(
            "dimensions must be positive when set".into(),
        ));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `usize` within an inclusive range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}
