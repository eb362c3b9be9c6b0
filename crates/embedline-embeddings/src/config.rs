//! Embedding configuration.

use embedline_settings::types::EmbeddingSettings;
use tracing::debug;
use serde::{Deserialize, Serialize};

use crate::errors::{EmbeddingError, Result};

/// Tokens shared by consecutive chunks of one input.
pub const DEFAULT_CHUNK_OVERLAP: usize = 8;

/// Token ceiling for a single input in long-document mode.
pub const DEFAULT_LONG_DOCUMENT_MAX_TOKENS: usize = 8192;

/// Configuration for the embedding pipeline and its encoder backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingConfig {
    /// Model identifier; selects the profile.
    pub model: String,
    /// Hub repository for the ONNX backend.
    pub hub_repo: String,
    /// Quantization dtype.
    pub dtype: String,
    /// Local model cache directory (may contain `~`).
    pub cache_dir: String,
    /// Encoder output width.
    pub native_dimensions: usize,
    /// Token capacity of one encoder submission.
    pub max_batch_tokens: usize,
    /// Chunk overlap in tokens.
    pub chunk_overlap: usize,
    /// Long-document token ceiling.
    pub long_document_max_tokens: usize,
    /// Default requested dimensionality (`None` = native).
    pub dimensions: Option<usize>,
    /// Default chunk averaging behavior.
    pub mean_across_chunks: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::from_settings(&EmbeddingSettings::default())
    }
}

impl EmbeddingConfig {
    /// Create config from settings.
    pub fn from_settings(s: &EmbeddingSettings) -> Self {
        Self {
            model: s.model.clone(),
            hub_repo: s.hub_repo.clone(),
            dtype: s.dtype.clone(),
            cache_dir: s.cache_dir.clone(),
            native_dimensions: s.native_dimensions,
            max_batch_tokens: s.max_batch_tokens,
            chunk_overlap: s.chunk_overlap,
            long_document_max_tokens: s.long_document_max_tokens,
            dimensions: s.dimensions,
            mean_across_chunks: s.mean_across_chunks,
        }
    }

    /// Config for `model` with every other field at its default.
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Resolve the cache directory, expanding `~/` to the home directory.
    pub fn resolved_cache_dir(&self) -> String {
        if let Some(rest) = self.cache_dir.strip_prefix("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return format!("{home}/{rest}");
            }
        }
        self.cache_dir.clone()
    }

    /// Reject values no embed call could work with.
    ///
    /// The overlap is checked per call against the encoder's own capacity,
    /// see [`crate::chunk::ChunkSplitter::new`].
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_tokens == 0 {
            return Err(EmbeddingError::Config("maxBatchTokens must be positive".into()));
        }
        if self.native_dimensions == 0 {
            return Err(EmbeddingError::Config("nativeDimensions must be positive".into()));
        }
        Ok(())
    }
}

/// Install logging and build the pipeline config from the global settings.
///
/// Call once at startup; later calls reuse the loaded settings and leave
/// the installed subscriber in place.
pub fn bootstrap() -> EmbeddingConfig {
    let settings = embedline_settings::get_settings();
    embedline_core::logging::init(&settings.logging.level, settings.logging.json);
    let config = EmbeddingConfig::from_settings(&settings.embedding);
    debug!(model = %config.model, capacity = config.max_batch_tokens, "embedding config loaded");
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.model, "nomic-embed-text-v1.5");
        assert_eq!(config.chunk_overlap, DEFAULT_CHUNK_OVERLAP);
        assert_eq!(config.long_document_max_tokens, DEFAULT_LONG_DOCUMENT_MAX_TOKENS);
        assert_eq!(config.native_dimensions, 768);
        assert!(config.dimensions.is_none());
        assert!(config.mean_across_chunks);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_settings_copies_fields() {
        let settings = EmbeddingSettings {
            model: "e5-base-v2".into(),
            max_batch_tokens: 512,
            chunk_overlap: 4,
            dimensions: Some(384),
            mean_across_chunks: false,
            ..EmbeddingSettings::default()
        };
        let config = EmbeddingConfig::from_settings(&settings);
        assert_eq!(config.model, "e5-base-v2");
        assert_eq!(config.max_batch_tokens, 512);
        assert_eq!(config.chunk_overlap, 4);
        assert_eq!(config.dimensions, Some(384));
        assert!(!config.mean_across_chunks);
    }

    #[test]
    fn resolved_cache_dir_expands_tilde() {
        let config = EmbeddingConfig::default();
        let resolved = config.resolved_cache_dir();
        assert!(!resolved.starts_with('~'), "tilde should be expanded: {resolved}");
        assert!(resolved.ends_with("/.embedline/models"));
    }

    #[test]
    fn resolved_cache_dir_absolute_passthrough() {
        let config = EmbeddingConfig {
            cache_dir: "/absolute/path".into(),
            ..EmbeddingConfig::default()
        };
        assert_eq!(config.resolved_cache_dir(), "/absolute/path");
    }

    #[test]
    fn validate_ignores_overlap() {
        let config = EmbeddingConfig {
            max_batch_tokens: 8,
            chunk_overlap: 8,
            ..EmbeddingConfig::default()
        };
        assert!(config.validate().is_ok());
        let zero = EmbeddingConfig {
            native_dimensions: 0,
            ..EmbeddingConfig::default()
        };
        assert!(matches!(zero.validate(), Err(EmbeddingError::Config(_))));
    }

    #[test]
    fn bootstrap_uses_global_settings() {
        let config = bootstrap();
        let settings = embedline_settings::get_settings();
        assert_eq!(config.model, settings.embedding.model);
        assert_eq!(config.chunk_overlap, settings.embedding.chunk_overlap);
        // Second call is harmless
        assert_eq!(bootstrap().model, config.model);
    }

    #[test]
    fn partial_json_with_defaults() {
        let config: EmbeddingConfig = serde_json::from_str(r#"{"model": "llm-embedder"}"#).unwrap();
        assert_eq!(config.model, "llm-embedder");
        assert_eq!(config.chunk_overlap, 8);
    }
}
