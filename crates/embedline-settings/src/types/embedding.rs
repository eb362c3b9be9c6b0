//! Embedding pipeline settings.

use serde::{Deserialize, Serialize};

/// Embedding model and chunking configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    /// Model identifier; selects the prefix/normalization profile.
    pub model: String,
    /// Hugging Face hub repository holding the ONNX export of `model`.
    pub hub_repo: String,
    /// Quantization dtype of the ONNX export (e.g. `"fp32"`, `"q4"`).
    pub dtype: String,
    /// Local model cache directory (may contain `~`).
    pub cache_dir: String,
    /// Encoder output width before any truncation.
    pub native_dimensions: usize,
    /// Token capacity of one encoder submission.
    pub max_batch_tokens: usize,
    /// Tokens shared by consecutive chunks of the same input.
    pub chunk_overlap: usize,
    /// Token ceiling for a single input in long-document mode.
    pub long_document_max_tokens: usize,
    /// Requested output dimensionality; `None` means native.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    /// Average over all chunks of an input instead of truncating to one.
    pub mean_across_chunks: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text-v1.5".to_string(),
            hub_repo: "nomic-ai/nomic-embed-text-v1.5".to_string(),
            dtype: "fp32".to_string(),
            cache_dir: "~/.embedline/models".to_string(),
            native_dimensions: 768,
            max_batch_tokens: 2048,
            chunk_overlap: 8,
            long_document_max_tokens: 8192,
            dimensions: None,
            mean_across_chunks: true,
        }
    }
}
