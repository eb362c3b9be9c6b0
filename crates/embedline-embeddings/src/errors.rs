//! Embedding error types.
//!
//! Every failure is surfaced synchronously to the caller of `embed`; nothing
//! is retried internally. Degenerate inputs (empty text) and unknown models
//! are diagnostics, not errors.

use thiserror::Error;

/// Errors from embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Caller-supplied task prefix is not recognized by the model's profile.
    #[error("{prefix:?} is not a valid task type for model {model}")]
    InvalidTaskPrefix {
        /// The rejected task string.
        prefix: String,
        /// Model identifier.
        model: String,
    },

    /// Requested output width is not legal for this model.
    #[error("unsupported dimensionality {requested} for model {model} ({hint})")]
    UnsupportedDimensionality {
        /// Requested dimensionality.
        requested: usize,
        /// Model identifier.
        model: String,
        /// Supported or recommended widths, already formatted.
        hint: String,
    },

    /// Chunk overlap does not fit in the window left after prefix and terminator.
    #[error("max chunk length of {max_len} is smaller than overlap of {overlap} tokens")]
    ChunkConfiguration {
        /// Tokens available per chunk.
        max_len: usize,
        /// Configured overlap.
        overlap: usize,
    },

    /// Long-document input exceeds the ceiling while averaging was requested.
    #[error("length of text at index {index} is {tokens} tokens which exceeds limit of {limit}")]
    InputTooLong {
        /// Index of the offending input.
        index: usize,
        /// Its token count.
        tokens: usize,
        /// Configured ceiling.
        limit: usize,
    },

    /// The encoder rejected a batch submission.
    #[error("encode failed: {0}")]
    EncodeFailure(String),

    /// Tokenization failed.
    #[error("tokenize failed: {0}")]
    Tokenize(String),

    /// Caller's output buffer cannot hold every row.
    #[error("output buffer holds {actual} floats, {expected} required")]
    OutputBuffer {
        /// Required length.
        expected: usize,
        /// Provided length.
        actual: usize,
    },

    /// Model initialization failed.
    #[error("Model initialization failed: {0}")]
    ModelInit(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Service not ready (model not loaded).
    #[error("Embedding service not ready")]
    NotReady,

    /// Generic internal error.
    #[error("{0}")]
    Internal(String),
}

/// Result alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;
