//! # embedline-embeddings
//!
//! Fixed-width, L2-normalized text embeddings over a transformer encoder.
//!
//! Inputs of any length are embedded through a chunked pipeline:
//! - Task prefix from the model's profile -> tokenize
//! - Overlapping windows sized to the encoder's batch capacity
//! - Packed batch submissions -> per-chunk vectors
//! - Optional Matryoshka layer norm + truncation, per-chunk L2 norm
//! - Mean across chunks + final L2 norm, one row per input
//!
//! [`Embedder`] is the synchronous pipeline, [`PipelineService`] its async
//! wrapper. [`MockEncoder`] is a deterministic encoder for tests; the
//! ONNX Runtime encoder lives behind the `ort` feature.
//!
//! ## Crate Position
//!
//! Depends on: embedline-core, embedline-settings.

#![deny(unsafe_code)]

pub mod batch;
pub mod chunk;
pub mod config;
pub mod embedder;
pub mod encoder;
pub mod errors;
pub mod mock;
pub mod normalize;
#[cfg(feature = "ort")]
pub mod ort_service;
pub mod pool;
pub mod prefix;
pub mod profiles;
pub mod service;

pub use batch::{Batch, BatchScheduler};
pub use chunk::{Chunk, ChunkSplitter, EMPTY_PLACEHOLDER, chunk_count};
pub use config::{DEFAULT_CHUNK_OVERLAP, DEFAULT_LONG_DOCUMENT_MAX_TOKENS, EmbeddingConfig, bootstrap};
pub use embedder::{Dimensionality, EmbedRequest, EmbedStats, Embedder};
pub use encoder::{SequenceEncoder, TokenId};
pub use errors::{EmbeddingError, Result};
pub use mock::MockEncoder;
pub use normalize::{l2_norm, l2_normalize};
#[cfg(feature = "ort")]
pub use ort_service::{OnnxEmbeddingService, OrtEncoder};
pub use pool::PoolingEngine;
pub use profiles::EmbeddingProfile;
pub use service::{EmbeddingService, PipelineService};
