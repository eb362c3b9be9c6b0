//! The embedding pipeline.
//!
//! ```text
//! texts ─► prefix + tokenize ─► chunks ─► batches ─► encoder
//!                                                     │
//!            out rows ◄── mean + L2 ◄── per-chunk L2 ◄┘
//! ```
//!
//! One [`Embedder`] owns one encoder. `embed` takes `&mut self`, so two
//! calls against the same encoder can never overlap.

use tracing::{debug, warn};

use crate::batch::{Batch, BatchScheduler};
use crate::chunk::{ChunkSplitter, InputLimits, prepare_tokens};
use crate::config::EmbeddingConfig;
use crate::encoder::SequenceEncoder;
use crate::errors::{EmbeddingError, Result};
use crate::pool::PoolingEngine;
use crate::prefix::{resolve_dimensionality, resolve_prefix, tokenize_prefix};
use crate::profiles::{self, EmbeddingProfile};

/// Requested output width.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Dimensionality {
    /// The encoder's native width.
    #[default]
    Native,
    /// Leading `n` components (nested-capable models only).
    Truncated(usize),
}

impl Dimensionality {
    /// Requested width, `None` for native.
    pub fn requested(self) -> Option<usize> {
        match self {
            Self::Native => None,
            Self::Truncated(n) => Some(n),
        }
    }
}

impl From<Option<usize>> for Dimensionality {
    fn from(value: Option<usize>) -> Self {
        value.map_or(Self::Native, Self::Truncated)
    }
}

/// Per-call options for [`Embedder::embed`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbedRequest {
    /// Inputs are retrieval queries rather than documents.
    pub is_retrieval: bool,
    /// Explicit task prefix, overriding `is_retrieval`.
    pub task: Option<String>,
    /// Output width.
    pub dimensionality: Dimensionality,
    /// Average all chunks of long inputs; otherwise only the first window
    /// is embedded.
    pub mean_across_chunks: bool,
    /// Enforce the long-document token ceiling.
    pub long_document: bool,
}

impl Default for EmbedRequest {
    fn default() -> Self {
        Self {
            is_retrieval: false,
            task: None,
            dimensionality: Dimensionality::Native,
            mean_across_chunks: true,
            long_document: false,
        }
    }
}

impl EmbedRequest {
    /// Request populated from configured defaults.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            dimensionality: config.dimensions.into(),
            mean_across_chunks: config.mean_across_chunks,
            ..Self::default()
        }
    }

    /// Embed inputs as retrieval queries.
    #[must_use]
    pub fn retrieval(mut self, is_retrieval: bool) -> Self {
        self.is_retrieval = is_retrieval;
        self
    }

    /// Use an explicit task prefix.
    #[must_use]
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Set the output width.
    #[must_use]
    pub fn with_dimensionality(mut self, dimensionality: Dimensionality) -> Self {
        self.dimensionality = dimensionality;
        self
    }

    /// Average chunks (`true`) or keep only the first window (`false`).
    #[must_use]
    pub fn with_mean_across_chunks(mut self, mean: bool) -> Self {
        self.mean_across_chunks = mean;
        self
    }

    /// Enforce the long-document token ceiling.
    #[must_use]
    pub fn with_long_document(mut self, long_document: bool) -> Self {
        self.long_document = long_document;
        self
    }
}

/// What an embed call did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmbedStats {
    /// Width of every output row.
    pub dimensions: usize,
    /// Chunks averaged into each row, in input order.
    pub contributions: Vec<usize>,
    /// Encoder submissions made.
    pub batches: usize,
}

/// Runs the embedding pipeline over one encoder.
#[derive(Debug)]
pub struct Embedder<E> {
    encoder: E,
    config: EmbeddingConfig,
    profile: Option<&'static EmbeddingProfile>,
}

impl<E: SequenceEncoder> Embedder<E> {
    /// Pipeline for `config.model` on top of `encoder`.
    pub fn new(encoder: E, config: EmbeddingConfig) -> Result<Self> {
        config.validate()?;
        let profile = profiles::lookup(&config.model);
        if profile.is_none() {
            warn!(model = %config.model, "unknown model, no embedding profile");
        }
        if encoder.native_width() != config.native_dimensions {
            warn!(
                model = %config.model,
                configured = config.native_dimensions,
                encoder = encoder.native_width(),
                "encoder width differs from configuration, using encoder width"
            );
        }
        if encoder.max_batch_tokens() != config.max_batch_tokens {
            warn!(
                model = %config.model,
                configured = config.max_batch_tokens,
                encoder = encoder.max_batch_tokens(),
                "batch capacity differs from configuration, using encoder capacity"
            );
        }
        Ok(Self {
            encoder,
            config,
            profile,
        })
    }

    /// The wrapped encoder.
    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Pipeline configuration.
    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    /// Profile of the configured model, if known.
    pub fn profile(&self) -> Option<&'static EmbeddingProfile> {
        self.profile
    }

    /// Width of rows produced for `dimensionality`, or the error `embed`
    /// would return.
    pub fn output_dimensions(&self, dimensionality: Dimensionality) -> Result<usize> {
        resolve_dimensionality(
            self.profile,
            &self.config.model,
            self.encoder.native_width(),
            dimensionality.requested(),
        )
    }

    /// Embed `texts` into `out`, one unit-length row per input in input
    /// order. `out` must hold at least `texts.len() * dimensions` floats.
    pub fn embed<S: AsRef<str>>(
        &mut self,
        texts: &[S],
        out: &mut [f32],
        request: &EmbedRequest,
    ) -> Result<EmbedStats> {
        let model = self.config.model.as_str();
        let dims = self.output_dimensions(request.dimensionality)?;
        let expected = texts.len() * dims;
        if out.len() < expected {
            return Err(EmbeddingError::OutputBuffer {
                expected,
                actual: out.len(),
            });
        }
        let prefix = resolve_prefix(
            self.profile,
            model,
            request.is_retrieval,
            request.task.as_deref(),
        )?;
        if texts.is_empty() {
            return Ok(EmbedStats {
                dimensions: dims,
                ..EmbedStats::default()
            });
        }

        let encoder = &mut self.encoder;
        let prefix_tokens = tokenize_prefix(&*encoder, &prefix)?;
        let splitter = ChunkSplitter::new(
            &prefix_tokens,
            encoder.has_trailing_terminator(),
            encoder.max_batch_tokens(),
            self.config.chunk_overlap,
            request.mean_across_chunks,
        )?;

        let limits = InputLimits {
            long_document_max: request
                .long_document
                .then_some(self.config.long_document_max_tokens),
            mean_across_chunks: request.mean_across_chunks,
        };
        let mut chunks = Vec::new();
        for (index, text) in texts.iter().enumerate() {
            let tokens = prepare_tokens(&*encoder, index, text.as_ref(), limits)?;
            chunks.extend(splitter.split(index, &tokens));
        }
        debug!(
            model,
            inputs = texts.len(),
            chunks = chunks.len(),
            max_chunk_len = splitter.max_chunk_len(),
            "split inputs"
        );

        let nested = self.profile.is_some_and(|p| p.nested_capable);
        let mut pool = PoolingEngine::new(texts.len(), encoder.native_width(), dims, nested);
        let terminator = encoder
            .has_trailing_terminator()
            .then(|| encoder.eos_token());
        let mut scheduler = BatchScheduler::new(encoder.max_batch_tokens(), terminator);

        let mut submit = |batch: &Batch| -> Result<()> {
            encoder.submit_batch(batch)?;
            pool.absorb(&*encoder, batch)
        };
        for chunk in &chunks {
            scheduler.offer(chunk, &mut submit)?;
        }
        let batches = scheduler.finish(&mut submit)?;

        let contributions = pool.finish(&mut out[..expected])?;
        Ok(EmbedStats {
            dimensions: dims,
            contributions,
            batches,
        })
    }

    /// Embed `texts` into freshly allocated rows.
    pub fn embed_vectors<S: AsRef<str>>(
        &mut self,
        texts: &[S],
        request: &EmbedRequest,
    ) -> Result<Vec<Vec<f32>>> {
        let dims = self.output_dimensions(request.dimensionality)?;
        let mut flat = vec![0.0; texts.len() * dims];
        let _stats = self.embed(texts, &mut flat, request)?;
        Ok(flat.chunks_exact(dims).map(<[f32]>::to_vec).collect())
    }
}
