//! ONNX Runtime encoder and service (feature-gated behind `ort`).
//!
//! Downloads a BERT-style embedding model via `hf-hub`, tokenizes with
//! `tokenizers` and runs packed batches through `ort`. Each sequence of a
//! batch becomes one padded row; its vector is the attention-masked mean of
//! the token states.

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::OnceLock;

use async_trait::async_trait;
use ort::session::{Session, SessionInputValue, SessionInputs};
use tracing::{debug, info};

use crate::batch::Batch;
use crate::config::EmbeddingConfig;
use crate::embedder::{EmbedRequest, Embedder};
use crate::encoder::{SequenceEncoder, TokenId};
use crate::errors::{EmbeddingError, Result};
use crate::service::{EmbeddingService, PipelineService};

const FALLBACK_CLS: TokenId = 101;
const FALLBACK_SEP: TokenId = 102;

/// [`SequenceEncoder`] backed by an ONNX Runtime session.
pub struct OrtEncoder {
    session: Session,
    tokenizer: tokenizers::Tokenizer,
    wants_token_types: bool,
    native: usize,
    capacity: usize,
    bos: TokenId,
    eos: TokenId,
    vectors: Vec<Vec<f32>>,
}

impl OrtEncoder {
    /// Download (if needed) and load the configured model. Blocking.
    pub fn load(config: &EmbeddingConfig) -> Result<Self> {
        let (model_path, tokenizer_path) = download_model(config)?;

        info!(model = %model_path.display(), "loading ONNX model");

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbeddingError::ModelInit(format!("tokenizer load: {e}")))?;

        let session = Session::builder()
            .map_err(|e| EmbeddingError::ModelInit(format!("session builder: {e}")))?
            .with_intra_threads(2)
            .map_err(|e| EmbeddingError::ModelInit(format!("thread config: {e}")))?
            .with_log_level(ort::logging::LogLevel::Warning)
            .map_err(|e| EmbeddingError::ModelInit(format!("log level: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbeddingError::ModelInit(format!("model load: {e}")))?;

        let wants_token_types = session
            .inputs()
            .iter()
            .any(|input| input.name() == "token_type_ids");

        let special = |name: &str, fallback: TokenId| {
            tokenizer
                .token_to_id(name)
                .and_then(|id| TokenId::try_from(id).ok())
                .unwrap_or(fallback)
        };
        let bos = special("[CLS]", FALLBACK_CLS);
        let eos = special("[SEP]", FALLBACK_SEP);

        Ok(Self {
            session,
            tokenizer,
            wants_token_types,
            native: config.native_dimensions,
            capacity: config.max_batch_tokens,
            bos,
            eos,
            vectors: Vec::new(),
        })
    }

    /// [`Self::load`] on the blocking pool.
    pub async fn load_async(config: EmbeddingConfig) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::load(&config))
            .await
            .map_err(|e| EmbeddingError::Internal(format!("join error: {e}")))?
    }

    fn run(&mut self, batch: &Batch) -> Result<Vec<Vec<f32>>> {
        let rows = batch.sequence_count();
        let max_len = (0..rows)
            .filter_map(|slot| batch.sequence_range(slot).map(|r| r.len()))
            .max()
            .unwrap_or(0);
        if max_len == 0 {
            return Ok(Vec::new());
        }

        let mut input_ids = vec![0i64; rows * max_len];
        let mut attention_mask = vec![0i64; rows * max_len];
        for slot in 0..rows {
            let tokens = batch.sequence_tokens(slot).unwrap_or_default();
            let offset = slot * max_len;
            for (j, &id) in tokens.iter().enumerate() {
                input_ids[offset + j] = i64::from(id);
                attention_mask[offset + j] = 1;
            }
        }

        #[allow(clippy::cast_possible_wrap)]
        let shape = vec![rows as i64, max_len as i64];

        let tensor = |name: &'static str, data: Vec<i64>| -> Result<(Cow<'static, str>, SessionInputValue<'static>)> {
            let value = ort::value::Tensor::from_array((shape.clone(), data))
                .map_err(|e| EmbeddingError::EncodeFailure(format!("{name} tensor: {e}")))?;
            Ok((Cow::Borrowed(name), value.into()))
        };
        let mut inputs = vec![
            tensor("input_ids", input_ids)?,
            tensor("attention_mask", attention_mask.clone())?,
        ];
        if self.wants_token_types {
            inputs.push(tensor("token_type_ids", vec![0i64; rows * max_len])?);
        }

        let outputs = self
            .session
            .run(SessionInputs::from(inputs))
            .map_err(|e| EmbeddingError::EncodeFailure(format!("inference: {e}")))?;

        let (output_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbeddingError::EncodeFailure(format!("extract tensor: {e}")))?;

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let dims: Vec<usize> = output_shape.iter().map(|&d| d as usize).collect();
        match dims.as_slice() {
            [b, hidden] if *b == rows => Ok(data.chunks_exact(*hidden).map(<[f32]>::to_vec).collect()),
            [b, seq, hidden] if *b == rows => Ok((0..rows)
                .map(|row| masked_mean(data, &attention_mask, row, *seq, max_len, *hidden))
                .collect()),
            _ => Err(EmbeddingError::EncodeFailure(format!(
                "unexpected output shape: {output_shape:?}"
            ))),
        }
    }
}

/// Mean of the unmasked token states of batch row `row`.
#[allow(clippy::cast_precision_loss)]
fn masked_mean(
    data: &[f32],
    attention_mask: &[i64],
    row: usize,
    seq_len: usize,
    mask_len: usize,
    hidden: usize,
) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0usize;
    for j in 0..seq_len.min(mask_len) {
        if attention_mask[row * mask_len + j] == 0 {
            continue;
        }
        let base = (row * seq_len + j) * hidden;
        for (acc, x) in sum.iter_mut().zip(&data[base..base + hidden]) {
            *acc += x;
        }
        count += 1;
    }
    if count > 0 {
        for x in &mut sum {
            *x /= count as f32;
        }
    }
    sum
}

impl SequenceEncoder for OrtEncoder {
    fn tokenize(&self, text: &str, want_bos: bool) -> Result<Vec<TokenId>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| EmbeddingError::Tokenize(e.to_string()))?;
        let bos = want_bos.then_some(self.bos);
        bos.into_iter()
            .map(Ok)
            .chain(encoding.get_ids().iter().map(|&id| {
                TokenId::try_from(id).map_err(|_| EmbeddingError::Tokenize(format!("token id {id} out of range")))
            }))
            .collect()
    }

    fn native_width(&self) -> usize {
        self.native
    }

    fn max_batch_tokens(&self) -> usize {
        self.capacity
    }

    fn bos_token(&self) -> TokenId {
        self.bos
    }

    fn eos_token(&self) -> TokenId {
        self.eos
    }

    fn has_trailing_terminator(&self) -> bool {
        true
    }

    fn submit_batch(&mut self, batch: &Batch) -> Result<()> {
        self.vectors.clear();
        let vectors = self.run(batch)?;
        if let Some(v) = vectors.first() {
            if v.len() != self.native {
                return Err(EmbeddingError::EncodeFailure(format!(
                    "model produced {} dimensions, configured {}",
                    v.len(),
                    self.native
                )));
            }
        }
        self.vectors = vectors;
        Ok(())
    }

    fn sequence_vector(&self, slot: usize) -> Option<&[f32]> {
        self.vectors.get(slot).map(Vec::as_slice)
    }

    fn token_vector(&self, _index: usize) -> Option<&[f32]> {
        None
    }
}

/// Download model files via `hf-hub`, returning (`model_path`, `tokenizer_path`).
fn download_model(config: &EmbeddingConfig) -> Result<(PathBuf, PathBuf)> {
    let cache_dir = config.resolved_cache_dir();
    debug!(cache_dir, repo = %config.hub_repo, "downloading model via hf-hub");

    let api = hf_hub::api::sync::ApiBuilder::new()
        .with_cache_dir(PathBuf::from(&cache_dir))
        .build()
        .map_err(|e| EmbeddingError::ModelInit(format!("hf-hub api: {e}")))?;

    let repo = api.model(config.hub_repo.clone());

    let model_filename = model_filename(&config.dtype);
    let model_path = repo
        .get(&model_filename)
        .map_err(|e| EmbeddingError::ModelInit(format!("model download ({model_filename}): {e}")))?;

    let tokenizer_path = repo
        .get("tokenizer.json")
        .map_err(|e| EmbeddingError::ModelInit(format!("tokenizer download: {e}")))?;

    info!(model = %model_path.display(), tokenizer = %tokenizer_path.display(), "model files ready");
    Ok((model_path, tokenizer_path))
}

fn model_filename(dtype: &str) -> String {
    match dtype {
        "" | "fp32" => "onnx/model.onnx".to_string(),
        other => format!("onnx/model_{other}.onnx"),
    }
}

/// Lazily initialized ONNX embedding service.
pub struct OnnxEmbeddingService {
    config: EmbeddingConfig,
    pipeline: OnceLock<PipelineService<OrtEncoder>>,
}

impl OnnxEmbeddingService {
    /// Create a new ONNX embedding service (not yet initialized).
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            config,
            pipeline: OnceLock::new(),
        }
    }

    /// Download and load the model. Later calls are no-ops.
    pub async fn initialize(&self) -> Result<()> {
        if self.pipeline.get().is_some() {
            return Ok(());
        }
        let encoder = OrtEncoder::load_async(self.config.clone()).await?;
        let pipeline = PipelineService::new(Embedder::new(encoder, self.config.clone())?)?;
        let _ = self.pipeline.set(pipeline);
        info!("ONNX embedding service ready");
        Ok(())
    }

    /// Get the expected model cache path.
    pub fn model_path(&self) -> PathBuf {
        PathBuf::from(self.config.resolved_cache_dir())
    }
}

#[async_trait]
impl EmbeddingService for OnnxEmbeddingService {
    async fn embed_with(&self, texts: &[String], request: EmbedRequest) -> Result<Vec<Vec<f32>>> {
        let pipeline = self.pipeline.get().ok_or(EmbeddingError::NotReady)?;
        pipeline.embed_with(texts, request).await
    }

    fn default_request(&self) -> EmbedRequest {
        EmbedRequest::from_config(&self.config)
    }

    fn is_ready(&self) -> bool {
        self.pipeline.get().is_some()
    }

    fn dimensions(&self) -> usize {
        self.pipeline
            .get()
            .map_or_else(|| self.config.dimensions.unwrap_or(self.config.native_dimensions), EmbeddingService::dimensions)
    }
}
