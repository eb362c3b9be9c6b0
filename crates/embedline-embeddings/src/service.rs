//! Async embedding service over the blocking pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::embedder::{EmbedRequest, Embedder};
use crate::encoder::SequenceEncoder;
use crate::errors::{EmbeddingError, Result};

/// Trait for embedding text into vectors.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a batch of texts with explicit options.
    async fn embed_with(&self, texts: &[String], request: EmbedRequest) -> Result<Vec<Vec<f32>>>;

    /// Options used by [`Self::embed`] and [`Self::embed_single`].
    fn default_request(&self) -> EmbedRequest {
        EmbedRequest::default()
    }

    /// Embed a batch of documents.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_with(texts, self.default_request()).await
    }

    /// Embed a single document (default: calls `embed` with one item).
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Internal("empty result".into()))
    }

    /// Embed a single retrieval query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let request = self.default_request().retrieval(true);
        let results = self.embed_with(&[text.to_string()], request).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Internal("empty result".into()))
    }

    /// Whether the service is ready for inference.
    fn is_ready(&self) -> bool;

    /// Output embedding dimensions for the default request.
    fn dimensions(&self) -> usize;
}

/// [`EmbeddingService`] running an [`Embedder`] on the blocking pool.
///
/// Calls are serialized on one mutex; the pipeline itself never runs on a
/// runtime worker thread.
#[derive(Debug)]
pub struct PipelineService<E> {
    embedder: Arc<Mutex<Embedder<E>>>,
    defaults: EmbedRequest,
    dimensions: usize,
}

impl<E: SequenceEncoder + Send + 'static> PipelineService<E> {
    /// Wrap `embedder`, taking default options from its configuration.
    pub fn new(embedder: Embedder<E>) -> Result<Self> {
        let defaults = EmbedRequest::from_config(embedder.config());
        let dimensions = embedder.output_dimensions(defaults.dimensionality)?;
        Ok(Self {
            embedder: Arc::new(Mutex::new(embedder)),
            defaults,
            dimensions,
        })
    }

    /// Run `f` against the embedder on the calling thread.
    pub fn with_embedder<T>(&self, f: impl FnOnce(&Embedder<E>) -> T) -> T {
        f(&self.embedder.lock())
    }
}

#[async_trait]
impl<E: SequenceEncoder + Send + 'static> EmbeddingService for PipelineService<E> {
    async fn embed_with(&self, texts: &[String], request: EmbedRequest) -> Result<Vec<Vec<f32>>> {
        let embedder = Arc::clone(&self.embedder);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || embedder.lock().embed_vectors(&texts, &request))
            .await
            .map_err(|e| EmbeddingError::Internal(format!("join error: {e}")))?
    }

    fn default_request(&self) -> EmbedRequest {
        self.defaults.clone()
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedder::Dimensionality;
    use crate::mock::MockEncoder;
    use crate::normalize::l2_norm;
    use assert_matches::assert_matches;

    fn service(config: EmbeddingConfig) -> PipelineService<MockEncoder> {
        let encoder = MockEncoder::new(config.native_dimensions, config.max_batch_tokens);
        PipelineService::new(Embedder::new(encoder, config).unwrap()).unwrap()
    }

    fn nomic() -> EmbeddingConfig {
        EmbeddingConfig {
            native_dimensions: 64,
            max_batch_tokens: 128,
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn pipeline_service_implements_trait() {
        fn assert_embedding_service<T: EmbeddingService>() {}
        assert_embedding_service::<PipelineService<MockEncoder>>();
    }

    #[tokio::test]
    async fn single_returns_correct_dims() {
        let svc = service(nomic());
        let result = svc.embed_single("test").await.unwrap();
        assert_eq!(result.len(), 64);
        assert_eq!(svc.dimensions(), 64);
        assert!((l2_norm(&result) - 1.0).abs() < 1e-5, "should be unit vector");
    }

    #[tokio::test]
    async fn batch_correct_count() {
        let svc = service(nomic());
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let results = svc.embed(&texts).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.len() == 64));
    }

    #[tokio::test]
    async fn deterministic_same_input() {
        let svc = service(nomic());
        let a = svc.embed_single("hello world").await.unwrap();
        let b = svc.embed_single("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn query_differs_from_document() {
        let svc = service(nomic());
        let doc = svc.embed_single("hello").await.unwrap();
        let query = svc.embed_query("hello").await.unwrap();
        assert_ne!(doc, query);
    }

    #[tokio::test]
    async fn configured_dimensions_become_default() {
        let svc = service(EmbeddingConfig {
            dimensions: Some(16),
            ..nomic()
        });
        assert_eq!(svc.dimensions(), 16);
        assert_eq!(svc.embed_single("x").await.unwrap().len(), 16);

        let full = svc
            .embed_with(
                &["x".to_string()],
                EmbedRequest::default().with_dimensionality(Dimensionality::Native),
            )
            .await
            .unwrap();
        assert_eq!(full[0].len(), 64);
    }

    #[test]
    fn unsupported_configured_dimensions_fail_construction() {
        let config = EmbeddingConfig {
            model: "nomic-embed-text-v1".into(),
            dimensions: Some(16),
            ..nomic()
        };
        let encoder = MockEncoder::new(64, 128);
        let embedder = Embedder::new(encoder, config).unwrap();
        assert_matches!(
            PipelineService::new(embedder),
            Err(EmbeddingError::UnsupportedDimensionality { .. })
        );
    }

    #[tokio::test]
    async fn empty_batch_skips_pipeline() {
        let svc = service(nomic());
        assert!(svc.embed(&[]).await.unwrap().is_empty());
        svc.with_embedder(|e| assert!(e.encoder().history().is_empty()));
    }

    #[tokio::test]
    async fn empty_batch_still_validates_request() {
        let svc = service(nomic());
        let result = svc
            .embed_with(&[], EmbedRequest::default().with_task("bogus"))
            .await;
        assert_matches!(result, Err(EmbeddingError::InvalidTaskPrefix { .. }));

        let result = svc
            .embed_with(&[], EmbedRequest::default().with_dimensionality(Dimensionality::Truncated(1000)))
            .await;
        assert_matches!(result, Err(EmbeddingError::UnsupportedDimensionality { .. }));
        svc.with_embedder(|e| assert!(e.encoder().history().is_empty()));
    }

    #[tokio::test]
    async fn errors_propagate() {
        let svc = service(nomic());
        let request = EmbedRequest::default().with_task("summarize");
        let result = svc.embed_with(&["x".to_string()], request).await;
        assert_matches!(result, Err(EmbeddingError::InvalidTaskPrefix { .. }));
    }

    #[tokio::test]
    async fn concurrent_calls_are_serialized() {
        let svc = Arc::new(service(nomic()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move { svc.embed_single(&format!("text {i}")).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), 64);
        }
        svc.with_embedder(|e| assert_eq!(e.encoder().history().len(), 8));
    }
}
