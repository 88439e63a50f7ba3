//! Embedding providers.
//!
//! The core only depends on [`EmbeddingProvider`]; concrete providers are
//! constructed once at startup and shared as `Arc<dyn EmbeddingProvider>`.

mod http;
mod onnx;

pub use http::HttpEmbeddingClient;
pub use onnx::OnnxEmbedder;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::EmbeddingError;
use crate::models::{Chunk, EmbeddedChunk, EmbeddingBackend, EmbeddingConfig};
use crate::utils::retry::{RetryPolicy, with_retry};

/// Maps text to fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Dimension of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Embed one text. Empty text is [`EmbeddingError::EmptyInput`].
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }

    /// Embed many texts, one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Shared handle to the process-wide provider.
pub type SharedEmbeddingProvider = Arc<dyn EmbeddingProvider>;

/// Build the provider selected by the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<SharedEmbeddingProvider, EmbeddingError> {
    match config.backend {
        EmbeddingBackend::Http => Ok(Arc::new(HttpEmbeddingClient::new(config)?)),
        EmbeddingBackend::Onnx => {
            let model_dir = config.model_path.as_ref().ok_or_else(|| {
                EmbeddingError::ModelError("embedding.model_path is required for onnx".to_string())
            })?;
            Ok(Arc::new(OnnxEmbedder::load(config, model_dir)?))
        }
    }
}

/// Wraps a provider so every batch call is retried under `policy`.
pub struct RetryingProvider {
    inner: SharedEmbeddingProvider,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: SharedEmbeddingProvider, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl EmbeddingProvider for RetryingProvider {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        with_retry(&self.policy, || self.inner.embed_batch(texts)).await
    }
}

/// Reject empty input the way every provider must.
pub(crate) fn ensure_non_empty(texts: &[String]) -> Result<(), EmbeddingError> {
    if texts.is_empty() || texts.iter().any(|t| t.trim().is_empty()) {
        return Err(EmbeddingError::EmptyInput);
    }
    Ok(())
}

/// Check a provider response against the expected shape.
pub(crate) fn check_embeddings(
    embeddings: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), EmbeddingError> {
    if embeddings.len() != expected_count {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected_count,
            embeddings.len()
        )));
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected dimension {}, got {}",
            dimension,
            bad.len()
        )));
    }
    Ok(())
}

/// Embed chunk contents in batches of `batch_size`, pairing each chunk with its vector.
pub async fn embed_chunks(
    provider: &dyn EmbeddingProvider,
    chunks: Vec<Chunk>,
    batch_size: usize,
) -> Result<Vec<EmbeddedChunk>, EmbeddingError> {
    embed_chunks_with_progress(provider, chunks, batch_size, |_| {}).await
}

/// [`embed_chunks`], calling `on_batch` with the size of each batch once it is embedded.
pub async fn embed_chunks_with_progress(
    provider: &dyn EmbeddingProvider,
    chunks: Vec<Chunk>,
    batch_size: usize,
    mut on_batch: impl FnMut(usize),
) -> Result<Vec<EmbeddedChunk>, EmbeddingError> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    info!("Embedding {} chunks", chunks.len());
    let mut embedded = Vec::with_capacity(chunks.len());
    let mut remaining = chunks.into_iter().peekable();

    while remaining.peek().is_some() {
        let batch: Vec<Chunk> = remaining.by_ref().take(batch_size.max(1)).collect();
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let embeddings = provider.embed_batch(&texts).await?;
        check_embeddings(&embeddings, batch.len(), provider.dimension())?;

        on_batch(batch.len());
        embedded.extend(
            batch
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| EmbeddedChunk::new(chunk, embedding)),
        );
    }

    Ok(embedded)
}

/// Cosine similarity in `[-1, 1]`. Never used for ranking, which is by L2 distance.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub(crate) fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
