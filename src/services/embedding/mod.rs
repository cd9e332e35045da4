//! Embedding models.
//!
//! An [`Embedder`] maps chunk text to a fixed-length vector and exposes the
//! tokenizer and window length the chunker must respect, so the two always
//! agree by construction.

mod http;
mod onnx;

pub use http::HttpEmbedder;
pub use onnx::OnnxEmbedder;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::debug;

use crate::error::{ChunkError, EmbeddingError};
use crate::models::{Document, EmbeddingConfig, EmbeddingProvider};
use crate::services::chunker::TokenCounter;
use crate::utils::{RetryConfig, with_retry};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Human-readable model identifier.
    fn model_name(&self) -> &str;

    /// Length of every vector this model returns.
    fn dimension(&self) -> usize;

    /// Token window of the model, special tokens included.
    fn max_input_length(&self) -> usize;

    /// Tokenizer the model uses, for length accounting.
    fn tokenizer(&self) -> Arc<dyn TokenCounter>;

    /// Embed a batch of texts; the result is index-aligned with `texts`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }
}

/// Run CPU-bound inference on the blocking thread pool.
///
/// Keeps the calling task responsive, so per-file timeouts still fire and
/// concurrent files are not serialized behind one model call.
pub async fn run_blocking<T, F>(f: F) -> Result<T, EmbeddingError>
where
    F: FnOnce() -> Result<T, EmbeddingError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| EmbeddingError::InferenceError(format!("inference task failed: {e}")))?
}

/// Build the embedder selected by configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match config.provider {
        EmbeddingProvider::Onnx => Ok(Arc::new(OnnxEmbedder::load(config)?)),
        EmbeddingProvider::Http => Ok(Arc::new(HttpEmbedder::new(config)?)),
    }
}

/// Fill `document.embeddings` from its chunks, batch by batch.
///
/// Each batch is retried on transient failures. A vector of the wrong
/// length fails the document.
pub async fn embed_document(
    embedder: &dyn Embedder,
    document: &mut Document,
    batch_size: usize,
    retry: &RetryConfig,
) -> Result<(), EmbeddingError> {
    let mut embeddings = Vec::with_capacity(document.chunks.len());

    for batch in document.chunks.chunks(batch_size.max(1)) {
        let vectors = with_retry(retry, || embedder.embed_batch(batch))
            .await
            .into_result()?;

        if let Some(bad) = vectors.iter().find(|v| v.len() != embedder.dimension()) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: embedder.dimension(),
                actual: bad.len(),
            });
        }
        embeddings.extend(vectors);
    }

    debug!(
        document_id = %document.id,
        chunks = document.chunks.len(),
        embeddings = embeddings.len(),
        "embedded document"
    );
    document.embeddings = embeddings;
    Ok(())
}

/// Hugging Face tokenizer adapted for counting; never truncates or pads.
#[derive(Clone)]
pub struct HfTokenizer {
    inner: Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self, EmbeddingError> {
        if !path.exists() {
            return Err(EmbeddingError::ModelNotFound(format!(
                "tokenizer not found: {}",
                path.display()
            )));
        }
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| EmbeddingError::TokenizerError(e.to_string()))?;
        Self::from_tokenizer(tokenizer)
    }

    pub fn from_tokenizer(mut tokenizer: Tokenizer) -> Result<Self, EmbeddingError> {
        tokenizer
            .with_truncation(None)
            .map_err(|e| EmbeddingError::TokenizerError(e.to_string()))?;
        tokenizer.with_padding(None);
        Ok(Self { inner: tokenizer })
    }
}

impl TokenCounter for HfTokenizer {
    fn token_spans(&self, text: &str) -> Result<Vec<(usize, usize)>, ChunkError> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| ChunkError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_offsets().to_vec())
    }

    fn count_tokens(&self, text: &str) -> Result<usize, ChunkError> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| ChunkError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().len())
    }
}
