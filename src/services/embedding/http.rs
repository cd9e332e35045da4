//! Client for a remote text-embeddings server exposing `/embed`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{Embedder, HfTokenizer};
use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;
use crate::services::chunker::TokenCounter;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    truncate: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse(Vec<Vec<f32>>);

/// Embeds over HTTP; token accounting uses the model's local `tokenizer.json`.
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    tokenizer: Arc<HfTokenizer>,
    dimension: usize,
    max_input_length: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let tokenizer = Arc::new(HfTokenizer::from_file(&config.tokenizer_file())?);
        Self::with_tokenizer(config, tokenizer)
    }

    pub fn with_tokenizer(
        config: &EmbeddingConfig,
        tokenizer: Arc<HfTokenizer>,
    ) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            tokenizer,
            dimension: config.dimension as usize,
            max_input_length: config.max_input_length as usize,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.base_url
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_input_length(&self) -> usize {
        self.max_input_length
    }

    fn tokenizer(&self) -> Arc<dyn TokenCounter> {
        self.tokenizer.clone()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embed", self.base_url);
        let request = EmbedRequest {
            inputs: texts,
            truncate: Some(true),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else if e.is_connect() {
                    EmbeddingError::ConnectionError(e.to_string())
                } else {
                    EmbeddingError::RequestError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ServerError(format!(
                "status {}: {}",
                status, body
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if embed_response.0.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embed_response.0.len()
            )));
        }

        Ok(embed_response.0)
    }
}
