//! Error types for the document indexer.

use std::path::PathBuf;

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors raised while turning a source file into raw text.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse PDF {path}: {message}")]
    Pdf { path: PathBuf, message: String },

    #[error("failed to parse spreadsheet {path}: {message}")]
    Spreadsheet { path: PathBuf, message: String },

    #[error("extraction task failed: {0}")]
    Task(String),
}

/// Errors related to chunking.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("token window of {max_tokens} leaves no room after {reserved} special tokens")]
    WindowTooSmall { max_tokens: usize, reserved: usize },
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding timeout")]
    Timeout,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("failed to load model: {0}")]
    LoadError(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("inference error: {0}")]
    InferenceError(String),

    #[error("expected {expected}-dimensional embedding, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            EmbeddingError::ServerError(msg) => {
                msg.contains("503")
                    || msg.contains("502")
                    || msg.contains("504")
                    || msg.contains("429")
                    || msg.to_lowercase().contains("unavailable")
                    || msg.to_lowercase().contains("too many requests")
            }
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::InvalidResponse(_)
            | EmbeddingError::ModelNotFound(_)
            | EmbeddingError::LoadError(_)
            | EmbeddingError::TokenizerError(_)
            | EmbeddingError::InferenceError(_)
            | EmbeddingError::DimensionMismatch { .. } => false,
        }
    }
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to vector store: {0}")]
    ConnectionError(String),

    #[error("collection error: {0}")]
    CollectionError(String),

    #[error(
        "collection {collection} exists with incompatible configuration: expected {expected}-dimensional cosine vectors, found {found}"
    )]
    CollectionMismatch {
        collection: String,
        expected: u64,
        found: String,
    },

    #[error("upsert error: {0}")]
    UpsertError(String),
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        match self {
            VectorStoreError::ConnectionError(_) => true,
            VectorStoreError::CollectionMismatch { .. } => false,
            VectorStoreError::CollectionError(msg)
            | VectorStoreError::UpsertError(msg) => {
                let msg_lower = msg.to_lowercase();
                msg_lower.contains("timeout")
                    || msg_lower.contains("connection")
                    || msg_lower.contains("unavailable")
                    || msg_lower.contains("too many")
            }
        }
    }
}

/// Raised when the id, embedding and payload sequences of a document diverge.
///
/// Pairing them up anyway would silently drop trailing chunks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "document {document_id}: length mismatch (chunks={chunks}, ids={ids}, embeddings={embeddings}, payloads={payloads})"
)]
pub struct InvariantViolation {
    pub document_id: String,
    pub chunks: usize,
    pub ids: usize,
    pub embeddings: usize,
    pub payloads: usize,
}

/// Errors raised at the write boundary.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("collection bootstrap failed: {0}")]
    Bootstrap(#[source] VectorStoreError),

    #[error("upsert failed after {attempts} attempt(s): {source}")]
    Upsert {
        attempts: u32,
        #[source]
        source: VectorStoreError,
    },

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error("vector sink is closed")]
    Closed,
}

/// Errors that abort a whole ingestion run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("directory walk error: {0}")]
    WalkError(String),

    #[error("extraction of {path} failed: {source}")]
    Extraction {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    #[error("validation error: {0}")]
    ValidationError(String),
}
