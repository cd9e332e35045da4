mod config;
mod document;
mod format;
mod source;

pub use config::{
    Config, DEFAULT_COLLECTION, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_MAX_INPUT_LENGTH, DEFAULT_QDRANT_URL, EmbeddingConfig, EmbeddingProvider,
    ExtractErrorPolicy, IngestConfig, RetrySettings, VectorDriver, VectorStoreConfig,
};
pub use document::{ChunkPayload, Document, DocumentMetadata, StoredPoint};
pub use format::OutputFormat;
pub use source::{SourceFormat, SourceItem};
