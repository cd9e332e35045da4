//! Vector store abstraction layer.
//!
//! A [`VectorStore`] is one named collection in some backend. The pipeline only
//! needs to inspect it, create it, and upsert points into it.

mod memory;
mod qdrant;

pub use memory::InMemoryStore;
pub use qdrant::QdrantBackend;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::VectorStoreError;
use crate::models::{StoredPoint, VectorDriver, VectorStoreConfig};

/// Similarity metric every collection is created with.
pub const COSINE: &str = "cosine";

/// Collection state as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    pub points_count: u64,
    /// None when the collection uses named or multiple vectors
    pub vector_size: Option<u64>,
    /// Lowercase metric name
    pub distance: Option<String>,
}

impl CollectionInfo {
    /// True when the collection holds single cosine vectors of `size` dimensions.
    pub fn matches(&self, size: u64) -> bool {
        self.vector_size == Some(size) && self.distance.as_deref() == Some(COSINE)
    }

    pub fn describe(&self) -> String {
        format!(
            "{} vectors ({})",
            self.vector_size
                .map_or_else(|| "unknown-size".to_string(), |s| format!("{s}-dimensional")),
            self.distance.as_deref().unwrap_or("unknown metric")
        )
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Check if the vector store is reachable.
    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    /// Returns None if the collection doesn't exist.
    async fn get_collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError>;

    /// Create the collection with cosine vectors of `vector_size` dimensions.
    async fn create_collection(&self, vector_size: u64) -> Result<(), VectorStoreError>;

    /// Insert or overwrite points by id, as one batch.
    async fn upsert_points(&self, points: Vec<StoredPoint>) -> Result<(), VectorStoreError>;

    fn collection(&self) -> &str;
}

/// Create the backend selected by configuration.
pub fn create_backend(config: &VectorStoreConfig) -> Result<Box<dyn VectorStore>, VectorStoreError> {
    match config.driver {
        VectorDriver::Qdrant => Ok(Box::new(QdrantBackend::new(config)?)),
        VectorDriver::Memory => Ok(Box::new(InMemoryStore::new(&config.collection))),
    }
}
