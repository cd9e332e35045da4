//! Qdrant vector store backend.

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, UpsertPointsBuilder, VectorParamsBuilder,
    vectors_config,
};
use std::collections::HashMap;
use tracing::{debug, info};

use super::{CollectionInfo, VectorStore};
use crate::error::VectorStoreError;
use crate::models::{StoredPoint, VectorStoreConfig};

pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
}

impl QdrantBackend {
    pub fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
        })
    }

    fn to_point(point: StoredPoint) -> PointStruct {
        let metadata = point.payload.metadata;
        let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
        payload.insert("document_id".to_string(), metadata.document_id.into());
        payload.insert("source_name".to_string(), metadata.source_name.into());
        payload.insert("ingested_at".to_string(), metadata.ingested_at.into());
        payload.insert("origin_url".to_string(), metadata.origin_url.into());
        payload.insert("text".to_string(), point.payload.text.into());

        PointStruct::new(point.id, point.vector, payload)
    }
}

#[async_trait]
impl VectorStore for QdrantBackend {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn get_collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        match self.client.collection_info(&self.collection).await {
            Ok(info) => {
                let result = info.result;
                let points_count = result.as_ref().and_then(|r| r.points_count).unwrap_or(0);
                let params = result
                    .and_then(|r| r.config)
                    .and_then(|c| c.params)
                    .and_then(|p| p.vectors_config)
                    .and_then(|v| v.config);

                let (vector_size, distance) = match params {
                    Some(vectors_config::Config::Params(p)) => (
                        Some(p.size),
                        Distance::try_from(p.distance)
                            .ok()
                            .map(|d| d.as_str_name().to_lowercase()),
                    ),
                    _ => (None, None),
                };

                Ok(Some(CollectionInfo {
                    points_count,
                    vector_size,
                    distance,
                }))
            }
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("not found") || msg.contains("doesn't exist") {
                    Ok(None)
                } else {
                    Err(VectorStoreError::CollectionError(msg))
                }
            }
        }
    }

    async fn create_collection(&self, vector_size: u64) -> Result<(), VectorStoreError> {
        let create_collection = CreateCollectionBuilder::new(&self.collection)
            .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine));

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        info!(collection = %self.collection, vector_size, "created collection");
        Ok(())
    }

    async fn upsert_points(&self, points: Vec<StoredPoint>) -> Result<(), VectorStoreError> {
        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        let points: Vec<PointStruct> = points.into_iter().map(Self::to_point).collect();
        let upsert = UpsertPointsBuilder::new(&self.collection, points).wait(true);

        self.client
            .upsert_points(upsert)
            .await
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        debug!(collection = %self.collection, points = count, "upserted points");
        Ok(())
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}
