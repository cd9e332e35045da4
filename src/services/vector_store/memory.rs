//! Process-local vector store.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{COSINE, CollectionInfo, VectorStore};
use crate::error::VectorStoreError;
use crate::models::StoredPoint;

#[derive(Debug, Default)]
struct MemoryState {
    /// Vector size and metric, once the collection exists
    collection: Option<(u64, String)>,
    points: BTreeMap<String, StoredPoint>,
    failing_upserts: usize,
}

/// Keeps points in a map keyed by id. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    collection: String,
    state: Arc<Mutex<MemoryState>>,
    create_calls: Arc<AtomicUsize>,
    upsert_calls: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            ..Default::default()
        }
    }

    /// Start with an existing collection of the given shape.
    pub fn with_collection(self, vector_size: u64, distance: &str) -> Self {
        self.lock().collection = Some((vector_size, distance.to_string()));
        self
    }

    /// Make the next `n` upserts fail with a transient error.
    pub fn fail_next_upserts(&self, n: usize) {
        self.lock().failing_upserts = n;
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<StoredPoint> {
        self.lock().points.get(id).cloned()
    }

    /// All stored points, ordered by id.
    pub fn points(&self) -> Vec<StoredPoint> {
        self.lock().points.values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // State stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        Ok(true)
    }

    async fn get_collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let state = self.lock();
        Ok(state
            .collection
            .as_ref()
            .map(|(size, distance)| CollectionInfo {
                points_count: state.points.len() as u64,
                vector_size: Some(*size),
                distance: Some(distance.clone()),
            }))
    }

    async fn create_collection(&self, vector_size: u64) -> Result<(), VectorStoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if state.collection.is_some() {
            return Err(VectorStoreError::CollectionError(format!(
                "collection {} already exists",
                self.collection
            )));
        }
        state.collection = Some((vector_size, COSINE.to_string()));
        Ok(())
    }

    async fn upsert_points(&self, points: Vec<StoredPoint>) -> Result<(), VectorStoreError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();

        if state.failing_upserts > 0 {
            state.failing_upserts -= 1;
            return Err(VectorStoreError::UpsertError(
                "service unavailable".to_string(),
            ));
        }

        let Some((size, _)) = state.collection.clone() else {
            return Err(VectorStoreError::CollectionError(format!(
                "collection {} not found",
                self.collection
            )));
        };

        if let Some(bad) = points.iter().find(|p| p.vector.len() as u64 != size) {
            return Err(VectorStoreError::UpsertError(format!(
                "point {} has {} dimensions, collection expects {}",
                bad.id,
                bad.vector.len(),
                size
            )));
        }

        for point in points {
            state.points.insert(point.id.clone(), point);
        }
        Ok(())
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}
