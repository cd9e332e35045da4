//! Write boundary for one destination collection.
//!
//! Lifecycle: construct, [`ensure_ready`](VectorSink::ensure_ready), accept
//! writes, [`close`](VectorSink::close). Bootstrap runs at most once per sink,
//! no matter how many writers reach it at the same time.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{SinkError, VectorStoreError};
use crate::models::Document;
use crate::services::payload::build_points;
use crate::services::vector_store::VectorStore;
use crate::utils::{RetryConfig, RetryResult, with_retry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkState {
    Uninitialized,
    Ready,
    Closed,
}

pub struct VectorSink {
    store: Box<dyn VectorStore>,
    vector_size: u64,
    retry: RetryConfig,
    ready: OnceCell<()>,
    closed: AtomicBool,
}

impl VectorSink {
    pub fn new(store: Box<dyn VectorStore>, vector_size: u64, retry: RetryConfig) -> Self {
        Self {
            store,
            vector_size,
            retry,
            ready: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SinkState {
        if self.closed.load(Ordering::SeqCst) {
            SinkState::Closed
        } else if self.ready.initialized() {
            SinkState::Ready
        } else {
            SinkState::Uninitialized
        }
    }

    pub fn collection(&self) -> &str {
        self.store.collection()
    }

    pub fn vector_size(&self) -> u64 {
        self.vector_size
    }

    /// Make sure the collection exists with the configured shape, creating it if absent.
    ///
    /// An existing collection with another vector size or metric is an error;
    /// it is never recreated.
    pub async fn ensure_ready(&self) -> Result<(), SinkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SinkError::Closed);
        }
        self.ready
            .get_or_try_init(|| self.bootstrap())
            .await
            .map(|_| ())
    }

    async fn bootstrap(&self) -> Result<(), SinkError> {
        let collection = self.store.collection();
        let info = with_retry(&self.retry, || self.store.get_collection_info())
            .await
            .into_result()
            .map_err(SinkError::Bootstrap)?;

        match info {
            Some(info) if info.matches(self.vector_size) => {
                debug!(collection, points = info.points_count, "collection ready");
            }
            Some(info) => {
                return Err(SinkError::Bootstrap(VectorStoreError::CollectionMismatch {
                    collection: collection.to_string(),
                    expected: self.vector_size,
                    found: info.describe(),
                }));
            }
            None => {
                info!(collection, vector_size = self.vector_size, "collection not found, creating");
                self.store
                    .create_collection(self.vector_size)
                    .await
                    .map_err(SinkError::Bootstrap)?;
            }
        }
        Ok(())
    }

    /// Upsert every point of `document` in one batch; returns the number written.
    ///
    /// A document without chunks writes nothing and never reaches the backend.
    pub async fn write(&self, document: &Document) -> Result<usize, SinkError> {
        self.ensure_ready().await?;

        let points = build_points(document)?;
        if points.is_empty() {
            return Ok(0);
        }

        let count = points.len();
        match with_retry(&self.retry, || self.store.upsert_points(points.clone())).await {
            RetryResult::Success(()) => {
                debug!(document_id = %document.id, points = count, "wrote document");
                Ok(count)
            }
            RetryResult::Failed {
                last_error,
                attempts,
            } => Err(SinkError::Upsert {
                attempts,
                source: last_error,
            }),
        }
    }

    /// Refuse further writes.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(collection = self.collection(), "vector sink closed");
        }
    }
}
