//! Point identity and payload assembly.
//!
//! A point id is derived from the chunk text alone, so identical text maps
//! to the same point wherever it appears and upserts overwrite instead of
//! duplicating.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::InvariantViolation;
use crate::models::{ChunkPayload, Document, StoredPoint};

/// Stable id for a chunk: the first 128 bits of its SHA-256, as a UUID string.
pub fn point_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

/// Ids and payloads for every chunk of `document`, index-aligned with its chunks.
pub fn build_payloads(document: &Document) -> (Vec<String>, Vec<ChunkPayload>) {
    document
        .chunks
        .iter()
        .map(|chunk| {
            let payload = ChunkPayload {
                metadata: document.metadata.clone(),
                text: chunk.clone(),
            };
            (point_id(chunk), payload)
        })
        .unzip()
}

/// Pair ids, embeddings and payloads into points.
///
/// Fails instead of truncating when the sequences differ in length.
pub fn build_points(document: &Document) -> Result<Vec<StoredPoint>, InvariantViolation> {
    let (ids, payloads) = build_payloads(document);

    let chunks = document.chunks.len();
    let embeddings = document.embeddings.len();
    if ids.len() != chunks || embeddings != chunks || payloads.len() != chunks {
        return Err(InvariantViolation {
            document_id: document.id.clone(),
            chunks,
            ids: ids.len(),
            embeddings,
            payloads: payloads.len(),
        });
    }

    Ok(ids
        .into_iter()
        .zip(document.embeddings.iter().cloned())
        .zip(payloads)
        .map(|((id, vector), payload)| StoredPoint {
            id,
            vector,
            payload,
        })
        .collect())
}
