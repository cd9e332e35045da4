use serde::{Deserialize, Serialize};

use super::source::SourceItem;

/// Metadata copied into every point derived from a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub document_id: String,
    pub source_name: String,
    /// RFC 3339 timestamp
    pub ingested_at: String,
    pub origin_url: String,
}

/// The unit of extraction. Lives for a single pass through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub metadata: DocumentMetadata,
    /// Cleaned text blocks, in order
    pub text: Vec<String>,
    pub chunks: Vec<String>,
    /// Index-aligned with `chunks` once embedding completes
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embeddings: Vec<Vec<f32>>,
}

/// Payload stored next to a vector: document metadata plus the chunk text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    #[serde(flatten)]
    pub metadata: DocumentMetadata,
    pub text: String,
}

/// The persisted (id, vector, payload) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl Document {
    /// Build an empty document for `item` holding the given cleaned text.
    pub fn from_source(item: &SourceItem, text: Vec<String>) -> Self {
        let id = item.document_id();
        let metadata = DocumentMetadata {
            document_id: id.clone(),
            source_name: item.source_name(),
            ingested_at: item.ingested_at.to_rfc3339(),
            origin_url: item.origin_url.clone(),
        };
        Self {
            id,
            metadata,
            text,
            chunks: Vec::new(),
            embeddings: Vec::new(),
        }
    }

    pub fn has_chunks(&self) -> bool {
        !self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(path: &str) -> SourceItem {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        SourceItem::with_timestamp(path, ts, "https://example.com")
    }

    #[test]
    fn test_document_from_source() {
        let doc = Document::from_source(&item("data/a.pdf"), vec!["hello".to_string()]);
        assert_eq!(doc.id.len(), 32);
        assert_eq!(doc.metadata.document_id, doc.id);
        assert_eq!(doc.metadata.source_name, "data/a.pdf");
        assert_eq!(doc.metadata.ingested_at, "2024-05-01T12:00:00+00:00");
        assert_eq!(doc.metadata.origin_url, "https://example.com");
        assert!(!doc.has_chunks());
        assert!(doc.embeddings.is_empty());
    }

    #[test]
    fn test_payload_serializes_flat() {
        let doc = Document::from_source(&item("data/a.pdf"), vec![]);
        let payload = ChunkPayload {
            metadata: doc.metadata.clone(),
            text: "chunk".to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["text"], "chunk");
        assert_eq!(json["source_name"], "data/a.pdf");
        assert_eq!(json["document_id"], doc.id.as_str());
    }
}
