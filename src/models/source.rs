//! Source model for tracking where a document came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// File format family, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Portable Document Format
    Pdf,
    /// Excel / OpenDocument workbooks
    Spreadsheet,
    /// Anything else; extracts to empty text
    Unsupported,
}

impl SourceFormat {
    /// Detect the format of a file from its extension (case-insensitive).
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension() else {
            return SourceFormat::Unsupported;
        };
        match ext.to_string_lossy().to_lowercase().as_str() {
            "pdf" => SourceFormat::Pdf,
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => SourceFormat::Spreadsheet,
            _ => SourceFormat::Unsupported,
        }
    }

    pub fn is_supported(self) -> bool {
        self != SourceFormat::Unsupported
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Pdf => write!(f, "pdf"),
            SourceFormat::Spreadsheet => write!(f, "spreadsheet"),
            SourceFormat::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// One input file discovered for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    /// Path of the file; unique within a run
    pub path: PathBuf,

    /// When the file was picked up
    pub ingested_at: DateTime<Utc>,

    /// Optional provenance; empty when unknown
    pub origin_url: String,
}

impl SourceItem {
    /// Create a source item stamped with the current time.
    pub fn new(path: impl Into<PathBuf>, origin_url: impl Into<String>) -> Self {
        Self::with_timestamp(path, Utc::now(), origin_url)
    }

    pub fn with_timestamp(
        path: impl Into<PathBuf>,
        ingested_at: DateTime<Utc>,
        origin_url: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            ingested_at,
            origin_url: origin_url.into(),
        }
    }

    /// Identifier of the document built from this item.
    ///
    /// Hash of the path only; file content does not participate.
    pub fn document_id(&self) -> String {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest(self.path.to_string_lossy().as_bytes());
        hex::encode(&hash[..16])
    }

    pub fn format(&self) -> SourceFormat {
        SourceFormat::from_path(&self.path)
    }

    /// Path as stored in payloads.
    pub fn source_name(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}
