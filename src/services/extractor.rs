//! Raw text extraction for PDF and spreadsheet sources.
//!
//! PDF pages are read with lopdf and scrubbed one page at a time; workbooks
//! are flattened with calamine. Any other format yields empty text.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use calamine::{Data, Reader, open_workbook_auto};
use regex::Regex;
use tracing::debug;

use crate::error::ExtractError;
use crate::models::SourceFormat;

/// Arabic script blocks. Treated as layout noise for this corpus and always removed.
static NOISE_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[\x{0600}-\x{06FF}\x{0750}-\x{077F}\x{08A0}-\x{08FF}\x{FB50}-\x{FDFF}\x{FE70}-\x{FEFF}]",
    )
    .expect("valid noise regex")
});

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

static CASE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z])([A-Z])").expect("valid case regex"));

static UNDERSCORE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("valid underscore regex"));

/// The ellipsis character, and its UTF-8-read-as-CP1252 spelling.
static ELLIPSIS_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\x{2026}|\x{E2}\x{20AC}\x{A6})+").expect("valid ellipsis regex"));

/// Turns a source file into raw text according to its format.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract raw text from `path`. Unsupported formats give an empty string.
    pub fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        match SourceFormat::from_path(path) {
            SourceFormat::Pdf => extract_pdf(path),
            SourceFormat::Spreadsheet => extract_spreadsheet(path),
            SourceFormat::Unsupported => Ok(String::new()),
        }
    }

    /// Same as [`extract`](Self::extract), on the blocking thread pool.
    pub async fn extract_blocking(&self, path: PathBuf) -> Result<String, ExtractError> {
        let extractor = *self;
        tokio::task::spawn_blocking(move || extractor.extract(&path))
            .await
            .map_err(|e| ExtractError::Task(e.to_string()))?
    }
}

fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let document = lopdf::Document::load_mem(&bytes).map_err(|e| ExtractError::Pdf {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let pages = document.get_pages();
    let mut page_texts = Vec::with_capacity(pages.len());

    for page_number in pages.keys() {
        let raw = document
            .extract_text(&[*page_number])
            .map_err(|e| ExtractError::Pdf {
                path: path.to_path_buf(),
                message: format!("page {page_number}: {e}"),
            })?;
        page_texts.push(clean_pdf_page(&raw));
    }

    debug!(path = %path.display(), pages = page_texts.len(), "extracted PDF");
    Ok(page_texts.join(" "))
}

/// Scrub the text of one PDF page.
///
/// Drops the noise script, collapses whitespace, splits words glued at a
/// lower-to-upper case boundary, and removes underscore and ellipsis runs.
pub fn clean_pdf_page(raw: &str) -> String {
    let text = NOISE_SCRIPT.replace_all(raw, "");
    let text = WHITESPACE_RUN.replace_all(&text, " ");
    let text = CASE_BOUNDARY.replace_all(text.trim(), "${1} ${2}");
    let text = UNDERSCORE_RUN.replace_all(&text, "");
    let text = ELLIPSIS_RUN.replace_all(&text, "");
    let text = NOISE_SCRIPT.replace_all(&text, "");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_spreadsheet(path: &Path) -> Result<String, ExtractError> {
    std::fs::metadata(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut workbook = open_workbook_auto(path).map_err(|e| ExtractError::Spreadsheet {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut segments: Vec<String> = Vec::new();

    for sheet_name in workbook.sheet_names().to_vec() {
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| ExtractError::Spreadsheet {
                path: path.to_path_buf(),
                message: format!("sheet {sheet_name}: {e}"),
            })?;

        for row in range.rows() {
            let cells: Vec<String> = row.iter().filter_map(cell_text).collect();
            if !cells.is_empty() {
                segments.push(cells.join(" "));
            }
        }
    }

    debug!(path = %path.display(), rows = segments.len(), "extracted spreadsheet");
    Ok(segments.join(" "))
}

fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_pdf_page_strips_noise_script() {
        assert_eq!(clean_pdf_page("Invoice \u{0627}\u{0644}\u{0639}\u{0631}\u{0628}\u{064A}\u{0629} total"), "Invoice total");
        assert_eq!(clean_pdf_page("\u{FEFB}\u{FB50}Report"), "Report");
    }

    #[test]
    fn test_clean_pdf_page_collapses_whitespace() {
        assert_eq!(clean_pdf_page("  one\n\ntwo\t\tthree  "), "one two three");
    }

    #[test]
    fn test_clean_pdf_page_splits_case_boundary() {
        assert_eq!(clean_pdf_page("annualReport forThe year"), "annual Report for The year");
        assert_eq!(clean_pdf_page("PDF ABC"), "PDF ABC");
    }

    #[test]
    fn test_clean_pdf_page_removes_underscores_and_ellipses() {
        assert_eq!(clean_pdf_page("Name: ________ Date"), "Name: Date");
        assert_eq!(clean_pdf_page("Chapter 1\u{2026}\u{2026}\u{2026} 4"), "Chapter 1 4");
        assert_eq!(clean_pdf_page("wait\u{e2}\u{20ac}\u{a6} more"), "wait more");
    }

    #[test]
    fn test_unsupported_format_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "this text is never read").unwrap();

        let text = TextExtractor::new().extract(&path).unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn test_missing_pdf_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TextExtractor::new()
            .extract(&dir.path().join("missing.pdf"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }

    #[test]
    fn test_corrupt_pdf_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"definitely not a pdf").unwrap();

        let err = TextExtractor::new().extract(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf { .. }));
    }

    #[test]
    fn test_corrupt_spreadsheet_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();

        let err = TextExtractor::new().extract(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Spreadsheet { .. }));
    }

    #[test]
    fn test_spreadsheet_rows_flattened() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/inventory.xlsx");

        let text = TextExtractor::new().extract(&path).unwrap();
        assert_eq!(
            text,
            "Item Qty Note Widget 42 Gadget 7.5 spare Reviewed by ops"
        );
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Empty), None);
        assert_eq!(cell_text(&Data::String("  ".to_string())), None);
        assert_eq!(cell_text(&Data::String(" Total ".to_string())), Some("Total".to_string()));
        assert_eq!(cell_text(&Data::Int(42)), Some("42".to_string()));
        assert_eq!(cell_text(&Data::Float(2.5)), Some("2.5".to_string()));
        assert_eq!(cell_text(&Data::Bool(true)), Some("true".to_string()));
    }

    #[tokio::test]
    async fn test_pdf_page_text() {
        use lopdf::content::{Content, Operation};
        use lopdf::{Object, Stream, dictionary};

        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal("Hello World")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.pdf");
        doc.save(&path).unwrap();

        let text = TextExtractor::new().extract_blocking(path).await.unwrap();
        assert!(text.contains("Hello World"), "got {text:?}");
    }
}
