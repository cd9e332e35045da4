//! Input discovery for an ingestion run.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::PipelineError;

/// List candidate source files under `root`.
///
/// `max_depth` of 1 lists the directory itself without descending. A file
/// path is returned as-is. Entries matching any of `exclude` (checked against
/// the full path and the file name) are left out. The result is sorted.
pub fn collect_files(
    root: &Path,
    max_depth: usize,
    exclude: &[String],
) -> Result<Vec<PathBuf>, PipelineError> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.is_dir() {
        return Err(PipelineError::WalkError(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let patterns: Vec<glob::Pattern> = exclude
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect();

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth.max(1))
        .follow_links(false)
    {
        let entry = entry.map_err(|e| PipelineError::WalkError(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if is_excluded(path, &patterns) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

fn is_excluded(path: &Path, patterns: &[glob::Pattern]) -> bool {
    let full = path.to_string_lossy();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    patterns
        .iter()
        .any(|p| p.matches(&full) || p.matches(&name))
}
