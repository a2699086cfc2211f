use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    extraction::is_supported,
};

/// Expand the given paths into the documents to ingest.
///
/// Files are taken as given, whatever their extension, so that an
/// unsupported file fails loudly at ingestion. Directories are walked
/// recursively for supported documents (.pdf, .txt, .md), skipping hidden
/// entries. The result is deduplicated and sorted.
pub fn discover_documents(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut results = Vec::new();
    for path in paths {
        if path.is_dir() {
            walk_dir(&path.canonicalize()?, &mut results)?;
        } else if path.is_file() {
            results.push(path.canonicalize()?);
        } else {
            return Err(Error::NotFound {
                kind: "document",
                name: path.display().to_string(),
            });
        }
    }
    results.sort();
    results.dedup();
    Ok(results)
}

fn walk_dir(current: &Path, results: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let file_name = entry.file_name();

        // Skip hidden files and directories.
        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;
        let path = entry.path();

        if file_type.is_dir() {
            walk_dir(&path, results)?;
        } else if file_type.is_symlink() {
            let Ok(resolved) = path.canonicalize() else {
                continue; // broken symlink
            };
            // Directory links are not followed, which rules out cycles.
            if resolved.is_file() && is_supported(&resolved) {
                results.push(resolved);
            }
        } else if file_type.is_file() && is_supported(&path) {
            results.push(path.canonicalize()?);
        }
    }

    Ok(())
}
