//! Enumeration of slice files in an input folder.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::IoError;

/// Extensions picked up when no explicit list is configured.
pub const DEFAULT_SLICE_EXTENSIONS: &[&str] = &["tif", "tiff"];

/// Check if a path carries one of the given extensions (case-insensitive).
///
/// Extensions are given without the leading dot.
pub fn has_slice_extension(path: &Path, extensions: &[impl AsRef<str>]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|candidate| ext.eq_ignore_ascii_case(candidate.as_ref().trim_start_matches('.')))
}

/// List the slice files directly inside `folder`, sorted by path.
///
/// Only regular files with a matching extension are returned; subfolders are
/// not searched. The first entry is the reference slice of the stack.
pub fn list_slices(folder: &Path, extensions: &[impl AsRef<str>]) -> Result<Vec<PathBuf>, IoError> {
    let read_dir_err = |e: std::io::Error| IoError::ReadDir {
        path: folder.to_path_buf(),
        message: e.to_string(),
    };

    let mut slices = Vec::new();
    for entry in std::fs::read_dir(folder).map_err(read_dir_err)? {
        let entry = entry.map_err(read_dir_err)?;
        let path = entry.path();
        if path.is_file() && has_slice_extension(&path, extensions) {
            slices.push(path);
        }
    }

    slices.sort();
    debug!("Found {} slice(s) in {}", slices.len(), folder.display());

    Ok(slices)
}

// =============================================================================
// Tests
// =============================================================================
