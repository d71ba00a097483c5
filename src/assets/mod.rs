/// Per-recipe image directory maintenance
///
/// This module handles:
/// - Moving loose files into `<root>/<stem>/original.<ext>` (normalize.rs)
/// - Renaming image directories to match recipe slugs (reconcile.rs)
/// - Sequencing both passes over the image root (migrate.rs)
/// - Write-then-rename file helpers (atomic.rs)

pub mod atomic;
pub mod migrate;
pub mod normalize;
pub mod reconcile;

pub use migrate::{AssetMigrator, MigrationReport};
pub use normalize::{normalize, MovedFile, NormalizeReport};
pub use reconcile::{reconcile, MergedDir, ReconcileReport, SlugRename};

use crate::config::LayoutConfig;
use crate::error::{AssetError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Role a file plays inside an image asset directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetRole {
    Original,
    Reduced,
    Thumbnail,
}

/// Classify `file_name` as `original.*`, `min-original.*` or `tiny-original.*`.
pub fn canonical_role(file_name: &str) -> Option<AssetRole> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    if stem == LayoutConfig::ORIGINAL_STEM {
        return Some(AssetRole::Original);
    }
    match stem.strip_suffix(LayoutConfig::ORIGINAL_STEM)? {
        prefix if prefix == LayoutConfig::REDUCED_PREFIX => Some(AssetRole::Reduced),
        prefix if prefix == LayoutConfig::THUMBNAIL_PREFIX => Some(AssetRole::Thumbnail),
        _ => None,
    }
}

/// Remove the original and its variants, whatever their extension.
pub(crate) fn clear_canonical_set(dir: &Path) -> Result<usize> {
    let entries =
        fs::read_dir(dir).map_err(|e| AssetError::io("Failed to read directory", dir, e))?;

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| AssetError::io("Failed to read directory entry", dir, e))?;
        let is_file = entry.file_type().map(|ft| ft.is_file()).unwrap_or(false);
        let name = entry.file_name();
        if is_file && canonical_role(&name.to_string_lossy()).is_some() {
            let path = entry.path();
            fs::remove_file(&path)
                .map_err(|e| AssetError::io("Failed to remove replaced file", &path, e))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// One work item that failed. The rest of the batch still ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub path: PathBuf,
    pub error: String,
}

impl ItemFailure {
    pub fn new(path: &Path, error: &AssetError) -> Self {
        Self {
            path: path.to_path_buf(),
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_role() {
        assert_eq!(canonical_role("original.jpg"), Some(AssetRole::Original));
        assert_eq!(canonical_role("min-original.png"), Some(AssetRole::Reduced));
        assert_eq!(canonical_role("tiny-original.webp"), Some(AssetRole::Thumbnail));
        assert_eq!(canonical_role("original"), None);
        assert_eq!(canonical_role("original."), None);
        assert_eq!(canonical_role("big-original.jpg"), None);
        assert_eq!(canonical_role("notes.txt"), None);
    }
}
