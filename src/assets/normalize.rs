//! Layout normalization.
//!
//! Loose images sitting directly in the image root are adopted into their own
//! directory: `<root>/pie.jpg` becomes `<root>/pie/original.jpg`. The last
//! loose file for a stem wins; whatever canonical set the directory held
//! before is removed so its variants get regenerated from the new original.

use super::{clear_canonical_set, ItemFailure};
use crate::config::{LayoutConfig, MigrationConfig};
use crate::error::{AssetError, Result};
use serde::Serialize;
use std::fs::{self, DirEntry};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovedFile {
    pub from: PathBuf,
    pub to: PathBuf,
    /// Canonical files removed from the directory before the move
    pub replaced: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    pub moved: Vec<MovedFile>,
    pub failures: Vec<ItemFailure>,
}

/// Move every loose image in the root into its per-stem directory.
///
/// Only reading the root itself is fatal. Each file that cannot be moved is
/// recorded in the report and the remaining files are still processed.
pub fn normalize(config: &MigrationConfig) -> Result<NormalizeReport> {
    let root = &config.image_dir;
    if !root.exists() {
        return Err(AssetError::NotFound(root.clone()));
    }
    if !root.is_dir() {
        return Err(AssetError::NotADirectory(root.clone()));
    }

    let entries =
        fs::read_dir(root).map_err(|e| AssetError::io("Failed to read image root", root, e))?;

    let mut report = NormalizeReport::default();
    let mut loose = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) if is_loose_image(&entry, config) => loose.push(entry.path()),
            Ok(_) => {}
            Err(e) => {
                let err = AssetError::io("Failed to read directory entry", root, e);
                report.failures.push(ItemFailure::new(root, &err));
            }
        }
    }
    loose.sort();

    for path in loose {
        match adopt(root, &path) {
            Ok(moved) => {
                debug!("Moved {} -> {}", moved.from.display(), moved.to.display());
                report.moved.push(moved);
            }
            Err(e) => {
                warn!("Could not normalize {}: {}", path.display(), e);
                report.failures.push(ItemFailure::new(&path, &e));
            }
        }
    }

    if !report.moved.is_empty() {
        info!("Moved {} loose images into recipe directories", report.moved.len());
    }
    Ok(report)
}

/// A visible regular file with a recognized image extension.
///
/// Symlinks are left alone: `file_type` does not follow them.
fn is_loose_image(entry: &DirEntry, config: &MigrationConfig) -> bool {
    let name = entry.file_name();
    let name = name.to_string_lossy();
    if name.starts_with('.') {
        return false;
    }
    if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
        return false;
    }
    Path::new(name.as_ref())
        .extension()
        .map(|ext| config.is_image_extension(&ext.to_string_lossy()))
        .unwrap_or(false)
}

fn adopt(root: &Path, path: &Path) -> Result<MovedFile> {
    let (stem, ext) = match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => (stem, ext.to_string_lossy()),
        _ => {
            return Err(AssetError::InvalidName {
                name: path.display().to_string(),
                reason: "loose file has no stem or extension".to_string(),
            })
        }
    };

    let dir = root.join(stem);
    fs::create_dir_all(&dir)
        .map_err(|e| AssetError::io("Failed to create recipe image directory", &dir, e))?;

    let dest = dir.join(format!("{}.{}", LayoutConfig::ORIGINAL_STEM, ext));
    let replaced = clear_canonical_set(&dir)?;

    fs::rename(path, &dest).map_err(|e| AssetError::io("Failed to move loose image", path, e))?;

    Ok(MovedFile {
        from: path.to_path_buf(),
        to: dest,
        replaced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_normalize_moves_each_loose_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("apple-pie.jpg"), b"a").unwrap();
        fs::write(root.join("soup.PNG"), b"b").unwrap();
        fs::write(root.join("stew.webp"), b"c").unwrap();

        let report = normalize(&MigrationConfig::new(root)).unwrap();

        assert_eq!(report.moved.len(), 3);
        assert!(report.failures.is_empty());
        assert_eq!(file_names(root), vec!["apple-pie", "soup", "stew"]);
        assert_eq!(file_names(&root.join("apple-pie")), vec!["original.jpg"]);
        assert_eq!(file_names(&root.join("soup")), vec!["original.PNG"]);
        assert_eq!(fs::read(root.join("stew/original.webp")).unwrap(), b"c");
    }

    #[test]
    fn test_normalize_ignores_sentinels_and_non_images() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join(".DS_Store"), b"x").unwrap();
        fs::write(root.join("README.txt"), b"x").unwrap();
        fs::create_dir(root.join("existing")).unwrap();

        let report = normalize(&MigrationConfig::new(root)).unwrap();

        assert!(report.moved.is_empty());
        assert_eq!(file_names(root), vec![".DS_Store", "README.txt", "existing"]);
    }

    #[test]
    fn test_normalize_replaces_existing_canonical_set() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("foo")).unwrap();
        fs::write(root.join("foo/original.png"), b"old").unwrap();
        fs::write(root.join("foo/min-original.png"), b"old").unwrap();
        fs::write(root.join("foo/tiny-original.png"), b"old").unwrap();
        fs::write(root.join("foo.jpg"), b"new").unwrap();

        let report = normalize(&MigrationConfig::new(root)).unwrap();

        assert_eq!(report.moved[0].replaced, 3);
        assert_eq!(file_names(&root.join("foo")), vec!["original.jpg"]);
        assert_eq!(fs::read(root.join("foo/original.jpg")).unwrap(), b"new");
    }

    #[test]
    fn test_normalize_second_run_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("cake.jpg"), b"a").unwrap();

        normalize(&MigrationConfig::new(root)).unwrap();
        let second = normalize(&MigrationConfig::new(root)).unwrap();

        assert!(second.moved.is_empty());
        assert_eq!(file_names(&root.join("cake")), vec!["original.jpg"]);
    }

    #[test]
    fn test_normalize_records_failure_and_continues() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        // a regular file squats on the directory name "bread"
        fs::write(root.join("bread"), b"not a dir").unwrap();
        fs::write(root.join("bread.jpg"), b"a").unwrap();
        fs::write(root.join("jam.jpg"), b"b").unwrap();

        let report = normalize(&MigrationConfig::new(root)).unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, root.join("bread.jpg"));
        assert_eq!(report.moved.len(), 1);
        assert!(root.join("jam/original.jpg").is_file());
        assert!(root.join("bread.jpg").is_file());
    }

    #[test]
    fn test_normalize_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let config = MigrationConfig::new(temp_dir.path().join("nope"));
        assert!(matches!(normalize(&config), Err(AssetError::NotFound(_))));
    }
}
