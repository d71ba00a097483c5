//! Slug reconciliation.
//!
//! A recipe's image directory is named after the image reference stored with
//! the recipe. When a recipe is renamed its slug changes but the directory
//! keeps the old name. This pass renames such directories to the slug. It
//! never touches image bytes.

use super::{canonical_role, clear_canonical_set, AssetRole, ItemFailure};
use crate::config::{CollisionPolicy, MigrationConfig};
use crate::error::{validate_component, AssetError, Result};
use crate::state::RecipeRecord;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlugRename {
    pub slug: String,
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedDir {
    pub slug: String,
    pub from: PathBuf,
    pub to: PathBuf,
    /// Entries moved into the target
    pub moved: usize,
    /// Entries left in the source because the target already had them
    pub kept: usize,
    /// Variants dropped from the target before the source's original moved in
    pub replaced: usize,
    pub removed_source: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub in_sync: usize,
    pub without_image: usize,
    pub renamed: Vec<SlugRename>,
    /// Slugs whose image directory was never materialized
    pub missing: Vec<String>,
    /// Renames skipped because the target directory already existed
    pub conflicts: Vec<SlugRename>,
    pub merged: Vec<MergedDir>,
    pub failures: Vec<ItemFailure>,
}

impl ReconcileReport {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

enum SlugOutcome {
    InSync,
    NoImage,
    Renamed(SlugRename),
    Missing,
    Conflict(SlugRename),
    Merged(MergedDir),
}

/// Rename image directories so each matches its recipe's slug.
///
/// Per-recipe problems end up in the report; the pass always completes.
pub fn reconcile(config: &MigrationConfig, recipes: &[RecipeRecord]) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for recipe in recipes {
        match reconcile_one(config, recipe) {
            Ok(SlugOutcome::InSync) => report.in_sync += 1,
            Ok(SlugOutcome::NoImage) => report.without_image += 1,
            Ok(SlugOutcome::Renamed(rename)) => report.renamed.push(rename),
            Ok(SlugOutcome::Missing) => report.missing.push(recipe.slug.clone()),
            Ok(SlugOutcome::Conflict(rename)) => report.conflicts.push(rename),
            Ok(SlugOutcome::Merged(merged)) => report.merged.push(merged),
            Err(e) => {
                warn!("Could not reconcile '{}': {}", recipe.slug, e);
                report
                    .failures
                    .push(ItemFailure::new(&config.image_dir.join(&recipe.slug), &e));
            }
        }
    }

    report
}

/// Image reference with its extension stripped.
///
/// Only the last extension goes (`pie.v2.jpg` names the `pie.v2` directory),
/// the same stem the normalizer gives a loose `pie.v2.jpg`.
pub fn image_slug(image: &str) -> &str {
    match image.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => image,
    }
}

fn reconcile_one(config: &MigrationConfig, recipe: &RecipeRecord) -> Result<SlugOutcome> {
    let image = match recipe.image.as_deref().map(str::trim) {
        Some(image) if !image.is_empty() => image,
        _ => return Ok(SlugOutcome::NoImage),
    };

    let current = image_slug(image);
    if current == recipe.slug {
        return Ok(SlugOutcome::InSync);
    }

    info!("{}, Doesn't Match '{}'", recipe.slug, current);
    validate_component(&recipe.slug)?;
    validate_component(current)?;

    let from = config.image_dir.join(current);
    let to = config.image_dir.join(&recipe.slug);

    if !from.is_dir() {
        info!("No Image Found for '{}'", recipe.slug);
        return Ok(SlugOutcome::Missing);
    }

    let rename = SlugRename {
        slug: recipe.slug.clone(),
        from,
        to,
    };

    // symlink_metadata so a dangling link still counts as occupied
    if fs::symlink_metadata(&rename.to).is_ok() {
        return match config.collision_policy {
            CollisionPolicy::SkipAndWarn => {
                warn!(
                    "Not renaming {} to {}: target already exists",
                    rename.from.display(),
                    rename.to.display()
                );
                Ok(SlugOutcome::Conflict(rename))
            }
            CollisionPolicy::Fail => Err(AssetError::DirectoryCollision {
                from: rename.from,
                to: rename.to,
            }),
            CollisionPolicy::Merge => merge_dirs(rename).map(SlugOutcome::Merged),
        };
    }

    fs::rename(&rename.from, &rename.to)
        .map_err(|e| AssetError::io("Failed to rename image directory", &rename.from, e))?;
    info!("Renamed {} -> {}", rename.from.display(), rename.to.display());

    Ok(SlugOutcome::Renamed(rename))
}

/// Fold the source directory into an existing target.
///
/// Canonical files travel as one set. The source's original and its variants
/// move in only when the target has no original of its own, and variants
/// already in the target are dropped first since they belong to no original.
/// Any other entry moves when the target has nothing by that name. The source
/// is removed only if nothing is left in it.
fn merge_dirs(rename: SlugRename) -> Result<MergedDir> {
    if !rename.to.is_dir() {
        return Err(AssetError::NotADirectory(rename.to));
    }

    let sources = list_entries(&rename.from)?;
    let target_has_original = list_entries(&rename.to)?
        .iter()
        .any(|entry| entry.role == Some(AssetRole::Original));
    let source_has_original = sources
        .iter()
        .any(|entry| entry.role == Some(AssetRole::Original));
    let adopt_set = source_has_original && !target_has_original;

    let replaced = if adopt_set {
        clear_canonical_set(&rename.to)?
    } else {
        0
    };

    let (mut moved, mut kept) = (0, 0);
    for entry in sources {
        let target = rename.to.join(&entry.name);
        let keep = match entry.role {
            Some(_) => !adopt_set,
            None => fs::symlink_metadata(&target).is_ok(),
        };
        if keep {
            debug!("Keeping {} in place", entry.path.display());
            kept += 1;
            continue;
        }
        fs::rename(&entry.path, &target)
            .map_err(|e| AssetError::io("Failed to move entry while merging", &entry.path, e))?;
        moved += 1;
    }

    let removed_source = is_empty_dir(&rename.from)? && {
        fs::remove_dir(&rename.from)
            .map_err(|e| AssetError::io("Failed to remove merged directory", &rename.from, e))?;
        true
    };

    info!(
        "Merged {} into {} ({} moved, {} kept, {} replaced)",
        rename.from.display(),
        rename.to.display(),
        moved,
        kept,
        replaced
    );

    Ok(MergedDir {
        slug: rename.slug,
        from: rename.from,
        to: rename.to,
        moved,
        kept,
        replaced,
        removed_source,
    })
}

struct DirItem {
    path: PathBuf,
    name: OsString,
    /// Set for regular files with a canonical name
    role: Option<AssetRole>,
}

fn list_entries(dir: &Path) -> Result<Vec<DirItem>> {
    let entries =
        fs::read_dir(dir).map_err(|e| AssetError::io("Failed to read directory", dir, e))?;

    let mut items = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AssetError::io("Failed to read directory entry", dir, e))?;
        let name = entry.file_name();
        let is_file = entry.file_type().map(|ft| ft.is_file()).unwrap_or(false);
        let role = if is_file {
            canonical_role(&name.to_string_lossy())
        } else {
            None
        };
        items.push(DirItem {
            path: entry.path(),
            name,
            role,
        });
    }
    Ok(items)
}

fn is_empty_dir(dir: &Path) -> Result<bool> {
    let mut entries =
        fs::read_dir(dir).map_err(|e| AssetError::io("Failed to read directory", dir, e))?;
    Ok(entries.next().is_none())
}
