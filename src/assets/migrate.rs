//! Migration orchestration.
//!
//! `migrate_images` flattens the image root into the per-recipe layout and
//! then derives variants for every canonical original it finds. It does not
//! look at the database. `reconcile_slugs` is a separate pass over the recipe
//! records, so either pass can be re-run on its own after a partial failure.

use super::atomic::is_temp_file_name;
use super::normalize::{normalize, NormalizeReport};
use super::reconcile::{reconcile, ReconcileReport};
use super::{canonical_role, AssetRole, ItemFailure};
use crate::config::MigrationConfig;
use crate::error::{AssetError, Result};
use crate::imaging::{DeriveReport, DeriveStatus, Minifier};
use crate::state::RecipeSource;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub normalized: NormalizeReport,
    /// Temp files from interrupted writes, deleted before derivation
    pub removed_temp_files: Vec<PathBuf>,
    pub derived: Vec<DeriveReport>,
    /// Discovery and derivation failures (normalization keeps its own)
    pub failures: Vec<ItemFailure>,
}

impl MigrationReport {
    pub fn failure_count(&self) -> usize {
        self.normalized.failures.len() + self.failures.len()
    }

    pub fn count(&self, status: DeriveStatus) -> usize {
        self.derived.iter().filter(|d| d.status == status).count()
    }
}

/// Runs the image migration and slug reconciliation passes over one root.
#[derive(Debug, Clone)]
pub struct AssetMigrator {
    config: MigrationConfig,
    minifier: Minifier,
}

impl AssetMigrator {
    pub fn new(config: MigrationConfig) -> Result<Self> {
        config.validate()?;
        let minifier = Minifier::from_config(&config);
        Ok(Self { config, minifier })
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Normalize the layout, then derive variants for every original.
    pub fn migrate_images(&self) -> Result<MigrationReport> {
        info!("Checking for Images to Minify...");

        let normalized = normalize(&self.config)?;
        let (removed_temp_files, mut failures) = self.remove_stale_temp_files();
        let (originals, discovery_failures) = self.discover_originals();
        failures.extend(discovery_failures);

        let mut derived = Vec::with_capacity(originals.len());
        for original in originals {
            match self.minifier.derive(&original) {
                Ok(report) => derived.push(report),
                Err(e) => {
                    warn!("Could not derive variants for {}: {}", original.display(), e);
                    failures.push(ItemFailure::new(&original, &e));
                }
            }
        }

        let report = MigrationReport {
            normalized,
            removed_temp_files,
            derived,
            failures,
        };
        log_finished(&report);
        Ok(report)
    }

    /// Same pipeline as [`migrate_images`](Self::migrate_images), deriving up
    /// to `config.jobs` directories at once on the blocking pool.
    ///
    /// Each task owns exactly one image directory.
    pub async fn migrate_images_concurrent(&self) -> Result<MigrationReport> {
        info!(
            "Checking for Images to Minify ({} concurrent jobs)...",
            self.config.jobs
        );

        let config = self.config.clone();
        let normalized = tokio::task::spawn_blocking(move || normalize(&config))
            .await
            .map_err(|e| AssetError::Join(e.to_string()))??;

        let (removed_temp_files, mut failures) = self.remove_stale_temp_files();
        let (originals, discovery_failures) = self.discover_originals();
        failures.extend(discovery_failures);

        let semaphore = Arc::new(Semaphore::new(self.config.jobs));
        let mut tasks = Vec::with_capacity(originals.len());
        for original in originals {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AssetError::Join(e.to_string()))?;
            let minifier = self.minifier.clone();
            let source = original.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                minifier.derive(&source)
            });
            tasks.push((original, handle));
        }

        let (mut derived, task_failures) = collect_derivations(tasks).await;
        failures.extend(task_failures);
        derived.sort_by(|a, b| a.source.cmp(&b.source));
        failures.sort_by(|a, b| a.path.cmp(&b.path));

        let report = MigrationReport {
            normalized,
            removed_temp_files,
            derived,
            failures,
        };
        log_finished(&report);
        Ok(report)
    }

    /// Delete `.*.tmp` files that interrupted atomic writes left in recipe directories.
    pub fn remove_stale_temp_files(&self) -> (Vec<PathBuf>, Vec<ItemFailure>) {
        let mut removed = Vec::new();
        let mut failures = Vec::new();

        let walker = WalkDir::new(&self.config.image_dir)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name();

        // unreadable entries are reported by discover_originals
        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            let is_stale = entry.file_type().is_file()
                && !in_hidden_dir(entry.path())
                && is_temp_file_name(&entry.file_name().to_string_lossy());
            if !is_stale {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!("Removed stale temp file {}", entry.path().display());
                    removed.push(entry.into_path());
                }
                Err(e) => {
                    let err = AssetError::io("Failed to remove stale temp file", entry.path(), e);
                    warn!("{}", err);
                    failures.push(ItemFailure::new(entry.path(), &err));
                }
            }
        }

        if !removed.is_empty() {
            info!("Removed {} stale temp files", removed.len());
        }
        (removed, failures)
    }

    /// Every `<root>/<dir>/original.<ext>`, sorted. Hidden directories are skipped.
    pub fn discover_originals(&self) -> (Vec<PathBuf>, Vec<ItemFailure>) {
        let mut originals = Vec::new();
        let mut failures = Vec::new();

        let walker = WalkDir::new(&self.config.image_dir)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name();

        for entry in walker {
            match entry {
                Ok(entry) => {
                    let is_original = entry.file_type().is_file()
                        && !in_hidden_dir(entry.path())
                        && canonical_role(&entry.file_name().to_string_lossy())
                            == Some(AssetRole::Original);
                    if is_original {
                        originals.push(entry.into_path());
                    }
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| p.to_path_buf())
                        .unwrap_or_else(|| self.config.image_dir.clone());
                    let err = AssetError::Io {
                        message: e.to_string(),
                        path: Some(path.clone()),
                        source: e.into_io_error(),
                    };
                    warn!("Skipping {} during discovery: {}", path.display(), err);
                    failures.push(ItemFailure::new(&path, &err));
                }
            }
        }

        (originals, failures)
    }

    /// Rename image directories to match every recipe's current slug.
    pub fn reconcile_slugs(&self, source: &dyn RecipeSource) -> Result<ReconcileReport> {
        info!("Validating recipe slugs against image directories...");

        let recipes = source.all_recipes()?;
        let report = reconcile(&self.config, &recipes);

        info!(
            "Finished slug validation: {} renamed, {} in sync, {} without images, {} missing, {} conflicts, {} failed",
            report.renamed.len() + report.merged.len(),
            report.in_sync,
            report.without_image,
            report.missing.len(),
            report.conflicts.len(),
            report.failures.len()
        );
        Ok(report)
    }
}

/// Await every derivation task, turning a panicked or cancelled task into a
/// failure for its image instead of aborting the rest.
async fn collect_derivations(
    tasks: Vec<(PathBuf, JoinHandle<Result<DeriveReport>>)>,
) -> (Vec<DeriveReport>, Vec<ItemFailure>) {
    let mut derived = Vec::with_capacity(tasks.len());
    let mut failures = Vec::new();

    for (original, handle) in tasks {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(AssetError::Join(e.to_string())),
        };
        match result {
            Ok(report) => derived.push(report),
            Err(e) => {
                warn!("Could not derive variants for {}: {}", original.display(), e);
                failures.push(ItemFailure::new(&original, &e));
            }
        }
    }

    (derived, failures)
}

fn in_hidden_dir(path: &Path) -> bool {
    path.parent()
        .and_then(|dir| dir.file_name())
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn log_finished(report: &MigrationReport) {
    info!(
        "Finished Minification Check: {} derived, {} copied, {} already present, {} failed",
        report.count(DeriveStatus::Derived),
        report.count(DeriveStatus::Copied),
        report.count(DeriveStatus::AlreadyPresent),
        report.failure_count()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RecipeRecord;
    use image::{Rgb, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    fn write_solid(path: &Path) {
        RgbImage::from_pixel(800, 400, Rgb([10, 120, 30]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_discover_originals_skips_hidden_and_variants() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for dir in ["b", "a", ".cache"] {
            fs::create_dir(root.join(dir)).unwrap();
            fs::write(root.join(dir).join("original.jpg"), b"x").unwrap();
        }
        fs::write(root.join("a/min-original.jpg"), b"x").unwrap();
        fs::write(root.join("original.jpg"), b"loose").unwrap();

        let migrator = AssetMigrator::new(MigrationConfig::new(root)).unwrap();
        let (originals, failures) = migrator.discover_originals();

        assert!(failures.is_empty());
        assert_eq!(
            originals,
            vec![root.join("a/original.jpg"), root.join("b/original.jpg")]
        );
    }

    #[test]
    fn test_migrate_images_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write_solid(&root.join("pasta.png"));
        fs::write(root.join("broken.jpg"), b"").unwrap();

        let migrator = AssetMigrator::new(MigrationConfig::new(root)).unwrap();
        let report = migrator.migrate_images().unwrap();

        assert_eq!(report.normalized.moved.len(), 2);
        assert_eq!(report.count(DeriveStatus::Derived), 1);
        assert_eq!(report.count(DeriveStatus::Copied), 1);
        assert_eq!(report.failure_count(), 0);
        for name in ["original.png", "min-original.png", "tiny-original.png"] {
            assert!(root.join("pasta").join(name).is_file(), "missing {name}");
        }
        assert!(root.join("broken/tiny-original.jpg").is_file());
    }

    #[test]
    fn test_migrate_images_missing_root_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let migrator =
            AssetMigrator::new(MigrationConfig::new(temp_dir.path().join("absent"))).unwrap();
        assert!(migrator.migrate_images().is_err());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = MigrationConfig {
            jobs: 0,
            ..MigrationConfig::new("/tmp")
        };
        assert!(matches!(
            AssetMigrator::new(config),
            Err(AssetError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        let sequential_dir = TempDir::new().unwrap();
        let concurrent_dir = TempDir::new().unwrap();
        for root in [sequential_dir.path(), concurrent_dir.path()] {
            for name in ["a.png", "b.png", "c.png"] {
                write_solid(&root.join(name));
            }
        }

        let sequential = AssetMigrator::new(MigrationConfig::new(sequential_dir.path()))
            .unwrap()
            .migrate_images()
            .unwrap();
        let concurrent = AssetMigrator::new(MigrationConfig {
            jobs: 2,
            ..MigrationConfig::new(concurrent_dir.path())
        })
        .unwrap()
        .migrate_images_concurrent()
        .await
        .unwrap();

        assert_eq!(concurrent.derived.len(), 3);
        assert_eq!(concurrent.count(DeriveStatus::Derived), 3);
        for (seq, conc) in sequential.derived.iter().zip(&concurrent.derived) {
            assert_eq!(seq.source.file_name(), conc.source.file_name());
            assert_eq!(
                fs::read(&seq.thumbnail).unwrap(),
                fs::read(&conc.thumbnail).unwrap()
            );
        }
    }

    #[test]
    fn test_stale_temp_files_are_removed() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("pasta")).unwrap();
        write_solid(&root.join("pasta/original.png"));
        fs::write(root.join("pasta/.x7Qp2a.tmp"), b"half a variant").unwrap();
        fs::create_dir(root.join(".cache")).unwrap();
        fs::write(root.join(".cache/.keep.tmp"), b"not ours").unwrap();

        let migrator = AssetMigrator::new(MigrationConfig::new(root)).unwrap();
        let report = migrator.migrate_images().unwrap();

        assert_eq!(report.removed_temp_files, vec![root.join("pasta/.x7Qp2a.tmp")]);
        assert!(!root.join("pasta/.x7Qp2a.tmp").exists());
        assert!(root.join(".cache/.keep.tmp").is_file());
        assert_eq!(report.count(DeriveStatus::Derived), 1);
    }

    #[tokio::test]
    async fn test_panicked_derivation_becomes_item_failure() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("good")).unwrap();
        let good = root.join("good/original.png");
        write_solid(&good);
        let bad = root.join("bad/original.png");

        let minifier = Minifier::new(720, 300, 70);
        let source = good.clone();
        let tasks = vec![
            (
                bad.clone(),
                tokio::task::spawn_blocking(|| -> Result<DeriveReport> {
                    panic!("decoder bug")
                }),
            ),
            (
                good.clone(),
                tokio::task::spawn_blocking(move || minifier.derive(&source)),
            ),
        ];

        let (derived, failures) = collect_derivations(tasks).await;

        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].source, good);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, bad);
        assert!(failures[0].error.contains("panic"), "{}", failures[0].error);
    }

    #[test]
    fn test_reconcile_slugs_from_source() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("old-name")).unwrap();

        let migrator = AssetMigrator::new(MigrationConfig::new(root)).unwrap();
        let recipes = vec![RecipeRecord::new("grandmas-pie", "old-name.jpg")];
        let report = migrator.reconcile_slugs(&recipes).unwrap();

        assert_eq!(report.renamed.len(), 1);
        assert!(root.join("grandmas-pie").is_dir());
    }
}
