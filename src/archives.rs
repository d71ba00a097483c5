//! Catalog of uploaded migration archives.
//!
//! Export archives from other recipe managers are uploaded to
//! `<migration_dir>/<kind>/` and wait there until the import pipeline picks
//! them up. This module only lists, stores and deletes those files. Parsing
//! their contents is not its job.

use crate::assets::atomic::write_reader_atomic;
use crate::error::{validate_component, AssetError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

/// Supported export sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationKind {
    Nextcloud,
    Chowdown,
}

impl MigrationKind {
    pub const ALL: [MigrationKind; 2] = [MigrationKind::Nextcloud, MigrationKind::Chowdown];

    pub fn dir_name(self) -> &'static str {
        match self {
            MigrationKind::Nextcloud => "nextcloud",
            MigrationKind::Chowdown => "chowdown",
        }
    }

    pub fn dir(self, migration_dir: &Path) -> PathBuf {
        migration_dir.join(self.dir_name())
    }
}

impl std::str::FromStr for MigrationKind {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self> {
        MigrationKind::ALL
            .into_iter()
            .find(|kind| kind.dir_name() == s)
            .ok_or_else(|| AssetError::InvalidName {
                name: s.to_string(),
                reason: "unknown migration type (expected nextcloud or chowdown)".to_string(),
            })
    }
}

impl std::fmt::Display for MigrationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationFile {
    pub name: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationOption {
    #[serde(rename = "type")]
    pub kind: MigrationKind,
    /// Newest first
    pub files: Vec<MigrationFile>,
}

/// List the `.zip` archives available for every migration kind.
pub fn list_migration_options(migration_dir: &Path) -> Result<Vec<MigrationOption>> {
    MigrationKind::ALL
        .into_iter()
        .map(|kind| -> Result<MigrationOption> {
            Ok(MigrationOption {
                kind,
                files: list_archives(&kind.dir(migration_dir))?,
            })
        })
        .collect()
}

fn list_archives(dir: &Path) -> Result<Vec<MigrationFile>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries =
        fs::read_dir(dir).map_err(|e| AssetError::io("Failed to read migration dir", dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AssetError::io("Failed to read directory entry", dir, e))?;
        let path = entry.path();
        let is_zip = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);
        if !is_zip {
            continue;
        }
        let metadata = entry
            .metadata()
            .map_err(|e| AssetError::io("Failed to read archive metadata", &path, e))?;
        files.push(MigrationFile {
            name: entry.file_name().to_string_lossy().into_owned(),
            date: archive_timestamp(&metadata),
        });
    }

    files.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.name.cmp(&b.name)));
    Ok(files)
}

/// Creation time where the platform has it, modification time otherwise.
fn archive_timestamp(metadata: &fs::Metadata) -> DateTime<Utc> {
    let time = metadata
        .created()
        .or_else(|_| metadata.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    DateTime::<Utc>::from(time)
}

/// Remove an uploaded archive (file) or an extracted copy (directory tree).
pub fn delete_migration_data(migration_dir: &Path, kind: MigrationKind, name: &str) -> Result<PathBuf> {
    validate_component(name)?;
    let path = kind.dir(migration_dir).join(name);

    let metadata = match fs::symlink_metadata(&path) {
        Ok(metadata) => metadata,
        Err(_) => return Err(AssetError::NotFound(path)),
    };

    if metadata.is_dir() {
        fs::remove_dir_all(&path)
            .map_err(|e| AssetError::io("Failed to remove migration data", &path, e))?;
    } else {
        fs::remove_file(&path)
            .map_err(|e| AssetError::io("Failed to remove migration data", &path, e))?;
    }

    info!("Migration Data Removed: {}", path.display());
    Ok(path)
}

/// Store an uploaded archive under `<kind>/<name>`, replacing any previous upload.
pub fn store_upload<R: Read>(
    migration_dir: &Path,
    kind: MigrationKind,
    name: &str,
    reader: &mut R,
) -> Result<PathBuf> {
    validate_component(name)?;
    let dest = kind.dir(migration_dir).join(name);

    let written = write_reader_atomic(&dest, reader)?;
    debug!("Stored {} bytes at {}", written, dest.display());
    info!("Migration data uploaded: {}", dest.display());
    Ok(dest)
}
