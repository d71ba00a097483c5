//! Configuration for the migration engine.
//!
//! Every component receives a [`MigrationConfig`] explicitly, so tests can
//! point the whole engine at a temporary directory.

use crate::error::{AssetError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Fixed names of the per-recipe layout.
pub struct LayoutConfig;

impl LayoutConfig {
    pub const ORIGINAL_STEM: &'static str = "original";
    pub const REDUCED_PREFIX: &'static str = "min-";
    pub const THUMBNAIL_PREFIX: &'static str = "tiny-";
    pub const APP_DIR_NAME: &'static str = "recipe-assets";
    pub const IMAGE_DIR_NAME: &'static str = "img";
    pub const MIGRATION_DIR_NAME: &'static str = "migration";
}

/// What to do when a slug rename would land on an existing directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Leave both directories alone and log a warning.
    #[default]
    SkipAndWarn,
    /// Record the collision as a failed item.
    Fail,
    /// Move entries the target lacks; the canonical image set moves only
    /// into a target without an original.
    Merge,
}

impl std::str::FromStr for CollisionPolicy {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "skip-and-warn" | "skip" => Ok(CollisionPolicy::SkipAndWarn),
            "fail" => Ok(CollisionPolicy::Fail),
            "merge" => Ok(CollisionPolicy::Merge),
            other => Err(AssetError::config(format!(
                "unknown collision policy '{}' (expected skip-and-warn, fail or merge)",
                other
            ))),
        }
    }
}

/// Explicit configuration passed to every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Root image directory holding one subdirectory per recipe slug
    pub image_dir: PathBuf,
    /// Directory with uploaded export archives (`<kind>/<file>.zip`)
    pub migration_dir: PathBuf,
    /// Width of the reduced variant in pixels
    pub reduced_width: u32,
    /// Edge of the square center-cropped thumbnail
    pub thumbnail_size: u32,
    /// Encoder quality for lossy formats (1-100)
    pub quality: u8,
    /// Extensions (lowercase, no dot) treated as loose images
    pub image_extensions: Vec<String>,
    pub collision_policy: CollisionPolicy,
    /// Max number of directories derived at once in concurrent mode
    pub jobs: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        let data_root = default_data_root();
        Self {
            image_dir: data_root.join(LayoutConfig::IMAGE_DIR_NAME),
            migration_dir: data_root.join(LayoutConfig::MIGRATION_DIR_NAME),
            reduced_width: 720,
            thumbnail_size: 300,
            quality: 70,
            image_extensions: ["jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff", "avif"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            collision_policy: CollisionPolicy::default(),
            jobs: 1,
        }
    }
}

impl MigrationConfig {
    /// Defaults rooted at a specific image directory.
    pub fn new(image_dir: impl Into<PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
            ..Self::default()
        }
    }

    /// Load a JSON configuration file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| AssetError::io("Failed to read config file", path, e))?;
        let config: MigrationConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.reduced_width == 0 {
            return Err(AssetError::config("reduced_width must be greater than 0"));
        }
        if self.thumbnail_size == 0 {
            return Err(AssetError::config("thumbnail_size must be greater than 0"));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(AssetError::config("quality must be between 1 and 100"));
        }
        if self.jobs == 0 {
            return Err(AssetError::config("jobs must be at least 1"));
        }
        Ok(())
    }

    /// Whether `ext` (without the dot) is one of the recognized image extensions.
    pub fn is_image_extension(&self, ext: &str) -> bool {
        self.image_extensions
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
    }
}

/// ~/.local/share/recipe-assets on Linux, the platform equivalent elsewhere
fn default_data_root() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(LayoutConfig::APP_DIR_NAME)
}
