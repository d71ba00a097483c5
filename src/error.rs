//! Error types for the asset migration engine.
//!
//! Image decode failures never show up here: the deriver recovers from them
//! locally by copying the original. Everything in [`AssetError`] is either
//! fatal for one work item or fatal for the whole run (unreadable root,
//! bad configuration, unopenable database).

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for the asset engine.
#[derive(Debug, Error)]
pub enum AssetError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("File or directory not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Cannot rename {from} to {to}: target directory already exists")]
    DirectoryCollision { from: PathBuf, to: PathBuf },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: rusqlite::Error,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Join(String),
}

/// Result type alias for asset operations.
pub type Result<T> = std::result::Result<T, AssetError>;

impl AssetError {
    /// Build an [`AssetError::Io`] bound to the path that failed.
    pub fn io(message: impl Into<String>, path: &Path, source: std::io::Error) -> Self {
        AssetError::Io {
            message: message.into(),
            path: Some(path.to_path_buf()),
            source: Some(source),
        }
    }

    pub fn database(message: impl Into<String>, source: rusqlite::Error) -> Self {
        AssetError::Database {
            message: message.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        AssetError::Config {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for AssetError {
    fn from(err: std::io::Error) -> Self {
        AssetError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

/// Check that `name` is usable as a single directory or file name below a root.
///
/// Rejects empty names, separators, `.`/`..` and anything else that would
/// escape the root when joined onto it.
pub fn validate_component(name: &str) -> Result<()> {
    let invalid = |reason: &str| AssetError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(invalid("name contains a path separator"));
    }
    if name == "." || name == ".." {
        return Err(invalid("name refers to a relative directory"));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid("name is not a single path component")),
    }
}
