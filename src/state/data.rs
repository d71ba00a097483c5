/// Shared data structures read from the recipe database
///
/// These structs are owned by the persistence layer. The asset engine only
/// reads them to decide which image directories need renaming.

use serde::{Deserialize, Serialize};

/// Represents a single recipe as seen by the asset engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeRecord {
    /// Stable, URL-safe identifier (e.g., "grandmas-pie")
    pub slug: String,
    /// Image file name hint (e.g., "grandmas-pie.jpg"); may be stale or absent
    pub image: Option<String>,
}

impl RecipeRecord {
    pub fn new(slug: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            image: Some(image.into()),
        }
    }

    pub fn without_image(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            image: None,
        }
    }
}
