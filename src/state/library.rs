use super::data::RecipeRecord;
use crate::error::{AssetError, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Anything that can list every recipe's slug and image reference.
///
/// The persistence layer owns the records; implementations must not
/// modify them.
pub trait RecipeSource {
    fn all_recipes(&self) -> Result<Vec<RecipeRecord>>;
}

impl RecipeSource for Vec<RecipeRecord> {
    fn all_recipes(&self) -> Result<Vec<RecipeRecord>> {
        Ok(self.clone())
    }
}

impl RecipeSource for [RecipeRecord] {
    fn all_recipes(&self) -> Result<Vec<RecipeRecord>> {
        Ok(self.to_vec())
    }
}

/// Reads recipe records from the backend's SQLite catalog.
///
/// The database is opened read-only: locking and transactions belong to
/// the component that owns it.
pub struct SqliteRecipeSource {
    conn: Connection,
    db_path: PathBuf,
}

impl SqliteRecipeSource {
    /// Open an existing database. Fails if the file is missing.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            AssetError::database(format!("Failed to open {}", db_path.display()), e)
        })?;

        debug!("Opened recipe database at {}", db_path.display());

        Ok(Self {
            conn,
            db_path: db_path.to_path_buf(),
        })
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Get a count of recipes in the database
    pub fn recipe_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM recipes", [], |row| row.get(0))
            .map_err(|e| AssetError::database("Failed to count recipes", e))
    }
}

impl RecipeSource for SqliteRecipeSource {
    /// All recipes ordered by slug. Empty image references read as `None`.
    fn all_recipes(&self) -> Result<Vec<RecipeRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT slug, image FROM recipes ORDER BY slug")
            .map_err(|e| AssetError::database("Failed to prepare recipe query", e))?;

        let rows = stmt
            .query_map([], |row| {
                let image: Option<String> = row.get(1)?;
                Ok(RecipeRecord {
                    slug: row.get(0)?,
                    image: image.filter(|name| !name.trim().is_empty()),
                })
            })
            .map_err(|e| AssetError::database("Failed to query recipes", e))?;

        let mut recipes = Vec::new();
        for recipe in rows {
            recipes.push(recipe.map_err(|e| AssetError::database("Failed to read recipe row", e))?);
        }

        Ok(recipes)
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for SqliteRecipeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRecipeSource")
            .field("db_path", &self.db_path)
            .finish()
    }
}
