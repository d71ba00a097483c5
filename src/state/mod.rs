/// Recipe state module
///
/// This module handles the read-only view of the recipe database:
/// - Recipe records (data.rs)
/// - Reading records from SQLite or memory (library.rs)

pub mod data;
pub mod library;

pub use data::RecipeRecord;
pub use library::{RecipeSource, SqliteRecipeSource};
