//! Image asset migration for recipe libraries.
//!
//! The engine keeps the on-disk image tree in the layout the recipe backend
//! serves from:
//!
//! ```text
//! <image_dir>/
//! └── <recipe-slug>/
//!     ├── original.<ext>        # canonical source image
//!     ├── min-original.<ext>    # 720px wide variant
//!     └── tiny-original.<ext>   # 300x300 center crop
//! ```
//!
//! Two independent entry points live on [`AssetMigrator`]:
//! - [`AssetMigrator::migrate_images`] adopts loose files and derives variants
//! - [`AssetMigrator::reconcile_slugs`] renames directories to current slugs
//!
//! Both are safe to run repeatedly. Neither may run concurrently with another
//! writer on the same image root.

pub mod archives;
pub mod assets;
pub mod config;
pub mod error;
pub mod imaging;
pub mod state;

pub use assets::{AssetMigrator, ItemFailure, MigrationReport, NormalizeReport, ReconcileReport};
pub use config::{CollisionPolicy, MigrationConfig};
pub use error::{AssetError, Result};
pub use imaging::{DeriveReport, DeriveStatus, ImageSizes, Minifier};
pub use state::{RecipeRecord, RecipeSource, SqliteRecipeSource};
