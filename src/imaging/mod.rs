/// Image processing for canonical originals
///
/// This module handles:
/// - Deriving reduced and thumbnail variants (minify.rs)
/// - Formatting file sizes for the minification summary (size.rs)

pub mod minify;
pub mod size;

pub use minify::{crop_center, variant_paths, DeriveReport, DeriveStatus, ImageSizes, Minifier};
pub use size::{format_bytes, sizeof_fmt, DEFAULT_DECIMAL_PLACES, FILE_NOT_FOUND};
