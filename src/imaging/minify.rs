//! Reduced and thumbnail variant generation.
//!
//! For every canonical original this module produces two siblings:
//! - `min-original.<ext>`: resized to a fixed width, height proportional
//! - `tiny-original.<ext>`: a square crop centered on the resized image
//!
//! When the original cannot be decoded or processed, both variants become
//! byte-for-byte copies of the original. Having *some* variant matters more
//! than its fidelity.

use crate::assets::atomic::{copy_atomic, write_atomic};
use crate::config::{LayoutConfig, MigrationConfig};
use crate::error::{AssetError, Result};
use crate::imaging::size::{sizeof_fmt, DEFAULT_DECIMAL_PLACES};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, imageops::FilterType, DynamicImage, ImageError, ImageFormat, ImageReader};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Why the primary decode/resize/encode path gave up.
#[derive(Debug, Error)]
pub enum DeriveError {
    #[error("image error: {0}")]
    Image(#[from] ImageError),

    #[error("image has unusable dimensions {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },

    #[error("failed to write variant: {0}")]
    Write(#[from] AssetError),
}

/// How the variants of one original came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeriveStatus {
    /// Decoded, resized and re-encoded
    Derived,
    /// Processing failed, variants are copies of the original
    Copied,
    /// Both variants were already on disk
    AlreadyPresent,
}

/// Formatted sizes of the original and its two variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSizes {
    pub original: String,
    pub reduced: String,
    pub thumbnail: String,
}

impl ImageSizes {
    pub fn measure(original: &Path, reduced: &Path, thumbnail: &Path) -> Self {
        Self {
            original: sizeof_fmt(original, DEFAULT_DECIMAL_PLACES),
            reduced: sizeof_fmt(reduced, DEFAULT_DECIMAL_PLACES),
            thumbnail: sizeof_fmt(thumbnail, DEFAULT_DECIMAL_PLACES),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeriveReport {
    pub source: PathBuf,
    pub reduced: PathBuf,
    pub thumbnail: PathBuf,
    pub status: DeriveStatus,
    pub sizes: ImageSizes,
}

/// Paths of the reduced and thumbnail variants for `source`.
pub fn variant_paths(source: &Path) -> (PathBuf, PathBuf) {
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let reduced = source.with_file_name(format!("{}{}", LayoutConfig::REDUCED_PREFIX, file_name));
    let thumbnail =
        source.with_file_name(format!("{}{}", LayoutConfig::THUMBNAIL_PREFIX, file_name));
    (reduced, thumbnail)
}

/// Produces the variants for canonical originals.
#[derive(Debug, Clone)]
pub struct Minifier {
    reduced_width: u32,
    thumbnail_size: u32,
    quality: u8,
}

impl Minifier {
    pub fn new(reduced_width: u32, thumbnail_size: u32, quality: u8) -> Self {
        Self {
            reduced_width,
            thumbnail_size,
            quality,
        }
    }

    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(config.reduced_width, config.thumbnail_size, config.quality)
    }

    /// Make sure both variants of `source` exist.
    ///
    /// Returns immediately when both are already present. Only IO failures
    /// of the copy fallback surface as errors.
    pub fn derive(&self, source: &Path) -> Result<DeriveReport> {
        let (reduced, thumbnail) = variant_paths(source);

        if reduced.is_file() && thumbnail.is_file() {
            debug!("Variants already present for {}", source.display());
            return Ok(DeriveReport {
                sizes: ImageSizes::measure(source, &reduced, &thumbnail),
                source: source.to_path_buf(),
                reduced,
                thumbnail,
                status: DeriveStatus::AlreadyPresent,
            });
        }

        let status = match self.process(source, &reduced, &thumbnail) {
            Ok(()) => DeriveStatus::Derived,
            Err(e) => {
                debug!("Falling back to copies for {}: {}", source.display(), e);
                copy_atomic(source, &reduced)?;
                copy_atomic(source, &thumbnail)?;
                DeriveStatus::Copied
            }
        };

        let sizes = ImageSizes::measure(source, &reduced, &thumbnail);
        info!(
            "{} Minified: {} -> {} -> {}",
            display_name(source),
            sizes.original,
            sizes.reduced,
            sizes.thumbnail
        );

        Ok(DeriveReport {
            source: source.to_path_buf(),
            reduced,
            thumbnail,
            status,
            sizes,
        })
    }

    /// Decode once, write the reduced variant, then crop the thumbnail from it.
    fn process(&self, source: &Path, reduced: &Path, thumbnail: &Path) -> std::result::Result<(), DeriveError> {
        let img = ImageReader::open(source)
            .map_err(ImageError::IoError)?
            .with_guessed_format()
            .map_err(ImageError::IoError)?
            .decode()?;

        let resized = self.resize_to_width(&img)?;
        self.save_variant(&resized, reduced)?;

        let tiny = crop_center(&resized, self.thumbnail_size);
        self.save_variant(&tiny, thumbnail)?;

        Ok(())
    }

    fn resize_to_width(&self, img: &DynamicImage) -> std::result::Result<DynamicImage, DeriveError> {
        let (width, height) = (img.width(), img.height());
        if width == 0 || height == 0 {
            return Err(DeriveError::ZeroDimension { width, height });
        }

        let ratio = self.reduced_width as f64 / width as f64;
        let target_height = (height as f64 * ratio) as u32;
        if target_height == 0 {
            return Err(DeriveError::ZeroDimension {
                width: self.reduced_width,
                height: target_height,
            });
        }

        Ok(img.resize_exact(self.reduced_width, target_height, FilterType::Lanczos3))
    }

    /// Encode `img` in the format implied by `dest`'s extension.
    fn save_variant(&self, img: &DynamicImage, dest: &Path) -> std::result::Result<(), DeriveError> {
        let format = ImageFormat::from_path(dest)?;
        let quality = self.quality;

        write_atomic(dest, |file| -> image::ImageResult<()> {
            let mut writer = BufWriter::new(file);
            match format {
                ImageFormat::Jpeg => {
                    // JPEG has no alpha channel
                    let rgb = img.to_rgb8();
                    JpegEncoder::new_with_quality(&mut writer, quality).encode_image(&rgb)?;
                }
                _ => img.write_to(&mut writer, format)?,
            }
            writer.flush().map_err(ImageError::IoError)
        })??;

        Ok(())
    }
}

/// Cut a `size`×`size` box centered on the image midpoint.
///
/// The box origin is `floor((dim - size) / 2)` and goes negative when the
/// image is smaller than the box. The result is always exactly `size`×`size`;
/// canvas pixels the source does not cover stay zeroed.
pub fn crop_center(img: &DynamicImage, size: u32) -> DynamicImage {
    let left = (img.width() as i64 - size as i64).div_euclid(2);
    let top = (img.height() as i64 - size as i64).div_euclid(2);

    let mut canvas = DynamicImage::new(size, size, img.color());
    imageops::replace(&mut canvas, img, -left, -top);
    canvas
}

fn display_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.parent().and_then(|p| p.file_name()) {
        Some(dir) => format!("{}/{}", dir.to_string_lossy(), file_name),
        None => file_name,
    }
}
