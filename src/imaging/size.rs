//! Human readable file sizes for the minification log line.

use std::fs;
use std::path::Path;

/// Sentinel reported for a path that does not exist.
pub const FILE_NOT_FOUND: &str = "(File Not Found)";

pub const DEFAULT_DECIMAL_PLACES: usize = 2;

const UNITS: [&str; 6] = ["B", "kB", "MB", "GB", "TB", "PB"];

/// Format a byte count as `"<value> <unit>"`, dividing by 1024 per step.
pub fn format_bytes(bytes: u64, decimal_places: usize) -> String {
    let mut size = bytes as f64;
    let mut unit = UNITS[0];
    for (index, candidate) in UNITS.iter().enumerate() {
        unit = candidate;
        if size < 1024.0 || index == UNITS.len() - 1 {
            break;
        }
        size /= 1024.0;
    }
    format!("{:.*} {}", decimal_places, size, unit)
}

/// Format the size of the file at `path`, or [`FILE_NOT_FOUND`].
///
/// Never fails: any metadata error is reported as the sentinel too.
pub fn sizeof_fmt(path: &Path, decimal_places: usize) -> String {
    match fs::metadata(path) {
        Ok(metadata) => format_bytes(metadata.len(), decimal_places),
        Err(_) => FILE_NOT_FOUND.to_string(),
    }
}
