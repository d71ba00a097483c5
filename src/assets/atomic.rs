//! Write-then-rename helpers.
//!
//! Implements atomic writes using:
//! 1. Write to a temp file created next to the target (same filesystem)
//! 2. fsync so the data reaches disk
//! 3. Rename the temp file over the target
//!
//! A process killed midway leaves at most a stray `.*.tmp` file, never a
//! truncated file under the final name. [`is_temp_file_name`] lets the next
//! run find those leftovers.

use crate::error::{AssetError, Result};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

const TEMP_PREFIX: &str = ".";
const TEMP_SUFFIX: &str = ".tmp";

/// Mode for finished files, before the umask (temp files start out 0600)
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Whether `name` looks like a temp file left behind by [`write_atomic`].
pub fn is_temp_file_name(name: &str) -> bool {
    name.len() > TEMP_PREFIX.len() + TEMP_SUFFIX.len()
        && name.starts_with(TEMP_PREFIX)
        && name.ends_with(TEMP_SUFFIX)
}

/// Create `path` atomically, letting `write` fill the temp file.
///
/// The closure's error type is generic so callers can run encoders that do
/// not speak `io::Error`; a closure error leaves the target untouched.
pub fn write_atomic<E, F>(path: &Path, write: F) -> Result<std::result::Result<(), E>>
where
    F: FnOnce(&mut File) -> std::result::Result<(), E>,
{
    let parent = parent_dir(path)?;
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_PREFIX).suffix(TEMP_SUFFIX);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(FILE_MODE));
    }
    let mut temp = builder
        .tempfile_in(parent)
        .map_err(|e| AssetError::io("Failed to create temp file", parent, e))?;

    if let Err(e) = write(temp.as_file_mut()) {
        // Dropping the NamedTempFile removes it
        return Ok(Err(e));
    }

    finish(temp, path)?;
    Ok(Ok(()))
}

/// Copy `src` byte-for-byte to `dest` through a temp file.
pub fn copy_atomic(src: &Path, dest: &Path) -> Result<u64> {
    let mut reader =
        File::open(src).map_err(|e| AssetError::io("Failed to open source file", src, e))?;
    write_reader_atomic(dest, &mut reader)
}

/// Stream `reader` into `dest` through a temp file.
pub fn write_reader_atomic<R: Read>(dest: &Path, reader: &mut R) -> Result<u64> {
    let mut copied = 0;
    write_atomic(dest, |file| -> io::Result<()> {
        copied = io::copy(reader, file)?;
        Ok(())
    })?
    .map_err(|e| AssetError::io("Failed to write temp file", dest, e))?;
    Ok(copied)
}

fn finish(mut temp: NamedTempFile, path: &Path) -> Result<()> {
    temp.flush()
        .map_err(|e| AssetError::io("Failed to flush temp file", temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| AssetError::io("Failed to sync temp file", temp.path(), e))?;

    temp.persist(path)
        .map_err(|e| AssetError::io("Failed to rename temp file into place", path, e.error))?;

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

fn parent_dir(path: &Path) -> Result<&Path> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        fs::create_dir_all(parent)
            .map_err(|e| AssetError::io("Failed to create directory", parent, e))?;
    }
    Ok(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_atomic_is_byte_identical() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src.bin");
        let dest = temp_dir.path().join("dest.bin");
        fs::write(&src, b"some image bytes").unwrap();

        let copied = copy_atomic(&src, &dest).unwrap();

        assert_eq!(copied, 16);
        assert_eq!(fs::read(&dest).unwrap(), b"some image bytes");
    }

    #[test]
    fn test_write_atomic_failure_leaves_no_target() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("out.jpg");

        let outcome = write_atomic(&dest, |_| Err::<(), _>("encoder exploded")).unwrap();

        assert_eq!(outcome, Err("encoder exploded"));
        assert!(!dest.exists());
        // temp file cleaned up as well
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_atomic_replaces_existing() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("out.txt");
        fs::write(&dest, b"old").unwrap();

        write_atomic(&dest, |file| file.write_all(b"new"))
            .unwrap()
            .unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    #[cfg(unix)]
    #[test]
    fn test_written_files_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src.bin");
        fs::write(&src, b"bytes").unwrap();
        let copied = temp_dir.path().join("copied.bin");
        let written = temp_dir.path().join("written.bin");

        copy_atomic(&src, &copied).unwrap();
        write_atomic(&written, |file| file.write_all(b"x"))
            .unwrap()
            .unwrap();

        for path in [&copied, &written] {
            let mode = fs::metadata(path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o644, "{}", path.display());
        }
    }

    #[test]
    fn test_is_temp_file_name() {
        assert!(is_temp_file_name(".a1B2c3.tmp"));
        assert!(!is_temp_file_name(".tmp"));
        assert!(!is_temp_file_name("original.tmp"));
        assert!(!is_temp_file_name(".DS_Store"));
    }

    #[test]
    fn test_write_atomic_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("nested").join("dir").join("a.txt");

        write_reader_atomic(&dest, &mut &b"abc"[..]).unwrap();
        assert!(dest.exists());
    }
}
