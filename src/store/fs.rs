//! Filesystem access used by the archive writer.
//!
//! The writer only needs a handful of primitives. Keeping them behind a
//! trait lets tests inject failures without touching real permissions.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use fs2::FileExt;
use tracing::warn;

use crate::error::{ArchiveError, Result};

/// Filesystem primitives consumed by [`ArchiveStore`](super::writer::ArchiveStore).
pub trait ArchiveFs: Send + Sync {
    /// Create a directory and its parents. Existing directories are fine.
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Create or overwrite a file.
    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Append `data` to a file under an exclusive lock, creating it if needed.
    ///
    /// Concurrent appenders (threads or processes) never interleave.
    fn append_locked(&self, path: &Path, data: &[u8]) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Remove a directory tree (used to discard a failed archive entry).
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
}

/// The local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl ArchiveFs for LocalFs {
    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| ArchiveError::io(path, e))
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        std::fs::write(path, contents).map_err(|e| ArchiveError::io(path, e))
    }

    fn append_locked(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ArchiveError::io(path, e))?;

        file.lock_exclusive().map_err(|e| ArchiveError::io(path, e))?;
        let written = append_or_restore(&mut file, data, |f, d| {
            f.write_all(d)?;
            f.flush()
        })
        .map_err(|e| ArchiveError::io(path, e));
        // Closing the file releases the lock as well
        let unlocked = FileExt::unlock(&file).map_err(|e| ArchiveError::io(path, e));
        written.and(unlocked)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::remove_dir_all(path).map_err(|e| ArchiveError::io(path, e))
    }
}

/// Run `write` on a locked file, cutting the file back to its previous length
/// if it fails so no partial line is left behind.
fn append_or_restore(
    file: &mut File,
    data: &[u8],
    write: impl FnOnce(&mut File, &[u8]) -> io::Result<()>,
) -> io::Result<()> {
    let len = file.metadata()?.len();
    let result = write(file, data);
    if result.is_err() {
        if let Err(e) = file.set_len(len) {
            warn!(error = %e, "Could not roll back a partial append");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_locked_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        LocalFs.append_locked(&path, b"one\n").unwrap();
        LocalFs.append_locked(&path, b"two\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_failed_append_leaves_no_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        LocalFs.append_locked(&path, b"one\n").unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        let err = append_or_restore(&mut file, b"two\n", |f, d| {
            f.write_all(&d[..2])?;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        drop(file);

        LocalFs.append_locked(&path, b"three\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\nthree\n");
    }

    #[test]
    fn test_create_dir_all_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        LocalFs.create_dir_all(&nested).unwrap();
        LocalFs.create_dir_all(&nested).unwrap();
        assert!(LocalFs.is_dir(&nested));
    }

    #[test]
    fn test_write_file_error_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("file");
        let err = LocalFs.write_file(&path, b"x").unwrap_err();
        assert_eq!(err.path(), Some(path.as_path()));
    }
}
