//! Atomic file operations for the queue and exports.
//!
//! - Atomic writes: write to temp file, sync to disk, then rename
//! - Tolerant reads: a missing file reads as `None`
//! - Advisory locks: a sidecar file locked for the lifetime of a guard

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Write content to a file atomically.
///
/// 1. Writes content to a sibling temp file (`<name>.tmp`)
/// 2. Calls `fsync` so the data is on disk
/// 3. Renames the temp file over the target
///
/// If any step fails, the original file (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    let temp_path = temp_path_for(path);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Read a file to a string, or `None` if it doesn't exist.
///
/// # Errors
///
/// Returns an error for any failure other than the file being absent.
pub fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Get the size of a file in bytes.
///
/// Returns 0 if the file doesn't exist.
#[must_use]
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Exclusive advisory lock on a file, released on drop.
///
/// Locks are shared between processes, and between separate handles in one
/// process, so every opener of the same path is serialized.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Block until the lock on `path` is held, creating the file if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be opened or locked.
    pub fn acquire(path: &Path) -> io::Result<Self> {
        let file = open_lock_file(path)?;
        file.lock()?;
        Ok(Self { file })
    }

    /// Take the lock on `path` if nobody else holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be opened or locked.
    pub fn try_acquire(path: &Path) -> io::Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match file.try_lock() {
            Ok(()) => Ok(Some(Self { file })),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Error(e)) => Err(e),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Closing the file releases the lock too.
        let _ = self.file.unlock();
    }
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
}

/// Sibling path with `suffix` appended to the file name.
#[must_use]
pub fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn temp_path_for(path: &Path) -> PathBuf {
    sidecar_path(path, ".tmp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("queue.json");

        atomic_write(&path, "[]").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
        assert!(!temp.path().join("nested").join("queue.json.tmp").exists());
    }

    #[test]
    fn test_atomic_write_replaces_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("queue.json");

        atomic_write(&path, "first").unwrap();
        atomic_write(&path, "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn test_lock_excludes_second_handle() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("queue.json.lock");

        let held = FileLock::acquire(&path).unwrap();
        assert!(FileLock::try_acquire(&path).unwrap().is_none());

        drop(held);
        assert!(FileLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn test_sidecar_path() {
        let path = Path::new("/data/queue.json");
        assert_eq!(sidecar_path(path, ".lock"), Path::new("/data/queue.json.lock"));
    }

    #[test]
    fn test_read_optional_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent.json");
        assert!(read_optional(&path).unwrap().is_none());
        assert_eq!(file_size(&path), 0);

        atomic_write(&path, "{}").unwrap();
        assert_eq!(read_optional(&path).unwrap().as_deref(), Some("{}"));
        assert_eq!(file_size(&path), 2);
    }
}
