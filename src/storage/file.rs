//! File-backed storage: one file per key under a locked directory.

use super::StorageAdapter;
use crate::error::{Result, StoreError};
use fs2::FileExt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Directory-backed storage.
///
/// Each key maps to one file named after it. Writes go to a temporary
/// sibling and are renamed into place, so readers never observe partial
/// content. An exclusive LOCK file guards the directory against concurrent
/// store processes; the lock is held for the life of this value.
pub struct FileStorage {
    path: PathBuf,
    _lock_file: File,
}

impl FileStorage {
    /// Open the directory, creating it if missing, and take the lock.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let lock_file = Self::acquire_lock(&path)?;

        Ok(Self {
            path,
            _lock_file: lock_file,
        })
    }

    /// Directory this storage lives in.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        check_key(key)?;
        Ok(self.path.join(key))
    }
}

/// Keys double as file names, so they are restricted to a safe alphabet and
/// may not collide with the LOCK file.
fn check_key(key: &str) -> Result<()> {
    let safe = !key.is_empty()
        && key != "LOCK"
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if safe {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

impl StorageAdapter for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key)?;
        match fs::read_to_string(path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.key_path(key)?;
        // Appended suffix rather than with_extension: keys contain dots.
        let tmp_path = self.path.join(format!("{}.tmp", key));

        let mut file = File::create(&tmp_path)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;

        fs::rename(&tmp_path, &path)?;

        Ok(())
    }
}
