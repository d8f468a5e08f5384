use crate::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock on a module clone cache entry.
///
/// Held while a clone is fetched or checked out; released on drop.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

fn open_lock_file(path: &Path) -> Result<File, StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)?)
}

impl CacheLock {
    /// Block until the lock at `path` is held.
    pub fn acquire(path: &Path) -> Result<Self, StoreError> {
        let file = open_lock_file(path)?;
        if file.try_lock_exclusive().is_err() {
            tracing::info!("waiting for module cache lock {}", path.display());
            file.lock_exclusive()
                .map_err(|e| StoreError::LockFailed(format!("{}: {e}", path.display())))?;
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
