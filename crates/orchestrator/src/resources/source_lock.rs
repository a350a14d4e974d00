//! Exclusive lock on a source tree's archive location.
//!
//! Two runs packing the same directory would write the same archive path,
//! so the second one is rejected before it touches anything.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{DeployError, Result};

pub struct SourceLock {
    path: PathBuf,
    held: bool,
}

impl SourceLock {
    /// Create the lock file, failing with `AlreadyRunning` if it exists.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                debug!(path = %path.display(), "Source lock acquired");
                Ok(Self { path, held: true })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(DeployError::AlreadyRunning { lock_path: path })
            }
            Err(e) => Err(DeployError::ArchiveFailed(format!(
                "cannot create lock file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        self.held = false;

        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Source lock released");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DeployError::CleanupFailed(format!(
                "cannot remove lock file {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

impl Drop for SourceLock {
    fn drop(&mut self) {
        if self.held {
            warn!(path = %self.path.display(), "Source lock dropped while held - releasing");
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.tar.lock");

        let _first = SourceLock::acquire(&path).unwrap();
        let second = SourceLock::acquire(&path);

        assert!(matches!(second, Err(DeployError::AlreadyRunning { .. })));
    }

    #[test]
    fn test_release_allows_reacquire() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.tar.lock");

        let mut lock = SourceLock::acquire(&path).unwrap();
        lock.release().unwrap();
        assert!(!path.exists());

        assert!(SourceLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_drop_releases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.tar.lock");

        {
            let lock = SourceLock::acquire(&path).unwrap();
            assert_eq!(lock.path(), path.as_path());
        }

        assert!(!path.exists());
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let result = SourceLock::acquire(dir.path().join("missing/server.tar.lock"));

        assert!(matches!(result, Err(DeployError::ArchiveFailed(_))));
    }
}
