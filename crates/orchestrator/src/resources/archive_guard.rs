//! RAII guard for the local archive file.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{DeployError, Result};

/// Owns the local archive path for one deployment run.
///
/// # Example
///
/// ```ignore
/// let mut guard = ArchiveGuard::new(&plan.archive_path);
/// // ... archive, transfer, execute ...
/// guard.release().await?; // deletes the archive if it exists
/// ```
pub struct ArchiveGuard {
    path: PathBuf,
    released: bool,
}

impl ArchiveGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(path = %path.display(), "Archive guard created");

        Self {
            path,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Delete the archive if present. Returns whether a file was removed.
    pub async fn release(&mut self) -> Result<bool> {
        self.released = true;

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Archive removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DeployError::CleanupFailed(format!(
                "cannot remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

impl Drop for ArchiveGuard {
    fn drop(&mut self) {
        if !self.released && self.path.exists() {
            warn!(
                path = %self.path.display(),
                "Archive guard dropped before release - removing archive"
            );

            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to remove archive");
            }
        }
    }
}
