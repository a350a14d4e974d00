use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A local archive produced for one deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveArtifact {
    pub local_path: PathBuf,
    pub created: bool,
    pub size_bytes: u64,
}

impl ArchiveArtifact {
    pub fn new(local_path: impl Into<PathBuf>) -> Self {
        Self {
            local_path: local_path.into(),
            created: false,
            size_bytes: 0,
        }
    }

    pub fn created(mut self, size_bytes: u64) -> Self {
        self.created = true;
        self.size_bytes = size_bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.local_path
    }
}
