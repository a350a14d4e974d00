use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use dockship_core::{ArchiveArtifact, DeploymentTarget, RemoteCommandScript, StepKind};

use crate::error::Result;

/// What came back from a finished remote session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutput {
    /// Steps whose marker line was seen, in order.
    pub steps_started: Vec<StepKind>,
}

impl RemoteOutput {
    pub fn last_step(&self) -> Option<StepKind> {
        self.steps_started.last().copied()
    }
}

/// Packages a local directory into a single archive file.
#[async_trait]
pub trait Archiver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Write `source_dir` into `archive_path`, skipping every subtree whose
    /// path segment equals one of `exclude`.
    ///
    /// Fails with `DirectoryNotFound` before touching the filesystem when
    /// `source_dir` is missing. Stops early once `cancel` fires.
    async fn create_archive(
        &self,
        source_dir: &Path,
        exclude: &BTreeSet<String>,
        archive_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<ArchiveArtifact>;
}

/// Copies an archive to the remote directory of a target.
#[async_trait]
pub trait Transporter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(
        &self,
        artifact: &ArchiveArtifact,
        target: &DeploymentTarget,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Runs a rendered script in one remote shell session.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        target: &DeploymentTarget,
        script: &RemoteCommandScript,
        cancel: &CancellationToken,
    ) -> Result<RemoteOutput>;
}
