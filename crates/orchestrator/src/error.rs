use dockship_core::{CoreError, DeployPhase, StepKind};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use transport::TransportError;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    InvalidTarget(#[from] CoreError),

    #[error("Source directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error(
        "Another deployment of this source is in progress (lock file {}); remove it if no deployment is running",
        .lock_path.display()
    )]
    AlreadyRunning { lock_path: PathBuf },

    #[error("Archive failed: {0}")]
    ArchiveFailed(String),

    #[error("Transfer failed{}: {reason}", exit_suffix(.exit_code))]
    TransferFailed {
        exit_code: Option<i32>,
        reason: String,
    },

    #[error(
        "Remote execution failed{}{}: {reason}",
        step_suffix(.step),
        exit_suffix(.exit_code)
    )]
    RemoteExecFailed {
        step: Option<StepKind>,
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("Stage {stage} timed out after {after:?}")]
    Timeout { stage: DeployPhase, after: Duration },

    #[error("Stage {stage} was cancelled")]
    Cancelled { stage: DeployPhase },

    #[error("Cleanup failed: {0}")]
    CleanupFailed(String),

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl DeployError {
    /// The phase the run was in when this error was raised.
    pub fn stage(&self) -> DeployPhase {
        match self {
            Self::InvalidTarget(_) | Self::DirectoryNotFound(_) => DeployPhase::ResolveSourceDir,
            Self::AlreadyRunning { .. } | Self::ArchiveFailed(_) => DeployPhase::Archive,
            Self::TransferFailed { .. } => DeployPhase::Transfer,
            Self::RemoteExecFailed { .. } => DeployPhase::RemoteExecute,
            Self::Timeout { stage, .. } | Self::Cancelled { stage } => *stage,
            Self::CleanupFailed(_) => DeployPhase::Cleanup,
            Self::InvalidTransition { .. } => DeployPhase::Failed,
        }
    }

    /// Attribute a component error to the stage that produced it.
    pub fn from_transport(stage: DeployPhase, err: TransportError) -> Self {
        match err {
            TransportError::DirectoryNotFound(path) => Self::DirectoryNotFound(path),
            TransportError::ArchiveFailed(reason) => Self::ArchiveFailed(reason),
            TransportError::TransferFailed { exit_code, stderr } => Self::TransferFailed {
                exit_code,
                reason: stderr,
            },
            TransportError::RemoteExecFailed {
                exit_code,
                step,
                stderr,
            } => Self::RemoteExecFailed {
                step,
                exit_code,
                reason: stderr,
            },
            TransportError::Cancelled(_) => Self::Cancelled { stage },
            other => Self::stage_failure(stage, other.to_string()),
        }
    }

    fn stage_failure(stage: DeployPhase, reason: String) -> Self {
        match stage {
            DeployPhase::Transfer => Self::TransferFailed {
                exit_code: None,
                reason,
            },
            DeployPhase::RemoteExecute => Self::RemoteExecFailed {
                step: None,
                exit_code: None,
                reason,
            },
            DeployPhase::Cleanup => Self::CleanupFailed(reason),
            _ => Self::ArchiveFailed(reason),
        }
    }
}

fn exit_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" (exit code {})", c))
        .unwrap_or_default()
}

fn step_suffix(step: &Option<StepKind>) -> String {
    step.map(|s| format!(" at step {}", s)).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, DeployError>;
