use std::path::PathBuf;
use thiserror::Error;

use dockship_core::StepKind;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Source directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Archive creation failed: {0}")]
    ArchiveFailed(String),

    #[error("Transfer failed{}: {stderr}", exit_suffix(.exit_code))]
    TransferFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error(
        "Remote execution failed{}{}: {stderr}",
        exit_suffix(.exit_code),
        step_suffix(.step)
    )]
    RemoteExecFailed {
        exit_code: Option<i32>,
        step: Option<StepKind>,
        stderr: String,
    },

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command {0} was cancelled")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" (exit code {})", code),
        None => String::new(),
    }
}

fn step_suffix(step: &Option<StepKind>) -> String {
    match step {
        Some(step) => format!(" at step {}", step),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
