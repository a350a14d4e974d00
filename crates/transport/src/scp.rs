use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use dockship_core::{ArchiveArtifact, DeploymentTarget};

use crate::error::{Result, TransportError};
use crate::process::ProcessRunner;
use crate::traits::Transporter;

/// Copies archives with `scp`, relying on the user's ssh agent or keys.
pub struct ScpTransporter {
    program: String,
    port: Option<u16>,
}

impl Default for ScpTransporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScpTransporter {
    pub fn new() -> Self {
        Self {
            program: "scp".to_string(),
            port: None,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    fn build_args(&self, artifact: &ArchiveArtifact, target: &DeploymentTarget) -> Vec<String> {
        let mut args = vec![
            "-q".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ];
        if let Some(port) = self.port {
            args.push("-P".to_string());
            args.push(port.to_string());
        }
        args.push(artifact.local_path.display().to_string());
        args.push(target.scp_destination());
        args
    }
}

#[async_trait]
impl Transporter for ScpTransporter {
    fn name(&self) -> &'static str {
        "scp"
    }

    async fn send(
        &self,
        artifact: &ArchiveArtifact,
        target: &DeploymentTarget,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let size = match tokio::fs::metadata(&artifact.local_path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                return Err(TransportError::TransferFailed {
                    exit_code: None,
                    stderr: format!("{} is not a file", artifact.local_path.display()),
                })
            }
        };
        if size == 0 {
            return Err(TransportError::TransferFailed {
                exit_code: None,
                stderr: format!("{} is empty", artifact.local_path.display()),
            });
        }

        info!(
            archive = %artifact.local_path.display(),
            destination = %target.scp_destination(),
            size,
            "Copying archive"
        );

        let args = self.build_args(artifact, target);
        let output = ProcessRunner::run(&self.program, &args, None, cancel).await?;

        if !output.success() {
            return Err(TransportError::TransferFailed {
                exit_code: output.code(),
                stderr: output.stderr_text(),
            });
        }

        debug!("Archive copied");
        Ok(())
    }
}
