use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use dockship_core::{parse_step_marker, DeploymentTarget, RemoteCommandScript};

use crate::error::{Result, TransportError};
use crate::process::ProcessRunner;
use crate::traits::{RemoteExecutor, RemoteOutput};

/// Runs the remote script through one non-interactive `ssh` session.
///
/// The script is piped to `sh -s` on the far side, so it reaches the remote
/// shell as a single unit regardless of its length or quoting.
pub struct SshExecutor {
    program: String,
    port: Option<u16>,
}

impl Default for SshExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SshExecutor {
    pub fn new() -> Self {
        Self {
            program: "ssh".to_string(),
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

    fn build_args(&self, target: &DeploymentTarget) -> Vec<String> {
        let mut args = vec!["-o".to_string(), "BatchMode=yes".to_string()];
        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args.push(target.login());
        args.push("sh".to_string());
        args.push("-s".to_string());
        args
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    fn name(&self) -> &'static str {
        "ssh"
    }

    async fn run(
        &self,
        target: &DeploymentTarget,
        script: &RemoteCommandScript,
        cancel: &CancellationToken,
    ) -> Result<RemoteOutput> {
        let rendered = script.render();
        info!(
            login = %target.login(),
            steps = script.steps().len(),
            policy = ?script.policy(),
            "Running remote script"
        );
        debug!(script = %rendered, "Rendered remote script");

        let args = self.build_args(target);
        let output = ProcessRunner::run(&self.program, &args, Some(&rendered), cancel).await?;

        let steps_started = output
            .stdout
            .iter()
            .filter_map(|line| parse_step_marker(line))
            .collect();
        let remote = RemoteOutput { steps_started };

        if !output.success() {
            return Err(TransportError::RemoteExecFailed {
                exit_code: output.code(),
                step: remote.last_step(),
                stderr: output.stderr_text(),
            });
        }

        Ok(remote)
    }
}
