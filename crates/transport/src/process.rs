//! Child process execution
//!
//! Every external tool the pipeline drives (`scp`, `ssh`) goes through
//! [`ProcessRunner`], which provides:
//! - line-by-line output streamed to the log while the child runs
//! - optional stdin payload
//! - cancellation that kills the child

use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};

pub struct ProcessRunner;

/// Collected result of a finished child.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn stderr_text(&self) -> String {
        self.stderr.join("\n").trim().to_string()
    }
}

impl ProcessRunner {
    /// Run `program` to completion, streaming its output.
    ///
    /// When `stdin` is given it is written to the child and the pipe is then
    /// closed. If `cancel` fires first the child is killed and
    /// `TransportError::Cancelled` is returned.
    pub async fn run(
        program: &str,
        args: &[String],
        stdin: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput> {
        debug!(program, ?args, "Spawning process");

        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => TransportError::CommandNotFound(program.to_string()),
                _ => TransportError::Io(e),
            })?;

        let writer = match (child.stdin.take(), stdin) {
            (Some(mut pipe), Some(input)) => {
                let input = input.to_owned();
                Some(tokio::spawn(async move {
                    if let Err(e) = pipe.write_all(input.as_bytes()).await {
                        debug!(error = %e, "Child closed stdin early");
                    }
                }))
            }
            _ => None,
        };

        let stdout_task = spawn_reader(child.stdout.take(), program, "stdout");
        let stderr_task = spawn_reader(child.stderr.take(), program, "stderr");

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                warn!(program, "Cancelled, killing process");
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                if let Some(writer) = writer {
                    writer.abort();
                }
                return Err(TransportError::Cancelled(program.to_string()));
            }
            status = child.wait() => status?,
        };

        if let Some(writer) = writer {
            let _ = writer.await;
        }
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        debug!(program, code = ?status.code(), "Process exited");

        Ok(ProcessOutput {
            status,
            stdout,
            stderr,
        })
    }
}

fn spawn_reader<R>(pipe: Option<R>, program: &str, stream: &'static str) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let program = program.to_string();
    tokio::spawn(async move {
        let mut collected = Vec::new();
        if let Some(pipe) = pipe {
            let mut lines = BufReader::new(pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(program = %program, stream, "{}", line);
                collected.push(line);
            }
        }
        collected
    })
}
