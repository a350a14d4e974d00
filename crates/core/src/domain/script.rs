//! Remote command script for the container lifecycle.
//!
//! The script is an ordered list of [`RemoteStep`]s rendered into a single
//! POSIX shell program. Each step is preceded by a marker line so the caller
//! can tell which step was running when the session failed.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::target::DeploymentTarget;

/// Prefix of the line echoed before every step.
pub const STEP_MARKER: &str = ">>> [";

pub const DEFAULT_CONTAINER_NAME: &str = "packer-analysis-api";
pub const DEFAULT_PORT: u16 = 8080;

/// The single, well-known container a target runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub host_port: u16,
    pub container_port: u16,
}

impl Default for ContainerSpec {
    fn default() -> Self {
        Self {
            name: DEFAULT_CONTAINER_NAME.to_string(),
            image: DEFAULT_CONTAINER_NAME.to_string(),
            host_port: DEFAULT_PORT,
            container_port: DEFAULT_PORT,
        }
    }
}

impl ContainerSpec {
    /// Container and image share one name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            image: name.clone(),
            name,
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.host_port = port;
        self.container_port = port;
        self
    }

    pub fn port_mapping(&self) -> String {
        format!("{}:{}", self.host_port, self.container_port)
    }
}

/// How the remote shell treats a failing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// `set -e`: the first failing step aborts the session.
    #[default]
    Strict,
    /// Every step runs regardless of earlier failures; only the last
    /// command's status reaches the caller.
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    CdRemoteDir,
    ExtractArchive,
    RemoveRemoteArchive,
    PruneBuildCache,
    PruneImages,
    BuildImage,
    StopContainer,
    RemoveContainer,
    StartContainer,
}

impl StepKind {
    pub const ALL: [StepKind; 9] = [
        StepKind::CdRemoteDir,
        StepKind::ExtractArchive,
        StepKind::RemoveRemoteArchive,
        StepKind::PruneBuildCache,
        StepKind::PruneImages,
        StepKind::BuildImage,
        StepKind::StopContainer,
        StepKind::RemoveContainer,
        StepKind::StartContainer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CdRemoteDir => "cd-remote-dir",
            Self::ExtractArchive => "extract-archive",
            Self::RemoveRemoteArchive => "remove-remote-archive",
            Self::PruneBuildCache => "prune-build-cache",
            Self::PruneImages => "prune-images",
            Self::BuildImage => "build-image",
            Self::StopContainer => "stop-container",
            Self::RemoveContainer => "remove-container",
            Self::StartContainer => "start-container",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStep {
    pub kind: StepKind,
    pub command: String,
}

impl RemoteStep {
    pub fn new(kind: StepKind, command: impl Into<String>) -> Self {
        Self {
            kind,
            command: command.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCommandScript {
    steps: Vec<RemoteStep>,
    policy: FailurePolicy,
}

impl RemoteCommandScript {
    pub fn new(steps: Vec<RemoteStep>) -> Self {
        Self {
            steps,
            policy: FailurePolicy::default(),
        }
    }

    /// Extract, prune, rebuild and restart `container` inside the target
    /// directory. `archive_name` is the file name scp left there.
    pub fn container_lifecycle(
        target: &DeploymentTarget,
        archive_name: &str,
        container: &ContainerSpec,
    ) -> Self {
        let archive = shell_quote(archive_name);
        let name = shell_quote(&container.name);
        let image = shell_quote(&container.image);

        Self::new(vec![
            RemoteStep::new(
                StepKind::CdRemoteDir,
                format!("cd {}", remote_dir_arg(target.remote_path())),
            ),
            RemoteStep::new(StepKind::ExtractArchive, format!("tar -xf {}", archive)),
            RemoteStep::new(StepKind::RemoveRemoteArchive, format!("rm -f {}", archive)),
            RemoteStep::new(StepKind::PruneBuildCache, "docker builder prune -f"),
            RemoteStep::new(StepKind::PruneImages, "docker image prune -f"),
            RemoteStep::new(StepKind::BuildImage, format!("docker build -t {} .", image)),
            RemoteStep::new(
                StepKind::StopContainer,
                format!(
                    "if docker container inspect {name} >/dev/null 2>&1; then docker stop {name}; fi"
                ),
            ),
            RemoteStep::new(
                StepKind::RemoveContainer,
                format!(
                    "if docker container inspect {name} >/dev/null 2>&1; then docker rm {name}; fi"
                ),
            ),
            RemoteStep::new(
                StepKind::StartContainer,
                format!(
                    "docker run -d --name {} -p {} {}",
                    name,
                    container.port_mapping(),
                    image
                ),
            ),
        ])
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn steps(&self) -> &[RemoteStep] {
        &self.steps
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn render(&self) -> String {
        let total = self.steps.len();
        let mut script = String::new();

        if self.policy == FailurePolicy::Strict {
            script.push_str("set -e\n");
        }

        for (i, step) in self.steps.iter().enumerate() {
            let marker = format!("{}{}/{}] {}", STEP_MARKER, i + 1, total, step.kind);
            script.push_str(&format!("echo {}\n", shell_quote(&marker)));
            script.push_str(&step.command);
            script.push('\n');
        }

        script
    }
}

/// Recognise a marker line echoed by [`RemoteCommandScript::render`].
pub fn parse_step_marker(line: &str) -> Option<StepKind> {
    let rest = line.trim_end().strip_prefix(STEP_MARKER)?;
    let (_, kind) = rest.split_once("] ")?;
    StepKind::parse(kind)
}

/// Quote `value` for a POSIX shell. Plain words pass through untouched.
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:@%+=,".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

// `~` only expands when unquoted.
fn remote_dir_arg(path: &str) -> String {
    if path == "~" {
        "\"$HOME\"".to_string()
    } else if let Some(rest) = path.strip_prefix("~/") {
        format!("\"$HOME\"/{}", shell_quote(rest))
    } else {
        shell_quote(path)
    }
}
