use dockship_core::{ContainerSpec, DeployPhase, FailurePolicy};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use transport::DEFAULT_EXCLUDES;

/// Upper bounds for the three long-running stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub archive: Duration,
    pub transfer: Duration,
    pub remote: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            archive: Duration::from_secs(300),
            transfer: Duration::from_secs(600),
            remote: Duration::from_secs(1800),
        }
    }
}

impl StageTimeouts {
    pub fn uniform(limit: Duration) -> Self {
        Self {
            archive: limit,
            transfer: limit,
            remote: limit,
        }
    }

    pub fn for_phase(&self, phase: DeployPhase) -> Option<Duration> {
        match phase {
            DeployPhase::Archive => Some(self.archive),
            DeployPhase::Transfer => Some(self.transfer),
            DeployPhase::RemoteExecute => Some(self.remote),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub source_dir: PathBuf,
    /// Where the archive is written. Defaults to the parent of `source_dir`.
    pub staging_dir: Option<PathBuf>,
    pub exclude: BTreeSet<String>,
    pub container: ContainerSpec,
    pub failure_policy: FailurePolicy,
    pub timeouts: StageTimeouts,
    pub ssh_port: Option<u16>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("server"),
            staging_dir: None,
            exclude: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            container: ContainerSpec::default(),
            failure_policy: FailurePolicy::default(),
            timeouts: StageTimeouts::default(),
            ssh_port: None,
        }
    }
}

impl DeployConfig {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Replace the exclusion set. An empty iterator archives everything.
    pub fn with_exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_container(mut self, container: ContainerSpec) -> Self {
        self.container = container;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_ssh_port(mut self, port: Option<u16>) -> Self {
        self.ssh_port = port;
        self
    }
}
