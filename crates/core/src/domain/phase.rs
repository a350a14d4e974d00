use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeployPhase {
    #[default]
    Start,
    ResolveSourceDir,
    Archive,
    Transfer,
    RemoteExecute,
    Cleanup,
    Succeeded,
    Failed,
}

impl DeployPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ResolveSourceDir => "resolve_source_dir",
            Self::Archive => "archive",
            Self::Transfer => "transfer",
            Self::RemoteExecute => "remote_execute",
            Self::Cleanup => "cleanup",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "resolve_source_dir" => Some(Self::ResolveSourceDir),
            "archive" => Some(Self::Archive),
            "transfer" => Some(Self::Transfer),
            "remote_execute" => Some(Self::RemoteExecute),
            "cleanup" => Some(Self::Cleanup),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
