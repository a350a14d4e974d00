use chrono::{DateTime, Utc};
use dockship_core::{DeployPhase, StepKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub phase: DeployPhase,
    pub duration_ms: u64,
}

impl StageTiming {
    pub fn new(phase: DeployPhase, elapsed: Duration) -> Self {
        Self {
            phase,
            duration_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Outcome of a successful deployment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployReport {
    pub run_id: Uuid,
    pub target: String,
    pub source_dir: PathBuf,
    pub archive_bytes: u64,
    /// Remote steps in the order the session reported them.
    pub steps: Vec<StepKind>,
    pub stages: Vec<StageTiming>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DeployReport {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    pub fn summary(&self) -> String {
        format!(
            "Deployed {} to {} in {:.1}s ({} remote steps, archive {} bytes)",
            self.source_dir.display(),
            self.target,
            self.duration_ms() as f64 / 1000.0,
            self.steps.len(),
            self.archive_bytes
        )
    }
}
