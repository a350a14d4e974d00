pub mod config;
pub mod deployer;
pub mod error;
pub mod report;
pub mod resources;
pub mod state_machine;

pub use config::{DeployConfig, StageTimeouts};
pub use deployer::{DeployPlan, Deployer};
pub use error::{DeployError, Result};
pub use report::{DeployReport, StageTiming};
pub use state_machine::{DeployStateMachine, PhaseTracker};
