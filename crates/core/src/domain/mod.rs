pub mod artifact;
pub mod phase;
pub mod script;
pub mod target;

pub use artifact::ArchiveArtifact;
pub use phase::DeployPhase;
pub use script::{
    parse_step_marker, shell_quote, ContainerSpec, FailurePolicy, RemoteCommandScript, RemoteStep,
    StepKind, DEFAULT_CONTAINER_NAME, DEFAULT_PORT,
};
pub use target::DeploymentTarget;
