use dockship_core::DeployPhase;
use tracing::debug;

use crate::error::{DeployError, Result};

pub struct DeployStateMachine;

impl DeployStateMachine {
    pub fn validate_transition(from: &DeployPhase, to: &DeployPhase) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(DeployError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &DeployPhase) -> Vec<DeployPhase> {
        match from {
            DeployPhase::Start => vec![DeployPhase::ResolveSourceDir, DeployPhase::Cleanup],
            DeployPhase::ResolveSourceDir => vec![DeployPhase::Archive, DeployPhase::Cleanup],
            DeployPhase::Archive => vec![DeployPhase::Transfer, DeployPhase::Cleanup],
            DeployPhase::Transfer => vec![DeployPhase::RemoteExecute, DeployPhase::Cleanup],
            DeployPhase::RemoteExecute => vec![DeployPhase::Cleanup],
            DeployPhase::Cleanup => vec![DeployPhase::Succeeded, DeployPhase::Failed],
            DeployPhase::Succeeded | DeployPhase::Failed => vec![],
        }
    }

    pub fn can_transition(from: &DeployPhase, to: &DeployPhase) -> bool {
        Self::validate_transition(from, to).is_ok()
    }
}

/// The phase of one run plus every phase it passed through.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    current: DeployPhase,
    history: Vec<DeployPhase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: DeployPhase::Start,
            history: vec![DeployPhase::Start],
        }
    }

    pub fn current(&self) -> DeployPhase {
        self.current
    }

    pub fn history(&self) -> &[DeployPhase] {
        &self.history
    }

    pub fn advance(&mut self, to: DeployPhase) -> Result<()> {
        DeployStateMachine::validate_transition(&self.current, &to)?;
        debug!(from = %self.current, to = %to, "Phase transition");
        self.current = to;
        self.history.push(to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(DeployStateMachine::can_transition(
            &DeployPhase::Start,
            &DeployPhase::ResolveSourceDir
        ));
        assert!(DeployStateMachine::can_transition(
            &DeployPhase::Archive,
            &DeployPhase::Transfer
        ));
        assert!(DeployStateMachine::can_transition(
            &DeployPhase::Cleanup,
            &DeployPhase::Failed
        ));
    }

    #[test]
    fn test_every_stage_can_short_circuit_to_cleanup() {
        for phase in [
            DeployPhase::Start,
            DeployPhase::ResolveSourceDir,
            DeployPhase::Archive,
            DeployPhase::Transfer,
            DeployPhase::RemoteExecute,
        ] {
            assert!(DeployStateMachine::can_transition(
                &phase,
                &DeployPhase::Cleanup
            ));
        }
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!DeployStateMachine::can_transition(
            &DeployPhase::Start,
            &DeployPhase::Transfer
        ));
        assert!(!DeployStateMachine::can_transition(
            &DeployPhase::Archive,
            &DeployPhase::Succeeded
        ));
        assert!(!DeployStateMachine::can_transition(
            &DeployPhase::Succeeded,
            &DeployPhase::Cleanup
        ));
    }

    #[test]
    fn test_tracker_history() {
        let mut tracker = PhaseTracker::new();
        tracker.advance(DeployPhase::ResolveSourceDir).unwrap();
        tracker.advance(DeployPhase::Cleanup).unwrap();
        tracker.advance(DeployPhase::Failed).unwrap();

        assert_eq!(tracker.current(), DeployPhase::Failed);
        assert_eq!(
            tracker.history(),
            &[
                DeployPhase::Start,
                DeployPhase::ResolveSourceDir,
                DeployPhase::Cleanup,
                DeployPhase::Failed
            ]
        );
    }

    #[test]
    fn test_tracker_rejects_skip() {
        let mut tracker = PhaseTracker::new();
        let err = tracker.advance(DeployPhase::RemoteExecute).unwrap_err();

        assert!(matches!(err, DeployError::InvalidTransition { .. }));
        assert_eq!(tracker.current(), DeployPhase::Start);
    }
}
