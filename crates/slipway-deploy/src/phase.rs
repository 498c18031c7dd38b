//! Deployment state machine phases.

use std::fmt;

/// Where a deployment run currently is.
///
/// `Requested → Authorizing → BuildSubmitted → BuildRunning → Streaming →
/// BuildTerminal → RuntimeSubmitted → Exposed`, or `Aborted` from any
/// non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployPhase {
    Requested,
    Authorizing,
    BuildSubmitted,
    BuildRunning,
    Streaming,
    BuildTerminal { succeeded: bool },
    RuntimeSubmitted,
    Exposed,
    Aborted,
}

impl DeployPhase {
    pub fn is_final(self) -> bool {
        matches!(
            self,
            DeployPhase::Exposed
                | DeployPhase::Aborted
                | DeployPhase::BuildTerminal { succeeded: false }
        )
    }
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployPhase::Requested => write!(f, "requested"),
            DeployPhase::Authorizing => write!(f, "authorizing"),
            DeployPhase::BuildSubmitted => write!(f, "build-submitted"),
            DeployPhase::BuildRunning => write!(f, "build-running"),
            DeployPhase::Streaming => write!(f, "streaming"),
            DeployPhase::BuildTerminal { succeeded: true } => write!(f, "build-succeeded"),
            DeployPhase::BuildTerminal { succeeded: false } => write!(f, "build-failed"),
            DeployPhase::RuntimeSubmitted => write!(f, "runtime-submitted"),
            DeployPhase::Exposed => write!(f, "exposed"),
            DeployPhase::Aborted => write!(f, "aborted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_phases() {
        assert!(DeployPhase::Exposed.is_final());
        assert!(DeployPhase::Aborted.is_final());
        assert!(DeployPhase::BuildTerminal { succeeded: false }.is_final());
        assert!(!DeployPhase::BuildTerminal { succeeded: true }.is_final());
        assert!(!DeployPhase::Streaming.is_final());
        assert_eq!(
            DeployPhase::BuildTerminal { succeeded: true }.to_string(),
            "build-succeeded"
        );
    }
}
