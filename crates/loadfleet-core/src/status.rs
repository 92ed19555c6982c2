//! Worker lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a Worker.
///
/// `Provisioning -> Bootstrapping -> Running -> Terminated`, with `Failed`
/// reachable from `Provisioning` (allocation rejected) and from
/// `Bootstrapping`/`Running` (health checks).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Compute allocation requested but not yet granted.
    #[default]
    Provisioning,
    /// Compute allocated; the bootstrap script is running on first boot.
    Bootstrapping,
    /// Worker answered a health probe.
    Running,
    /// Compute destroyed by the controller, an operator, or externally.
    Terminated,
    /// Allocation rejected or the worker never became healthy.
    Failed,
}

impl LifecycleState {
    /// All states, in lifecycle order.
    pub const ALL: [LifecycleState; 5] = [
        Self::Provisioning,
        Self::Bootstrapping,
        Self::Running,
        Self::Terminated,
        Self::Failed,
    ];

    /// Returns true if the state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Failed)
    }

    /// Returns true if the worker counts toward the pool size.
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Provisioning, Bootstrapping)
                | (Provisioning, Failed)
                | (Provisioning, Terminated)
                | (Bootstrapping, Running)
                | (Bootstrapping, Failed)
                | (Bootstrapping, Terminated)
                | (Running, Failed)
                | (Running, Terminated)
        )
    }

    /// Lowercase label used in metrics and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Bootstrapping => "bootstrapping",
            Self::Running => "running",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(LifecycleState::Terminated.is_terminal());
        assert!(LifecycleState::Failed.is_terminal());
        assert!(LifecycleState::Provisioning.is_live());
        assert!(LifecycleState::Bootstrapping.is_live());
        assert!(LifecycleState::Running.is_live());
    }

    #[test]
    fn test_transitions() {
        use LifecycleState::*;
        assert!(Provisioning.can_transition_to(Bootstrapping));
        assert!(Provisioning.can_transition_to(Failed));
        assert!(Bootstrapping.can_transition_to(Running));
        assert!(Running.can_transition_to(Terminated));

        assert!(!Running.can_transition_to(Bootstrapping));
        assert!(!Terminated.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Provisioning.can_transition_to(Running));
    }

    #[test]
    fn test_serde_format() {
        let json = serde_json::to_string(&LifecycleState::Bootstrapping).unwrap();
        assert_eq!(json, "\"BOOTSTRAPPING\"");
    }
}
