//! Worker records tracked by the fleet controller.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InvalidTransition;
use crate::{InstanceId, LifecycleState, WorkerId};

/// One member of the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    /// Controller-assigned identifier.
    pub id: WorkerId,

    /// Monotonic position in the fleet; also used in the worker's name.
    pub ordinal: u32,

    /// Name tag given to the instance.
    pub name: String,

    /// Current lifecycle state.
    pub state: LifecycleState,

    /// Provider handle, once compute is allocated.
    pub instance: Option<InstanceId>,

    pub public_address: Option<IpAddr>,

    pub private_address: Option<IpAddr>,

    /// When the controller created the record.
    pub created_at: DateTime<Utc>,

    /// When `state` last changed.
    pub state_changed_at: DateTime<Utc>,

    /// Why the worker failed, if it did.
    pub failure: Option<String>,

    /// Health probes failed in a row since the last success.
    pub consecutive_probe_failures: u32,
}

impl Worker {
    /// New record in `Provisioning`.
    pub fn new(ordinal: u32, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkerId::generate(),
            ordinal,
            name: name.into(),
            state: LifecycleState::Provisioning,
            instance: None,
            public_address: None,
            private_address: None,
            created_at: now,
            state_changed_at: now,
            failure: None,
            consecutive_probe_failures: 0,
        }
    }

    /// Builder method to backdate creation (useful for testing).
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.state_changed_at = created_at;
        self
    }

    /// Address external callers should use: public first, then private.
    pub fn address(&self) -> Option<IpAddr> {
        self.public_address.or(self.private_address)
    }

    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    /// Compute granted: `Provisioning -> Bootstrapping`.
    pub fn allocated(
        &mut self,
        instance: InstanceId,
        public_address: Option<IpAddr>,
        private_address: Option<IpAddr>,
    ) -> Result<(), InvalidTransition> {
        self.transition(LifecycleState::Bootstrapping)?;
        self.instance = Some(instance);
        self.public_address = public_address;
        self.private_address = private_address;
        Ok(())
    }

    /// Health probe answered: `Bootstrapping -> Running`.
    pub fn running(&mut self) -> Result<(), InvalidTransition> {
        self.transition(LifecycleState::Running)?;
        self.consecutive_probe_failures = 0;
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(LifecycleState::Failed)?;
        self.failure = Some(reason.into());
        Ok(())
    }

    pub fn terminate(&mut self) -> Result<(), InvalidTransition> {
        self.transition(LifecycleState::Terminated)
    }

    fn transition(&mut self, next: LifecycleState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.state_changed_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut worker = Worker::new(1, "fleet-1");
        assert_eq!(worker.state, LifecycleState::Provisioning);

        worker
            .allocated(InstanceId::new("i-1"), Some("198.51.100.1".parse().unwrap()), None)
            .unwrap();
        assert_eq!(worker.state, LifecycleState::Bootstrapping);
        assert_eq!(worker.address(), Some("198.51.100.1".parse().unwrap()));

        worker.running().unwrap();
        worker.terminate().unwrap();
        assert_eq!(worker.state, LifecycleState::Terminated);
    }

    #[test]
    fn test_address_falls_back_to_private() {
        let mut worker = Worker::new(1, "fleet-1");
        worker
            .allocated(InstanceId::new("i-1"), None, Some("10.0.0.5".parse().unwrap()))
            .unwrap();
        assert_eq!(worker.address(), Some("10.0.0.5".parse().unwrap()));
    }

    #[test]
    fn test_fail_records_reason() {
        let mut worker = Worker::new(2, "fleet-2");
        worker.fail("quota exceeded").unwrap();
        assert_eq!(worker.state, LifecycleState::Failed);
        assert_eq!(worker.failure.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut worker = Worker::new(3, "fleet-3");
        worker.terminate().unwrap();
        let err = worker.terminate().unwrap_err();
        assert_eq!(err.from, LifecycleState::Terminated);
        assert!(worker.running().is_err());
    }
}
