//! In-process compute backend.
//!
//! Keeps instances in memory and answers health probes itself, so a fleet
//! can be rehearsed end to end without a cloud account. Fault hooks let tests
//! inject allocation errors, external terminations, and broken bootstraps.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use loadfleet_core::{InstanceId, InstanceTemplate, WorkerId};

use super::{
    Allocation, ComputeProvider, DiscoveredInstance, InstanceStatus, LaunchRequest, PolicyHandle,
};
use crate::error::ProviderError;
use crate::probe::HealthProbe;

struct SimInstance {
    worker_id: WorkerId,
    name: String,
    fleet: String,
    status: InstanceStatus,
    public_address: IpAddr,
    private_address: IpAddr,
    launched_at: DateTime<Utc>,
    bootstrap_broken: bool,
    unhealthy: bool,
}

#[derive(Default)]
struct SimState {
    instances: HashMap<InstanceId, SimInstance>,
    policies: HashMap<String, PolicyHandle>,
    faults: VecDeque<ProviderError>,
    quota: Option<usize>,
    policy_creations: u32,
    launch_attempts: u32,
    destroyed: Vec<InstanceId>,
    next_host: u32,
}

impl SimState {
    fn active(&self) -> usize {
        self.instances
            .values()
            .filter(|i| !i.status.is_gone())
            .count()
    }

    fn insert(
        &mut self,
        worker_id: WorkerId,
        name: &str,
        fleet: &str,
        launched_at: DateTime<Utc>,
    ) -> (InstanceId, IpAddr, IpAddr) {
        self.next_host += 1;
        let host = self.next_host + 9;
        let [_, _, hi, lo] = host.to_be_bytes();
        let instance = InstanceId::new(format!("sim-{host:08x}"));
        let public_address = IpAddr::V4(Ipv4Addr::new(198, 18, hi, lo));
        let private_address = IpAddr::V4(Ipv4Addr::new(10, 0, hi, lo));

        self.instances.insert(
            instance.clone(),
            SimInstance {
                worker_id,
                name: name.to_string(),
                fleet: fleet.to_string(),
                status: InstanceStatus::Running,
                public_address,
                private_address,
                launched_at,
                bootstrap_broken: false,
                unhealthy: false,
            },
        );
        (instance, public_address, private_address)
    }

    fn by_address(&self, address: IpAddr) -> Option<&SimInstance> {
        self.instances
            .values()
            .find(|i| i.public_address == address || i.private_address == address)
    }
}

/// Simulated compute backend.
pub struct SimulatedProvider {
    state: Mutex<SimState>,
    boot_delay: Duration,
}

impl SimulatedProvider {
    /// Backend whose workers answer probes as soon as they launch.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            boot_delay: Duration::ZERO,
        }
    }

    /// Workers answer probes only once `delay` has passed since launch.
    pub fn with_boot_delay(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }

    /// Reject launches with `QuotaExceeded` once `limit` instances are active.
    pub fn with_quota(mut self, limit: usize) -> Self {
        self.state.get_mut().quota = Some(limit);
        self
    }

    /// Fail the next launch with `error`. Queued faults are consumed in order.
    pub async fn fail_next_launch(&self, error: ProviderError) {
        self.state.lock().await.faults.push_back(error);
    }

    /// Terminate an instance behind the controller's back.
    pub async fn kill(&self, instance: &InstanceId) {
        if let Some(sim) = self.state.lock().await.instances.get_mut(instance) {
            sim.status = InstanceStatus::Terminated;
        }
    }

    /// Make an instance's bootstrap fail: it keeps running but never answers.
    pub async fn break_bootstrap(&self, instance: &InstanceId) {
        if let Some(sim) = self.state.lock().await.instances.get_mut(instance) {
            sim.bootstrap_broken = true;
        }
    }

    /// Make a booted instance stop (or resume) answering probes.
    pub async fn set_unhealthy(&self, instance: &InstanceId, unhealthy: bool) {
        if let Some(sim) = self.state.lock().await.instances.get_mut(instance) {
            sim.unhealthy = unhealthy;
        }
    }

    /// Register a running instance as if an earlier control plane had
    /// launched it at `launched_at`.
    pub async fn seed(&self, fleet: &str, name: &str, launched_at: DateTime<Utc>) -> InstanceId {
        let mut state = self.state.lock().await;
        let (instance, _, _) = state.insert(WorkerId::generate(), name, fleet, launched_at);
        instance
    }

    /// Launch calls received, successful or not.
    pub async fn launch_attempts(&self) -> u32 {
        self.state.lock().await.launch_attempts
    }

    /// Instances passed to `destroy`, in call order.
    pub async fn destroyed(&self) -> Vec<InstanceId> {
        self.state.lock().await.destroyed.clone()
    }

    /// Instances not terminated.
    pub async fn active_instances(&self) -> usize {
        self.state.lock().await.active()
    }

    /// Times an ingress boundary was actually created (not reused).
    pub async fn policy_creations(&self) -> u32 {
        self.state.lock().await.policy_creations
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComputeProvider for SimulatedProvider {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn ensure_network_policy(
        &self,
        name: &str,
        template: &InstanceTemplate,
    ) -> Result<PolicyHandle, ProviderError> {
        let mut state = self.state.lock().await;
        if let Some(handle) = state.policies.get(name) {
            debug!(policy = %name, "Reusing existing network policy");
            return Ok(handle.clone());
        }

        let handle = PolicyHandle(format!("sim-policy-{name}"));
        state.policies.insert(name.to_string(), handle.clone());
        state.policy_creations += 1;
        info!(
            policy = %name,
            rules = template.network().rules().len(),
            "Created network policy"
        );
        Ok(handle)
    }

    async fn launch(&self, request: &LaunchRequest) -> Result<Allocation, ProviderError> {
        let mut state = self.state.lock().await;
        state.launch_attempts += 1;

        if let Some(fault) = state.faults.pop_front() {
            return Err(fault);
        }
        if let Some(limit) = state.quota {
            if state.active() >= limit {
                return Err(ProviderError::QuotaExceeded(format!(
                    "instance limit of {limit} reached"
                )));
            }
        }

        let (instance, public_address, private_address) = state.insert(
            request.worker_id.clone(),
            &request.name,
            &request.fleet,
            Utc::now(),
        );

        debug!(instance = %instance, name = %request.name, "Simulated instance launched");

        Ok(Allocation {
            instance,
            public_address: Some(public_address),
            private_address: Some(private_address),
        })
    }

    async fn describe(&self, instance: &InstanceId) -> Result<InstanceStatus, ProviderError> {
        let state = self.state.lock().await;
        Ok(state
            .instances
            .get(instance)
            .map(|i| i.status)
            .unwrap_or(InstanceStatus::Gone))
    }

    async fn destroy(&self, instance: &InstanceId) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        state.destroyed.push(instance.clone());
        if let Some(sim) = state.instances.get_mut(instance) {
            sim.status = InstanceStatus::Terminated;
        }
        Ok(())
    }

    async fn list_fleet(&self, fleet: &str) -> Result<Vec<DiscoveredInstance>, ProviderError> {
        let state = self.state.lock().await;
        Ok(state
            .instances
            .iter()
            .filter(|(_, i)| i.fleet == fleet)
            .map(|(id, i)| DiscoveredInstance {
                instance: id.clone(),
                worker_id: Some(i.worker_id.clone()),
                name: i.name.clone(),
                status: i.status,
                public_address: Some(i.public_address),
                private_address: Some(i.private_address),
                created_at: Some(i.launched_at),
            })
            .collect())
    }
}

#[async_trait]
impl HealthProbe for SimulatedProvider {
    async fn probe(&self, address: IpAddr) -> bool {
        let state = self.state.lock().await;
        let Some(sim) = state.by_address(address) else {
            return false;
        };
        let booted = chrono::Duration::from_std(self.boot_delay)
            .map(|delay| Utc::now() - sim.launched_at >= delay)
            .unwrap_or(false);

        sim.status == InstanceStatus::Running && booted && !sim.bootstrap_broken && !sim.unhealthy
    }
}
