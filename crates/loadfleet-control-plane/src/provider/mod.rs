//! Compute provider seam.
//!
//! The controller never talks to a cloud API directly. Everything it needs
//! from a backend (an ingress boundary, machines, their state) goes through
//! [`ComputeProvider`].

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use loadfleet_core::{BootstrapPayload, InstanceId, InstanceTemplate, WorkerId};

use crate::error::ProviderError;

mod docker;
mod simulated;

pub use docker::DockerProvider;
pub use simulated::SimulatedProvider;

/// Label keys attached to every instance.
pub mod labels {
    pub const FLEET: &str = "loadfleet.fleet";
    pub const WORKER_ID: &str = "loadfleet.worker-id";
    pub const NAME: &str = "loadfleet.name";
    pub const TEMPLATE_DIGEST: &str = "loadfleet.template-digest";
}

/// Backend handle for the fleet's ingress boundary (a security group, a
/// bridge network...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyHandle(pub String);

impl PolicyHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Everything a provider needs to start one worker.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub worker_id: WorkerId,
    pub name: String,
    pub fleet: String,
    pub template: Arc<InstanceTemplate>,
    pub payload: Arc<BootstrapPayload>,
    pub policy: PolicyHandle,
}

/// Compute granted for a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub instance: InstanceId,
    pub public_address: Option<IpAddr>,
    pub private_address: Option<IpAddr>,
}

/// Backend view of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    /// Allocated but not yet booted.
    Pending,
    Running,
    /// Stopped or terminated outside the controller.
    Terminated,
    /// The backend no longer knows the instance.
    Gone,
}

impl InstanceStatus {
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Terminated | Self::Gone)
    }
}

/// Instance found by label during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredInstance {
    pub instance: InstanceId,
    pub worker_id: Option<WorkerId>,
    pub name: String,
    pub status: InstanceStatus,
    pub public_address: Option<IpAddr>,
    pub private_address: Option<IpAddr>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A compute backend.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Create the ingress boundary named `name`, or reuse it if it already
    /// exists.
    async fn ensure_network_policy(
        &self,
        name: &str,
        template: &InstanceTemplate,
    ) -> Result<PolicyHandle, ProviderError>;

    /// Allocate one machine and hand it the bootstrap payload.
    async fn launch(&self, request: &LaunchRequest) -> Result<Allocation, ProviderError>;

    /// Current backend state of an instance.
    async fn describe(&self, instance: &InstanceId) -> Result<InstanceStatus, ProviderError>;

    /// Destroy an instance. Destroying an instance that no longer exists succeeds.
    async fn destroy(&self, instance: &InstanceId) -> Result<(), ProviderError>;

    /// Instances labelled as members of `fleet`.
    async fn list_fleet(&self, fleet: &str) -> Result<Vec<DiscoveredInstance>, ProviderError>;
}
