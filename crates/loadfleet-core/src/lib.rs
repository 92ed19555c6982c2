//! LoadFleet Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network or compute backends
//! - Async runtime specifics
//!
//! Everything a fleet run is made of lives here: the ingress policy, the
//! bootstrap sequence, the instance template that embeds both, the pool spec
//! that bounds how many workers exist, and the worker records themselves.
//! [`api`] holds the HTTP bodies exchanged with the control plane.

pub mod api;
pub mod bootstrap;
pub mod error;
pub mod ids;
pub mod network;
pub mod pool;
pub mod status;
pub mod template;
pub mod worker;

// Re-export commonly used types
pub use bootstrap::{BootstrapSequence, BootstrapStep, WorkerSource};
pub use error::{ConfigurationError, InvalidTransition, ValidationError};
pub use ids::{InstanceId, WorkerId};
pub use network::{Cidr, IngressRule, NetworkPolicy, NetworkPolicyBuilder, PortRange, Protocol};
pub use pool::{WorkerPoolSpec, DEFAULT_MAX_WORKERS, HARD_MAX_WORKERS};
pub use status::LifecycleState;
pub use template::{
    BootstrapPayload, CredentialRef, ImageId, InstanceClass, InstanceTemplate, Placement,
};
pub use worker::Worker;
