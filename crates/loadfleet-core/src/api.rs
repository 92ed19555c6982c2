//! Request and response bodies of the control plane HTTP API.
//!
//! Shared by the server and the admin client so both sides agree on the
//! wire shape.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LifecycleState, Worker, WorkerId};

/// Error body returned with any non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Pool counts and readiness (`GET /v1/status`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub name_prefix: String,
    pub desired: u32,
    pub max: u32,
    pub provisioning: u32,
    pub bootstrapping: u32,
    pub running: u32,
    pub terminated: u32,
    pub failed: u32,
    pub live: u32,
    pub ready: bool,
    pub provider: String,
}

/// One worker (`GET /v1/workers`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub worker_id: WorkerId,
    pub name: String,
    pub ordinal: u32,
    pub state: LifecycleState,
    pub instance_id: Option<String>,
    pub public_address: Option<IpAddr>,
    pub private_address: Option<IpAddr>,
    pub created_at: DateTime<Utc>,
    pub state_changed_at: DateTime<Utc>,
    pub failure: Option<String>,
}

impl From<&Worker> for WorkerResponse {
    fn from(w: &Worker) -> Self {
        Self {
            worker_id: w.id.clone(),
            name: w.name.clone(),
            ordinal: w.ordinal,
            state: w.state,
            instance_id: w.instance.as_ref().map(|i| i.to_string()),
            public_address: w.public_address,
            private_address: w.private_address,
            created_at: w.created_at,
            state_changed_at: w.state_changed_at,
            failure: w.failure.clone(),
        }
    }
}

/// Where load-test coordinators connect (`GET /v1/entry-point`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPointResponse {
    pub worker_id: WorkerId,
    pub name: String,
    pub address: IpAddr,
}

/// The rendered startup script (`GET /v1/bootstrap`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapResponse {
    /// Hex SHA-256 of `script`.
    pub digest: String,
    pub script: String,
}

/// Body of `PUT /v1/pool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleRequest {
    pub desired_count: u32,
}

/// Pool bounds after a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolResponse {
    pub desired_count: u32,
    pub max_count: u32,
}

/// Result of `POST /v1/workers/:id/terminate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateResponse {
    pub worker_id: WorkerId,
    /// True when the worker was already terminated or failed.
    pub already_terminal: bool,
}

/// A launch the provider rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchFailure {
    pub worker_id: WorkerId,
    pub reason: String,
}

/// Result of `POST /v1/reconcile` (one observe + reconcile cycle).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub created: Vec<WorkerId>,
    pub failed: Vec<LaunchFailure>,
    pub terminated: Vec<WorkerId>,
    pub errors: Vec<String>,
    /// Workers that finished bootstrapping during the observation.
    pub now_running: Vec<WorkerId>,
    /// Workers that timed out or stopped answering probes.
    pub now_failed: Vec<WorkerId>,
    /// Workers whose instance vanished at the provider.
    pub gone: Vec<WorkerId>,
}
