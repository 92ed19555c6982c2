//! LoadFleet Control Plane Library
//!
//! This crate provides the fleet controller, the compute provider backends,
//! health probing, the inventory export and the HTTP API served by the
//! `loadfleet-control-plane` daemon.

pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod inventory;
pub mod metrics;
pub mod probe;
pub mod provider;
pub mod reconciler;
pub mod state;

pub use config::{Config, ConfigError, ProviderKind};
pub use controller::{
    FleetController, FleetStatus, HealthSettings, ObservationReport, ReconcileReport,
    TerminateOutcome,
};
pub use error::{FleetError, ProviderError};
pub use inventory::Inventory;
pub use probe::{HealthProbe, TcpProbe};
pub use provider::{ComputeProvider, DockerProvider, SimulatedProvider};
pub use state::AppState;
