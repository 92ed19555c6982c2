//! Control plane errors.

use loadfleet_core::{ConfigurationError, InvalidTransition, WorkerId};
use thiserror::Error;

/// Compute backend failures. A failed launch fails only its own worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Account or region quota exhausted.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Backend has no capacity for the requested size.
    #[error("Insufficient capacity: {0}")]
    InsufficientCapacity(String),

    /// Credentials lack the required permission.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Backend rejected the template (unknown image, key, subnet...).
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    /// Instance or network does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other backend failure.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Fleet controller errors.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Invalid parameters; nothing was created.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Compute backend failure.
    #[error("Provisioning error: {0}")]
    Provisioning(#[from] ProviderError),

    /// No worker with this id.
    #[error("Worker not found: {0}")]
    WorkerNotFound(WorkerId),

    /// Illegal lifecycle transition.
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}
