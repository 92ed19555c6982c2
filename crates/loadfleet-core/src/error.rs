//! Core domain errors.

use thiserror::Error;

use crate::status::LifecycleState;

/// Malformed network policy input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Port range with `from > to` or a bound outside `[0, 65535]`.
    #[error("Invalid port range: {from}-{to}")]
    InvalidPortRange { from: i64, to: i64 },

    /// Protocol is not a recognized transport protocol.
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    /// Source is not a valid CIDR block.
    #[error("Invalid CIDR block: {0}")]
    InvalidCidr(String),
}

/// Invalid fleet configuration. Always raised before any resource exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Desired worker count outside `[1, max]`.
    #[error("Desired worker count {requested} is outside the allowed range 1..={max}")]
    DesiredCountOutOfRange { requested: u32, max: u32 },

    /// Configured maximum above the hard ceiling.
    #[error("Maximum worker count {requested} exceeds the hard ceiling of {ceiling}")]
    MaxCountTooLarge { requested: u32, ceiling: u32 },

    /// An identifier (image, credential, network, subnet) is empty or malformed.
    #[error("Invalid {kind} identifier: '{value}'")]
    InvalidIdentifier { kind: &'static str, value: String },

    /// Unknown compute size class.
    #[error("Unknown instance class: {0}")]
    UnknownInstanceClass(String),

    /// Worker source settings cannot produce a usable bootstrap script.
    #[error("Invalid bootstrap source: {0}")]
    InvalidSource(String),

    /// Network policy rule rejected.
    #[error("Invalid network policy: {0}")]
    Policy(#[from] ValidationError),
}

/// Illegal worker lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid state transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
}
