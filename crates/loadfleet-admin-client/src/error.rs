//! Error types for the admin client.

use thiserror::Error;

/// Errors that can occur when using the admin client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (connection refused, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The control plane rejected the request.
    #[error("{status}: {message}")]
    Api { status: u16, message: String },

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    /// HTTP status returned by the control plane, if it answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::NotFound(_) => Some(404),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Serialization(_) => None,
        }
    }
}
