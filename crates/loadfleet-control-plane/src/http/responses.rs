//! Error responses.
//!
//! Request and response bodies live in `loadfleet_core::api`; this module
//! maps controller errors onto HTTP statuses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use loadfleet_core::api::ErrorResponse;

use crate::error::FleetError;

/// Build a JSON error response.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// HTTP status for a controller error.
pub fn status_for(err: &FleetError) -> StatusCode {
    match err {
        FleetError::Configuration(_) => StatusCode::BAD_REQUEST,
        FleetError::WorkerNotFound(_) => StatusCode::NOT_FOUND,
        FleetError::Provisioning(_) => StatusCode::BAD_GATEWAY,
        FleetError::Transition(_) => StatusCode::CONFLICT,
    }
}

impl IntoResponse for FleetError {
    fn into_response(self) -> Response {
        error_response(status_for(&self), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use loadfleet_core::{ConfigurationError, WorkerId};

    #[test]
    fn test_status_mapping() {
        let err = FleetError::Configuration(ConfigurationError::DesiredCountOutOfRange {
            requested: 11,
            max: 10,
        });
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);

        let err = FleetError::WorkerNotFound(WorkerId::new("w-1"));
        assert_eq!(status_for(&err), StatusCode::NOT_FOUND);

        let err = FleetError::Provisioning(ProviderError::QuotaExceeded("vcpu".into()));
        assert_eq!(status_for(&err), StatusCode::BAD_GATEWAY);
    }
}
