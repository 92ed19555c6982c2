//! Fleet-level handlers: status, entry point, bootstrap, reconcile, resize.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use loadfleet_core::api::{
    BootstrapResponse, EntryPointResponse, LaunchFailure, PoolResponse, ReconcileResponse,
    ScaleRequest, StatusResponse,
};

use crate::http::responses::error_response;
use crate::reconciler::run_cycle;
use crate::state::AppState;

/// Pool counts and readiness.
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let controller = state.controller.lock().await;
    let status = controller.status();
    Json(StatusResponse {
        name_prefix: controller.spec().name_prefix().to_string(),
        desired: status.desired,
        max: status.max,
        provisioning: status.provisioning,
        bootstrapping: status.bootstrapping,
        running: status.running,
        terminated: status.terminated,
        failed: status.failed,
        live: status.live(),
        ready: status.is_ready(),
        provider: controller.provider_name().to_string(),
    })
}

/// Address of the oldest running worker.
pub async fn get_entry_point(State(state): State<Arc<AppState>>) -> Response {
    let controller = state.controller.lock().await;
    let entry = controller
        .entry_point()
        .and_then(|w| w.address().map(|address| (w, address)));

    match entry {
        Some((worker, address)) => Json(EntryPointResponse {
            worker_id: worker.id.clone(),
            name: worker.name.clone(),
            address,
        })
        .into_response(),
        None => error_response(StatusCode::SERVICE_UNAVAILABLE, "No running worker yet"),
    }
}

/// The startup script every worker receives.
pub async fn get_bootstrap(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let controller = state.controller.lock().await;
    let payload = controller.payload();
    Json(BootstrapResponse {
        digest: payload.digest(),
        script: payload.as_str().to_string(),
    })
}

/// Run one observe + reconcile cycle now.
pub async fn trigger_reconcile(State(state): State<Arc<AppState>>) -> Response {
    match run_cycle(&state).await {
        Ok(cycle) => Json(ReconcileResponse {
            created: cycle.reconcile.created,
            failed: cycle
                .reconcile
                .failed
                .into_iter()
                .map(|f| LaunchFailure {
                    worker_id: f.worker_id,
                    reason: f.reason,
                })
                .collect(),
            terminated: cycle.reconcile.terminated,
            errors: cycle.reconcile.errors,
            now_running: cycle.observation.running,
            now_failed: cycle.observation.failed,
            gone: cycle.observation.gone,
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Requested reconcile failed");
            e.into_response()
        }
    }
}

/// Change the desired pool size. Applied by the next cycle.
pub async fn scale_pool(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScaleRequest>,
) -> Response {
    let mut controller = state.controller.lock().await;
    if let Err(e) = controller.set_desired_count(req.desired_count) {
        warn!(requested = req.desired_count, error = %e, "Rejected pool resize");
        return e.into_response();
    }

    info!(desired_count = req.desired_count, "Pool resized via API");
    Json(PoolResponse {
        desired_count: controller.spec().desired_count(),
        max_count: controller.spec().max_count(),
    })
    .into_response()
}
