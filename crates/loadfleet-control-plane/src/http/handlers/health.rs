//! Liveness and metrics handlers.

use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// Liveness of the control plane itself. Always 200 while the process
/// serves requests; `fleet_ready` reports whether the pool has converged.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let controller = state.controller.lock().await;
    let status = controller.status();
    Json(json!({
        "status": "ok",
        "provider": controller.provider_name(),
        "live_workers": status.live(),
        "fleet_ready": status.is_ready(),
    }))
}

/// Prometheus scrape target.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::collect_metrics(&state).await,
    )
}
