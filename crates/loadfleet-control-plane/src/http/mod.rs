//! HTTP server for the control plane.
//!
//! Provides endpoints for:
//! - Fleet status and readiness (`/v1/status`)
//! - Worker list and termination (`/v1/workers`)
//! - The load-test entry point (`/v1/entry-point`)
//! - The rendered bootstrap script (`/v1/bootstrap`)
//! - On-demand reconciliation and resizing (`/v1/reconcile`, `/v1/pool`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Fleet routes
        .route("/v1/status", get(handlers::get_status))
        .route("/v1/entry-point", get(handlers::get_entry_point))
        .route("/v1/bootstrap", get(handlers::get_bootstrap))
        .route("/v1/reconcile", post(handlers::trigger_reconcile))
        .route("/v1/pool", put(handlers::scale_pool))
        // Worker routes
        .route("/v1/workers", get(handlers::list_workers))
        .route("/v1/workers/:id/terminate", post(handlers::terminate_worker))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
