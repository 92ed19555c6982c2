//! Worker handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};

use loadfleet_core::api::{TerminateResponse, WorkerResponse};
use loadfleet_core::WorkerId;

use crate::controller::TerminateOutcome;
use crate::state::AppState;

/// List every worker record, terminated ones included.
pub async fn list_workers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let controller = state.controller.lock().await;
    let response: Vec<WorkerResponse> = controller
        .workers()
        .iter()
        .map(WorkerResponse::from)
        .collect();
    Json(response)
}

/// Terminate one worker.
pub async fn terminate_worker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let worker_id = WorkerId::new(id);
    let mut controller = state.controller.lock().await;

    match controller.terminate(&worker_id).await {
        Ok(outcome) => Json(TerminateResponse {
            worker_id,
            already_terminal: outcome == TerminateOutcome::AlreadyTerminal,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}
