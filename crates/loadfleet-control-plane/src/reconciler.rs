//! Background reconciliation loop.
//!
//! Each cycle observes worker health, then reconciles the pool size, then
//! rewrites the inventory file. The controller lock is held for the whole
//! cycle.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::controller::{ObservationReport, ReconcileReport};
use crate::error::FleetError;
use crate::state::AppState;

/// Result of one observe + reconcile cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub observation: ObservationReport,
    pub reconcile: ReconcileReport,
}

/// Run one cycle against the shared controller.
pub async fn run_cycle(state: &AppState) -> Result<CycleReport, FleetError> {
    let mut controller = state.controller.lock().await;

    let observation = controller.observe(state.probe.as_ref()).await?;
    let reconcile = controller.reconcile().await?;

    if let Some(path) = &state.inventory_path {
        if let Err(e) = controller.inventory().write_to(path) {
            warn!(path = %path.display(), error = %e, "Failed to write inventory");
        }
    }

    let status = controller.status();
    if reconcile.is_noop() && observation == ObservationReport::default() {
        debug!(live = status.live(), running = status.running, "Cycle complete, no changes");
    } else {
        info!(
            created = reconcile.created.len(),
            launch_failures = reconcile.failed.len(),
            terminated = reconcile.terminated.len(),
            now_running = observation.running.len(),
            now_failed = observation.failed.len(),
            gone = observation.gone.len(),
            live = status.live(),
            desired = status.desired,
            "Cycle complete"
        );
    }

    Ok(CycleReport {
        observation,
        reconcile,
    })
}

/// Run cycles forever at `period`.
///
/// A failed cycle is logged and retried on the next tick.
pub async fn run_loop(state: Arc<AppState>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = period.as_secs(), "Reconciler started");

    loop {
        ticker.tick().await;
        if let Err(e) = run_cycle(&state).await {
            error!(error = %e, "Reconcile cycle failed");
        }
    }
}
