//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;

use loadfleet_core::LifecycleState;

use crate::controller::FleetStatus;
use crate::state::AppState;

/// Collect all metrics from AppState and format as Prometheus text.
pub async fn collect_metrics(state: &AppState) -> String {
    let status = state.controller.lock().await.status();
    format_metrics(&status)
}

/// Format a fleet snapshot as Prometheus text.
pub fn format_metrics(status: &FleetStatus) -> String {
    let mut output = String::new();

    writeln!(
        output,
        "# HELP loadfleet_workers Number of workers by lifecycle state"
    )
    .ok();
    writeln!(output, "# TYPE loadfleet_workers gauge").ok();
    for state in LifecycleState::ALL {
        writeln!(
            output,
            "loadfleet_workers{{state=\"{state}\"}} {}",
            status.count(state)
        )
        .ok();
    }

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP loadfleet_workers_desired Target number of live workers"
    )
    .ok();
    writeln!(output, "# TYPE loadfleet_workers_desired gauge").ok();
    writeln!(output, "loadfleet_workers_desired {}", status.desired).ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP loadfleet_workers_max Upper bound on the pool size"
    )
    .ok();
    writeln!(output, "# TYPE loadfleet_workers_max gauge").ok();
    writeln!(output, "loadfleet_workers_max {}", status.max).ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP loadfleet_fleet_ready Whether every desired worker is running"
    )
    .ok();
    writeln!(output, "# TYPE loadfleet_fleet_ready gauge").ok();
    writeln!(
        output,
        "loadfleet_fleet_ready {}",
        u8::from(status.is_ready())
    )
    .ok();

    output
}
