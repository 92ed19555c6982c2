//! Shared application state.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::controller::FleetController;
use crate::probe::HealthProbe;

/// Shared application state.
pub struct AppState {
    /// The fleet controller. Every mutating call goes through this lock, so
    /// the background loop and API requests never reconcile concurrently.
    pub controller: Mutex<FleetController>,

    /// Liveness probe used by every observation pass.
    pub probe: Arc<dyn HealthProbe>,

    /// Inventory file rewritten after each cycle.
    pub inventory_path: Option<PathBuf>,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(controller: FleetController, probe: Arc<dyn HealthProbe>) -> Arc<Self> {
        Arc::new(Self {
            controller: Mutex::new(controller),
            probe,
            inventory_path: None,
        })
    }

    /// Create a new AppState that exports the worker inventory.
    pub fn with_inventory(
        controller: FleetController,
        probe: Arc<dyn HealthProbe>,
        inventory_path: PathBuf,
    ) -> Arc<Self> {
        Arc::new(Self {
            controller: Mutex::new(controller),
            probe,
            inventory_path: Some(inventory_path),
        })
    }
}
