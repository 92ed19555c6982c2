//! Worker inventory file: where each live worker can be reached.
//!
//! Written as a JSON array so load-test coordinators can read worker
//! addresses without talking to the control plane.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use loadfleet_core::{LifecycleState, Worker};

/// Placeholder for an address the provider did not assign.
pub const NO_ADDRESS: &str = "N/A";

/// One inventory line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InventoryEntry {
    pub instance_id: String,
    pub public_ip_address: String,
    pub private_ip_address: String,
    pub worker_id: String,
    pub name: String,
    pub state: LifecycleState,
}

/// Live workers that hold an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    pub entries: Vec<InventoryEntry>,
}

impl Inventory {
    pub fn from_workers(workers: &[Worker]) -> Self {
        let entries = workers
            .iter()
            .filter(|w| w.is_live())
            .filter_map(|w| {
                let instance = w.instance.as_ref()?;
                Some(InventoryEntry {
                    instance_id: instance.to_string(),
                    public_ip_address: w
                        .public_address
                        .map(|a| a.to_string())
                        .unwrap_or_else(|| NO_ADDRESS.to_string()),
                    private_ip_address: w
                        .private_address
                        .map(|a| a.to_string())
                        .unwrap_or_else(|| NO_ADDRESS.to_string()),
                    worker_id: w.id.to_string(),
                    name: w.name.clone(),
                    state: w.state,
                })
            })
            .collect();
        Self { entries }
    }

    /// Write the inventory as pretty-printed JSON, replacing any previous file.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)
    }

    pub fn read_from(path: &Path) -> io::Result<Self> {
        let data = fs::read(path)?;
        serde_json::from_slice(&data).map_err(io::Error::other)
    }
}
