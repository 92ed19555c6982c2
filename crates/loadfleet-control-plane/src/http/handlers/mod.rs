//! HTTP request handlers.

mod fleet;
mod health;
mod workers;

pub use fleet::{get_bootstrap, get_entry_point, get_status, scale_pool, trigger_reconcile};
pub use health::{health_check, metrics_handler};
pub use workers::{list_workers, terminate_worker};
