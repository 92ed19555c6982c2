//! Fleet controller - keeps the worker pool at its desired size.
//!
//! The controller is a plain owned value. Every mutating operation takes
//! `&mut self`, so two reconciliations can never overlap; callers that share
//! the controller put it behind their own lock.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use loadfleet_core::{
    BootstrapPayload, InstanceId, InstanceTemplate, LifecycleState, Worker, WorkerId,
    WorkerPoolSpec,
};

use crate::error::{FleetError, ProviderError};
use crate::inventory::Inventory;
use crate::probe::HealthProbe;
use crate::provider::{ComputeProvider, InstanceStatus, LaunchRequest, PolicyHandle};

/// Terminated and failed records kept for inspection before the oldest are
/// dropped.
pub const DEFAULT_RETAINED_TERMINAL: usize = 100;

/// How health probes drive lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSettings {
    /// A worker still bootstrapping after this long is marked failed.
    /// `None` leaves a silently broken bootstrap undetected forever.
    pub bootstrap_timeout: Option<Duration>,

    /// Consecutive failed probes before a running worker is marked failed.
    pub unhealthy_threshold: u32,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            bootstrap_timeout: Some(Duration::from_secs(15 * 60)),
            unhealthy_threshold: 3,
        }
    }
}

/// A launch the provider rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedLaunch {
    pub worker_id: WorkerId,
    pub reason: String,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Workers allocated in this pass (now bootstrapping).
    pub created: Vec<WorkerId>,
    /// Workers whose allocation was rejected.
    pub failed: Vec<FailedLaunch>,
    /// Excess workers terminated.
    pub terminated: Vec<WorkerId>,
    /// Terminations that did not go through; retried next pass.
    pub errors: Vec<String>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
            && self.failed.is_empty()
            && self.terminated.is_empty()
            && self.errors.is_empty()
    }
}

/// Outcome of one health observation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObservationReport {
    /// Workers that answered their first probe.
    pub running: Vec<WorkerId>,
    /// Workers that timed out or stopped answering.
    pub failed: Vec<WorkerId>,
    /// Workers whose instance disappeared from the provider.
    pub gone: Vec<WorkerId>,
}

/// Result of [`FleetController::terminate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminateOutcome {
    Terminated,
    /// The worker was already terminated or failed; nothing changed.
    AlreadyTerminal,
}

/// Worker counts per lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FleetStatus {
    pub desired: u32,
    pub max: u32,
    pub provisioning: u32,
    pub bootstrapping: u32,
    pub running: u32,
    pub terminated: u32,
    pub failed: u32,
}

impl FleetStatus {
    pub fn count(&self, state: LifecycleState) -> u32 {
        match state {
            LifecycleState::Provisioning => self.provisioning,
            LifecycleState::Bootstrapping => self.bootstrapping,
            LifecycleState::Running => self.running,
            LifecycleState::Terminated => self.terminated,
            LifecycleState::Failed => self.failed,
        }
    }

    /// Workers counting toward the pool size.
    pub fn live(&self) -> u32 {
        self.provisioning + self.bootstrapping + self.running
    }

    /// Every live worker is running and the pool is at its desired size.
    pub fn is_ready(&self) -> bool {
        self.running == self.desired && self.live() == self.running
    }
}

/// Maintains `desired_count` workers built from one instance template.
pub struct FleetController {
    spec: WorkerPoolSpec,
    template: Arc<InstanceTemplate>,
    payload: Arc<BootstrapPayload>,
    provider: Arc<dyn ComputeProvider>,
    health: HealthSettings,
    workers: Vec<Worker>,
    retained_terminal: usize,
    next_ordinal: u32,
    policy: Option<PolicyHandle>,
}

impl FleetController {
    /// Create a controller. Renders the bootstrap payload once; touches no
    /// backend until the first [`reconcile`](Self::reconcile).
    pub fn new(spec: WorkerPoolSpec, provider: Arc<dyn ComputeProvider>) -> Self {
        let template = Arc::new(spec.template().clone());
        let payload = Arc::new(template.render());
        Self {
            spec,
            template,
            payload,
            provider,
            health: HealthSettings::default(),
            workers: Vec::new(),
            retained_terminal: DEFAULT_RETAINED_TERMINAL,
            next_ordinal: 1,
            policy: None,
        }
    }

    /// Builder method to override the health settings.
    pub fn with_health(mut self, health: HealthSettings) -> Self {
        self.health = health;
        self
    }

    /// Builder method to override how many terminal records are kept.
    pub fn with_retained_terminal(mut self, retained: usize) -> Self {
        self.retained_terminal = retained;
        self
    }

    pub fn spec(&self) -> &WorkerPoolSpec {
        &self.spec
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn health(&self) -> HealthSettings {
        self.health
    }

    /// The rendered bootstrap payload every worker receives.
    pub fn payload(&self) -> &BootstrapPayload {
        &self.payload
    }

    /// Live worker records plus the most recent terminal ones, in creation
    /// order.
    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn worker(&self, id: &WorkerId) -> Option<&Worker> {
        self.workers.iter().find(|w| &w.id == id)
    }

    pub fn live_count(&self) -> usize {
        self.workers.iter().filter(|w| w.is_live()).count()
    }

    /// Change the target pool size; applied by the next reconcile.
    pub fn set_desired_count(&mut self, desired_count: u32) -> Result<(), FleetError> {
        self.spec.set_desired_count(desired_count)?;
        info!(desired_count, "Desired worker count updated");
        Ok(())
    }

    /// Worker counts per lifecycle state.
    pub fn status(&self) -> FleetStatus {
        let mut status = FleetStatus {
            desired: self.spec.desired_count(),
            max: self.spec.max_count(),
            ..FleetStatus::default()
        };
        for worker in &self.workers {
            match worker.state {
                LifecycleState::Provisioning => status.provisioning += 1,
                LifecycleState::Bootstrapping => status.bootstrapping += 1,
                LifecycleState::Running => status.running += 1,
                LifecycleState::Terminated => status.terminated += 1,
                LifecycleState::Failed => status.failed += 1,
            }
        }
        status
    }

    /// The oldest running worker with a known address.
    pub fn entry_point(&self) -> Option<&Worker> {
        self.workers
            .iter()
            .filter(|w| w.state == LifecycleState::Running && w.address().is_some())
            .min_by_key(|w| (w.created_at, w.ordinal))
    }

    /// Addresses of the live workers, for the inventory file.
    pub fn inventory(&self) -> Inventory {
        Inventory::from_workers(&self.workers)
    }

    /// Bring the live worker count to `desired_count`.
    ///
    /// Missing workers are launched concurrently; a rejected launch fails only
    /// its own worker and is retried by the next pass. Excess workers are
    /// terminated newest first.
    pub async fn reconcile(&mut self) -> Result<ReconcileReport, FleetError> {
        let live = self.live_count();
        let desired = self.spec.desired_count() as usize;
        let mut report = ReconcileReport::default();

        if live < desired {
            self.scale_up(desired - live, &mut report).await?;
        } else if live > desired {
            self.scale_down(live - desired, &mut report).await;
        } else {
            debug!(live, desired, "Fleet at desired size");
        }

        self.prune_terminal();
        Ok(report)
    }

    async fn ensure_policy(&mut self) -> Result<PolicyHandle, FleetError> {
        if let Some(policy) = &self.policy {
            return Ok(policy.clone());
        }
        let policy = self
            .provider
            .ensure_network_policy(self.spec.name_prefix(), &self.template)
            .await?;
        info!(policy = %policy.as_str(), "Network policy ready");
        self.policy = Some(policy.clone());
        Ok(policy)
    }

    async fn scale_up(
        &mut self,
        count: usize,
        report: &mut ReconcileReport,
    ) -> Result<(), FleetError> {
        let policy = self.ensure_policy().await?;

        let mut requests = Vec::with_capacity(count);
        for _ in 0..count {
            let ordinal = self.next_ordinal;
            self.next_ordinal = self.next_ordinal.saturating_add(1);

            let worker = Worker::new(ordinal, self.spec.worker_name(ordinal));
            requests.push(LaunchRequest {
                worker_id: worker.id.clone(),
                name: worker.name.clone(),
                fleet: self.spec.name_prefix().to_string(),
                template: Arc::clone(&self.template),
                payload: Arc::clone(&self.payload),
                policy: policy.clone(),
            });
            self.workers.push(worker);
        }

        info!(count, provider = self.provider.name(), "Launching workers");

        let provider = Arc::clone(&self.provider);
        let results = join_all(requests.iter().map(|r| provider.launch(r))).await;

        for (request, result) in requests.iter().zip(results) {
            let Some(worker) = self.workers.iter_mut().find(|w| w.id == request.worker_id) else {
                continue;
            };
            match result {
                Ok(allocation) => {
                    info!(
                        worker_id = %worker.id,
                        name = %worker.name,
                        instance = %allocation.instance,
                        "Worker allocated, bootstrapping"
                    );
                    worker.allocated(
                        allocation.instance,
                        allocation.public_address,
                        allocation.private_address,
                    )?;
                    report.created.push(worker.id.clone());
                }
                Err(err) => {
                    warn!(
                        worker_id = %worker.id,
                        name = %worker.name,
                        error = %err,
                        "Worker provisioning failed"
                    );
                    worker.fail(err.to_string())?;
                    report.failed.push(FailedLaunch {
                        worker_id: worker.id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    async fn scale_down(&mut self, count: usize, report: &mut ReconcileReport) {
        let mut candidates: Vec<&Worker> = self.workers.iter().filter(|w| w.is_live()).collect();
        candidates.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.ordinal.cmp(&a.ordinal))
        });
        let victims: Vec<WorkerId> = candidates
            .into_iter()
            .take(count)
            .map(|w| w.id.clone())
            .collect();

        info!(count, "Terminating excess workers");

        for id in victims {
            match self.terminate(&id).await {
                Ok(_) => report.terminated.push(id),
                Err(err) => {
                    warn!(worker_id = %id, error = %err, "Failed to terminate excess worker");
                    report.errors.push(format!("{id}: {err}"));
                }
            }
        }
    }

    /// Destroy a worker's compute and mark it terminated.
    ///
    /// Terminating a worker that is already terminated or failed changes
    /// nothing and is not an error.
    pub async fn terminate(&mut self, id: &WorkerId) -> Result<TerminateOutcome, FleetError> {
        let worker = self
            .workers
            .iter_mut()
            .find(|w| &w.id == id)
            .ok_or_else(|| FleetError::WorkerNotFound(id.clone()))?;

        if worker.state.is_terminal() {
            debug!(worker_id = %id, state = %worker.state, "Worker already terminal");
            return Ok(TerminateOutcome::AlreadyTerminal);
        }

        if let Some(instance) = &worker.instance {
            match self.provider.destroy(instance).await {
                Ok(()) | Err(ProviderError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        worker.terminate()?;
        info!(worker_id = %id, name = %worker.name, "Worker terminated");
        Ok(TerminateOutcome::Terminated)
    }

    /// Terminate every live worker (end of the test run).
    pub async fn teardown(&mut self) -> ReconcileReport {
        let ids: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|w| w.is_live())
            .map(|w| w.id.clone())
            .collect();
        let mut report = ReconcileReport::default();

        info!(count = ids.len(), "Tearing down fleet");

        for id in ids {
            match self.terminate(&id).await {
                Ok(_) => report.terminated.push(id),
                Err(err) => {
                    warn!(worker_id = %id, error = %err, "Failed to terminate worker");
                    report.errors.push(format!("{id}: {err}"));
                }
            }
        }
        self.prune_terminal();
        report
    }

    /// Fold provider state and health probes into the worker records.
    ///
    /// - instance gone at the provider: `Terminated`, leftovers released (the
    ///   next reconcile replaces it)
    /// - bootstrapping and healthy: `Running`
    /// - bootstrapping past the bootstrap timeout: `Failed`, compute released
    /// - running and unhealthy `unhealthy_threshold` times in a row: `Failed`,
    ///   compute released
    pub async fn observe(
        &mut self,
        probe: &dyn HealthProbe,
    ) -> Result<ObservationReport, FleetError> {
        let targets: Vec<(usize, InstanceId, Option<IpAddr>)> = self
            .workers
            .iter()
            .enumerate()
            .filter(|(_, w)| {
                matches!(
                    w.state,
                    LifecycleState::Bootstrapping | LifecycleState::Running
                )
            })
            .filter_map(|(i, w)| w.instance.clone().map(|inst| (i, inst, w.address())))
            .collect();

        let provider = Arc::clone(&self.provider);
        let checks = targets.iter().map(|(_, instance, address)| {
            let provider = &provider;
            async move {
                let status = provider.describe(instance).await;
                let healthy = match (&status, address) {
                    (Ok(InstanceStatus::Running), Some(addr)) => probe.probe(*addr).await,
                    _ => false,
                };
                (status, healthy)
            }
        });
        let results = join_all(checks).await;

        let now = Utc::now();
        let mut report = ObservationReport::default();
        let mut release = Vec::new();

        for ((idx, instance, _), (status, healthy)) in targets.into_iter().zip(results) {
            let worker = &mut self.workers[idx];

            match status {
                Err(err) => {
                    warn!(worker_id = %worker.id, error = %err, "Could not describe instance");
                    continue;
                }
                Ok(status) if status.is_gone() => {
                    warn!(
                        worker_id = %worker.id,
                        instance = %instance,
                        "Instance terminated outside the controller"
                    );
                    worker.terminate()?;
                    report.gone.push(worker.id.clone());
                    release.push(instance);
                    continue;
                }
                Ok(_) => {}
            }

            if healthy {
                if worker.state == LifecycleState::Bootstrapping {
                    worker.running()?;
                    info!(worker_id = %worker.id, name = %worker.name, "Worker running");
                    report.running.push(worker.id.clone());
                } else {
                    worker.consecutive_probe_failures = 0;
                }
                continue;
            }

            let reason = match worker.state {
                LifecycleState::Bootstrapping => {
                    let elapsed = (now - worker.state_changed_at).to_std().unwrap_or_default();
                    match self.health.bootstrap_timeout {
                        Some(timeout) if elapsed >= timeout => Some(format!(
                            "bootstrap did not complete within {}s",
                            timeout.as_secs()
                        )),
                        _ => None,
                    }
                }
                LifecycleState::Running => {
                    worker.consecutive_probe_failures += 1;
                    debug!(
                        worker_id = %worker.id,
                        failures = worker.consecutive_probe_failures,
                        "Health probe failed"
                    );
                    (worker.consecutive_probe_failures >= self.health.unhealthy_threshold).then(
                        || {
                            format!(
                                "health check failed {} times in a row",
                                worker.consecutive_probe_failures
                            )
                        },
                    )
                }
                _ => None,
            };

            if let Some(reason) = reason {
                warn!(worker_id = %worker.id, name = %worker.name, reason = %reason, "Worker failed");
                worker.fail(reason)?;
                report.failed.push(worker.id.clone());
                release.push(instance);
            }
        }

        for instance in release {
            match self.provider.destroy(&instance).await {
                Ok(()) | Err(ProviderError::NotFound(_)) => {}
                Err(err) => {
                    warn!(instance = %instance, error = %err, "Failed to release instance");
                }
            }
        }

        self.prune_terminal();
        Ok(report)
    }

    /// Drop the oldest terminal records beyond the retention limit.
    fn prune_terminal(&mut self) {
        let mut terminal: Vec<&Worker> =
            self.workers.iter().filter(|w| w.state.is_terminal()).collect();
        let excess = terminal.len().saturating_sub(self.retained_terminal);
        if excess == 0 {
            return;
        }

        terminal.sort_by_key(|w| (w.state_changed_at, w.ordinal));
        let stale: HashSet<WorkerId> = terminal
            .into_iter()
            .take(excess)
            .map(|w| w.id.clone())
            .collect();
        self.workers.retain(|w| !stale.contains(&w.id));
        debug!(pruned = excess, "Dropped old terminal worker records");
    }

    /// Import instances the provider already runs for this fleet, e.g. after
    /// a control plane restart. Returns how many were adopted.
    pub async fn adopt_existing(&mut self) -> Result<usize, FleetError> {
        let found = self.provider.list_fleet(self.spec.name_prefix()).await?;
        let prefix = format!("{}-", self.spec.name_prefix());
        let mut adopted = 0;

        for instance in found {
            let known = self
                .workers
                .iter()
                .any(|w| w.instance.as_ref() == Some(&instance.instance));
            if known || instance.status.is_gone() {
                continue;
            }

            let ordinal = instance
                .name
                .strip_prefix(&prefix)
                .and_then(|n| n.parse::<u32>().ok())
                .unwrap_or(self.next_ordinal);
            self.next_ordinal = self.next_ordinal.max(ordinal.saturating_add(1));

            let mut worker = Worker::new(ordinal, self.spec.worker_name(ordinal));
            if let Some(id) = instance.worker_id {
                worker.id = id;
            }
            if let Some(created_at) = instance.created_at {
                worker = worker.with_created_at(created_at);
            }
            worker.allocated(
                instance.instance,
                instance.public_address,
                instance.private_address,
            )?;

            info!(worker_id = %worker.id, name = %worker.name, "Adopted existing instance");
            self.workers.push(worker);
            adopted += 1;
        }

        Ok(adopted)
    }
}
