//! Fleet controller scenarios against the simulated backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use loadfleet_control_plane::controller::DEFAULT_RETAINED_TERMINAL;
use loadfleet_control_plane::{
    FleetController, FleetError, HealthSettings, Inventory, ProviderError, SimulatedProvider,
    TerminateOutcome,
};
use loadfleet_core::{
    BootstrapSequence, Cidr, ConfigurationError, CredentialRef, ImageId, InstanceClass,
    InstanceTemplate, LifecycleState, NetworkPolicy, Placement, Protocol, WorkerId,
    WorkerPoolSpec, WorkerSource,
};

fn template_with(network: NetworkPolicy) -> InstanceTemplate {
    InstanceTemplate::new(
        InstanceClass::default(),
        ImageId::new("ami-0123456789abcdef0").unwrap(),
        CredentialRef::new("load-test-key").unwrap(),
        Placement::new("vpc-0a1b2c3d", "subnet-0e4f5a6b").unwrap(),
        network,
        BootstrapSequence::canonical(&WorkerSource::default()).unwrap(),
    )
}

fn spec(desired: u32) -> WorkerPoolSpec {
    WorkerPoolSpec::new(
        "load-test-worker",
        desired,
        10,
        template_with(NetworkPolicy::reference(Cidr::ANY_V4)),
    )
    .unwrap()
}

fn fleet(desired: u32) -> (Arc<SimulatedProvider>, FleetController) {
    let provider = Arc::new(SimulatedProvider::new());
    let controller = FleetController::new(spec(desired), provider.clone());
    (provider, controller)
}

fn ids_in(controller: &FleetController, state: LifecycleState) -> Vec<WorkerId> {
    controller
        .workers()
        .iter()
        .filter(|w| w.state == state)
        .map(|w| w.id.clone())
        .collect()
}

#[tokio::test]
async fn test_reconcile_reaches_every_desired_count() {
    for desired in 1..=10 {
        let (provider, mut controller) = fleet(desired);

        let report = controller.reconcile().await.unwrap();

        assert_eq!(report.created.len(), desired as usize);
        assert!(report.failed.is_empty());
        assert_eq!(controller.live_count(), desired as usize);
        assert_eq!(provider.active_instances().await, desired as usize);
        assert!(controller
            .workers()
            .iter()
            .all(|w| w.state == LifecycleState::Bootstrapping && w.instance.is_some()));
    }
}

#[tokio::test]
async fn test_reconcile_at_desired_size_is_noop() {
    let (provider, mut controller) = fleet(3);
    controller.reconcile().await.unwrap();

    let report = controller.reconcile().await.unwrap();

    assert!(report.is_noop());
    assert_eq!(provider.launch_attempts().await, 3);
}

#[tokio::test]
async fn test_workers_named_by_ordinal() {
    let (_provider, mut controller) = fleet(3);
    controller.reconcile().await.unwrap();

    let names: Vec<&str> = controller.workers().iter().map(|w| w.name.as_str()).collect();
    assert_eq!(
        names,
        ["load-test-worker-1", "load-test-worker-2", "load-test-worker-3"]
    );
}

#[tokio::test]
async fn test_desired_count_above_max_rejected_before_provider_call() {
    let err = WorkerPoolSpec::new(
        "load-test-worker",
        11,
        10,
        template_with(NetworkPolicy::reference(Cidr::ANY_V4)),
    )
    .unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::DesiredCountOutOfRange {
            requested: 11,
            max: 10
        }
    );

    let (provider, mut controller) = fleet(10);
    assert!(matches!(
        controller.set_desired_count(11),
        Err(FleetError::Configuration(_))
    ));
    assert!(matches!(
        controller.set_desired_count(0),
        Err(FleetError::Configuration(_))
    ));
    assert_eq!(controller.spec().desired_count(), 10);
    assert_eq!(provider.launch_attempts().await, 0);

    controller.reconcile().await.unwrap();
    assert_eq!(controller.live_count(), 10);
}

#[tokio::test]
async fn test_single_launch_failure_is_isolated_and_retried() {
    let (provider, mut controller) = fleet(3);
    provider
        .fail_next_launch(ProviderError::QuotaExceeded("vcpu limit".into()))
        .await;

    let report = controller.reconcile().await.unwrap();

    assert_eq!(report.created.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].reason.contains("vcpu limit"));
    assert_eq!(controller.live_count(), 2);
    assert_eq!(ids_in(&controller, LifecycleState::Failed).len(), 1);

    let failed = controller.worker(&report.failed[0].worker_id).unwrap();
    assert!(failed.failure.as_deref().unwrap().contains("Quota exceeded"));
    assert!(failed.instance.is_none());

    let report = controller.reconcile().await.unwrap();
    assert_eq!(report.created.len(), 1);
    assert!(report.failed.is_empty());
    assert_eq!(controller.live_count(), 3);
    assert_eq!(provider.active_instances().await, 3);
}

#[tokio::test]
async fn test_quota_limits_fleet_without_aborting_pass() {
    let provider = Arc::new(SimulatedProvider::new().with_quota(2));
    let mut controller = FleetController::new(spec(4), provider.clone());

    let report = controller.reconcile().await.unwrap();

    assert_eq!(report.created.len(), 2);
    assert_eq!(report.failed.len(), 2);
    assert_eq!(controller.status().failed, 2);
    assert_eq!(provider.active_instances().await, 2);
}

#[tokio::test]
async fn test_failed_launch_records_are_bounded() {
    let provider = Arc::new(SimulatedProvider::new().with_quota(0));
    let mut controller = FleetController::new(spec(3), provider.clone());

    for _ in 0..1000 {
        controller.reconcile().await.unwrap();
    }

    assert_eq!(provider.launch_attempts().await, 3000);
    assert_eq!(controller.workers().len(), DEFAULT_RETAINED_TERMINAL);
    assert_eq!(
        controller.status().failed as usize,
        DEFAULT_RETAINED_TERMINAL
    );
}

#[tokio::test]
async fn test_pruning_keeps_live_and_newest_terminal_workers() {
    let (provider, controller) = fleet(2);
    let mut controller = controller.with_retained_terminal(2);
    controller.reconcile().await.unwrap();

    for _ in 0..3 {
        let live = controller.workers().iter().find(|w| w.is_live()).unwrap();
        let id = live.id.clone();
        controller.terminate(&id).await.unwrap();
        controller.reconcile().await.unwrap();
    }

    assert_eq!(controller.live_count(), 2);
    assert_eq!(provider.active_instances().await, 2);
    let terminal: Vec<u32> = controller
        .workers()
        .iter()
        .filter(|w| w.state.is_terminal())
        .map(|w| w.ordinal)
        .collect();
    assert_eq!(terminal, [2, 3]);
    assert_eq!(controller.workers().len(), 4);
}

#[tokio::test]
async fn test_scale_down_terminates_newest_first() {
    let (provider, mut controller) = fleet(5);
    controller.reconcile().await.unwrap();

    controller.set_desired_count(2).unwrap();
    let report = controller.reconcile().await.unwrap();

    let mut ordinals: Vec<u32> = report
        .terminated
        .iter()
        .map(|id| controller.worker(id).unwrap().ordinal)
        .collect();
    ordinals.sort_unstable();
    assert_eq!(ordinals, [3, 4, 5]);
    assert_eq!(controller.live_count(), 2);
    assert_eq!(provider.active_instances().await, 2);

    let survivors: Vec<u32> = controller
        .workers()
        .iter()
        .filter(|w| w.is_live())
        .map(|w| w.ordinal)
        .collect();
    assert_eq!(survivors, [1, 2]);
}

#[tokio::test]
async fn test_scale_down_orders_by_creation_time_not_ordinal() {
    let provider = Arc::new(SimulatedProvider::new());
    let now = Utc::now();
    provider
        .seed("load-test-worker", "load-test-worker-1", now)
        .await;
    provider
        .seed(
            "load-test-worker",
            "load-test-worker-2",
            now - chrono::Duration::hours(1),
        )
        .await;

    let mut controller = FleetController::new(spec(1), provider.clone());
    assert_eq!(controller.adopt_existing().await.unwrap(), 2);

    let report = controller.reconcile().await.unwrap();

    assert_eq!(report.terminated.len(), 1);
    let victim = controller.worker(&report.terminated[0]).unwrap();
    assert_eq!(victim.ordinal, 1);
    let survivor: Vec<u32> = controller
        .workers()
        .iter()
        .filter(|w| w.is_live())
        .map(|w| w.ordinal)
        .collect();
    assert_eq!(survivor, [2]);
}

#[tokio::test]
async fn test_scale_up_continues_ordinals() {
    let (_provider, mut controller) = fleet(2);
    controller.reconcile().await.unwrap();
    controller.set_desired_count(1).unwrap();
    controller.reconcile().await.unwrap();

    controller.set_desired_count(3).unwrap();
    let report = controller.reconcile().await.unwrap();

    let mut ordinals: Vec<u32> = report
        .created
        .iter()
        .map(|id| controller.worker(id).unwrap().ordinal)
        .collect();
    ordinals.sort_unstable();
    assert_eq!(ordinals, [3, 4]);
}

#[tokio::test]
async fn test_double_terminate_is_noop() {
    let (provider, mut controller) = fleet(2);
    let report = controller.reconcile().await.unwrap();
    let id = report.created[0].clone();

    let first = controller.terminate(&id).await.unwrap();
    let second = controller.terminate(&id).await.unwrap();

    assert_eq!(first, TerminateOutcome::Terminated);
    assert_eq!(second, TerminateOutcome::AlreadyTerminal);
    assert_eq!(controller.worker(&id).unwrap().state, LifecycleState::Terminated);
    assert_eq!(controller.status().terminated, 1);
    assert_eq!(provider.active_instances().await, 1);
}

#[tokio::test]
async fn test_terminate_failed_worker_is_noop() {
    let (provider, mut controller) = fleet(1);
    provider
        .fail_next_launch(ProviderError::InsufficientCapacity("az-1a".into()))
        .await;
    let report = controller.reconcile().await.unwrap();
    let id = report.failed[0].worker_id.clone();

    let outcome = controller.terminate(&id).await.unwrap();

    assert_eq!(outcome, TerminateOutcome::AlreadyTerminal);
    assert_eq!(controller.worker(&id).unwrap().state, LifecycleState::Failed);
}

#[tokio::test]
async fn test_terminate_unknown_worker() {
    let (_provider, mut controller) = fleet(1);
    let err = controller
        .terminate(&WorkerId::new("no-such-worker"))
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::WorkerNotFound(_)));
}

#[tokio::test]
async fn test_terminate_mid_bootstrap_releases_compute() {
    let (provider, mut controller) = fleet(1);
    let report = controller.reconcile().await.unwrap();
    let id = report.created[0].clone();
    assert_eq!(
        controller.worker(&id).unwrap().state,
        LifecycleState::Bootstrapping
    );

    controller.terminate(&id).await.unwrap();

    assert_eq!(provider.active_instances().await, 0);
}

#[tokio::test]
async fn test_network_policy_created_once() {
    let (provider, mut controller) = fleet(2);
    controller.reconcile().await.unwrap();
    controller.set_desired_count(4).unwrap();
    controller.reconcile().await.unwrap();

    assert_eq!(provider.policy_creations().await, 1);

    // A second controller for the same fleet reuses the existing policy.
    let mut other = FleetController::new(spec(1), provider.clone());
    other.reconcile().await.unwrap();
    assert_eq!(provider.policy_creations().await, 1);
}

#[tokio::test]
async fn test_policy_failure_aborts_pass_before_launch() {
    struct NoPolicy(SimulatedProvider);

    #[async_trait::async_trait]
    impl loadfleet_control_plane::ComputeProvider for NoPolicy {
        fn name(&self) -> &'static str {
            "no-policy"
        }
        async fn ensure_network_policy(
            &self,
            _name: &str,
            _template: &InstanceTemplate,
        ) -> Result<loadfleet_control_plane::provider::PolicyHandle, ProviderError> {
            Err(ProviderError::PermissionDenied("ec2:CreateSecurityGroup".into()))
        }
        async fn launch(
            &self,
            request: &loadfleet_control_plane::provider::LaunchRequest,
        ) -> Result<loadfleet_control_plane::provider::Allocation, ProviderError> {
            self.0.launch(request).await
        }
        async fn describe(
            &self,
            instance: &loadfleet_core::InstanceId,
        ) -> Result<loadfleet_control_plane::provider::InstanceStatus, ProviderError> {
            self.0.describe(instance).await
        }
        async fn destroy(&self, instance: &loadfleet_core::InstanceId) -> Result<(), ProviderError> {
            self.0.destroy(instance).await
        }
        async fn list_fleet(
            &self,
            fleet: &str,
        ) -> Result<Vec<loadfleet_control_plane::provider::DiscoveredInstance>, ProviderError>
        {
            self.0.list_fleet(fleet).await
        }
    }

    let provider = Arc::new(NoPolicy(SimulatedProvider::new()));
    let mut controller = FleetController::new(spec(2), provider.clone());

    let err = controller.reconcile().await.unwrap_err();

    assert!(matches!(
        err,
        FleetError::Provisioning(ProviderError::PermissionDenied(_))
    ));
    assert!(controller.workers().is_empty());
    assert_eq!(provider.0.launch_attempts().await, 0);
}

#[tokio::test]
async fn test_observe_promotes_healthy_workers() {
    let (provider, mut controller) = fleet(2);
    controller.reconcile().await.unwrap();

    let report = controller.observe(provider.as_ref()).await.unwrap();

    assert_eq!(report.running.len(), 2);
    assert_eq!(controller.status().running, 2);
    assert!(controller.status().is_ready());
}

#[tokio::test]
async fn test_slow_boot_stays_bootstrapping() {
    let provider = Arc::new(SimulatedProvider::new().with_boot_delay(Duration::from_secs(3600)));
    let mut controller = FleetController::new(spec(1), provider.clone());
    controller.reconcile().await.unwrap();

    let report = controller.observe(provider.as_ref()).await.unwrap();

    assert!(report.running.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(controller.status().bootstrapping, 1);
    assert!(!controller.status().is_ready());
}

#[tokio::test]
async fn test_broken_bootstrap_undetected_without_timeout() {
    let provider = Arc::new(SimulatedProvider::new());
    let mut controller = FleetController::new(spec(1), provider.clone()).with_health(
        HealthSettings {
            bootstrap_timeout: None,
            unhealthy_threshold: 3,
        },
    );
    controller.reconcile().await.unwrap();
    let instance = controller.workers()[0].instance.clone().unwrap();
    provider.break_bootstrap(&instance).await;

    for _ in 0..5 {
        let report = controller.observe(provider.as_ref()).await.unwrap();
        assert!(report.failed.is_empty());
    }

    assert_eq!(controller.workers()[0].state, LifecycleState::Bootstrapping);
    assert_eq!(controller.live_count(), 1);
    assert!(controller.reconcile().await.unwrap().is_noop());
}

#[tokio::test]
async fn test_broken_bootstrap_fails_after_timeout_and_is_replaced() {
    let provider = Arc::new(SimulatedProvider::new());
    let mut controller = FleetController::new(spec(1), provider.clone()).with_health(
        HealthSettings {
            bootstrap_timeout: Some(Duration::ZERO),
            unhealthy_threshold: 3,
        },
    );
    controller.reconcile().await.unwrap();
    let broken = controller.workers()[0].clone();
    provider
        .break_bootstrap(broken.instance.as_ref().unwrap())
        .await;

    let report = controller.observe(provider.as_ref()).await.unwrap();

    assert_eq!(report.failed, vec![broken.id.clone()]);
    let failed = controller.worker(&broken.id).unwrap();
    assert_eq!(failed.state, LifecycleState::Failed);
    assert!(failed.failure.as_deref().unwrap().contains("bootstrap"));
    assert_eq!(provider.active_instances().await, 0);

    let report = controller.reconcile().await.unwrap();
    assert_eq!(report.created.len(), 1);
    assert_eq!(controller.live_count(), 1);
}

#[tokio::test]
async fn test_healthy_worker_not_failed_by_zero_timeout() {
    let provider = Arc::new(SimulatedProvider::new());
    let mut controller = FleetController::new(spec(1), provider.clone()).with_health(
        HealthSettings {
            bootstrap_timeout: Some(Duration::ZERO),
            unhealthy_threshold: 3,
        },
    );
    controller.reconcile().await.unwrap();

    let report = controller.observe(provider.as_ref()).await.unwrap();

    assert_eq!(report.running.len(), 1);
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn test_running_worker_fails_after_consecutive_probe_failures() {
    let (provider, mut controller) = fleet(1);
    controller.reconcile().await.unwrap();
    controller.observe(provider.as_ref()).await.unwrap();
    let worker = controller.workers()[0].clone();
    assert_eq!(worker.state, LifecycleState::Running);

    provider
        .set_unhealthy(worker.instance.as_ref().unwrap(), true)
        .await;

    for _ in 0..2 {
        let report = controller.observe(provider.as_ref()).await.unwrap();
        assert!(report.failed.is_empty());
    }
    assert_eq!(controller.workers()[0].consecutive_probe_failures, 2);

    let report = controller.observe(provider.as_ref()).await.unwrap();
    assert_eq!(report.failed, vec![worker.id.clone()]);
    assert_eq!(controller.workers()[0].state, LifecycleState::Failed);
    assert_eq!(provider.active_instances().await, 0);
}

#[tokio::test]
async fn test_probe_failures_reset_on_recovery() {
    let (provider, mut controller) = fleet(1);
    controller.reconcile().await.unwrap();
    controller.observe(provider.as_ref()).await.unwrap();
    let instance = controller.workers()[0].instance.clone().unwrap();

    provider.set_unhealthy(&instance, true).await;
    controller.observe(provider.as_ref()).await.unwrap();
    controller.observe(provider.as_ref()).await.unwrap();
    provider.set_unhealthy(&instance, false).await;
    controller.observe(provider.as_ref()).await.unwrap();

    assert_eq!(controller.workers()[0].consecutive_probe_failures, 0);
    assert_eq!(controller.workers()[0].state, LifecycleState::Running);
}

#[tokio::test]
async fn test_externally_terminated_instance_is_replaced() {
    let (provider, mut controller) = fleet(3);
    controller.reconcile().await.unwrap();
    controller.observe(provider.as_ref()).await.unwrap();
    let victim = controller.workers()[1].clone();

    provider.kill(victim.instance.as_ref().unwrap()).await;
    let report = controller.observe(provider.as_ref()).await.unwrap();

    assert_eq!(report.gone, vec![victim.id.clone()]);
    assert_eq!(
        controller.worker(&victim.id).unwrap().state,
        LifecycleState::Terminated
    );
    assert_eq!(controller.live_count(), 2);

    let report = controller.reconcile().await.unwrap();
    assert_eq!(report.created.len(), 1);
    assert_eq!(controller.live_count(), 3);
    assert_eq!(provider.active_instances().await, 3);
}

#[tokio::test]
async fn test_externally_terminated_instance_is_released() {
    let (provider, mut controller) = fleet(2);
    controller.reconcile().await.unwrap();
    controller.observe(provider.as_ref()).await.unwrap();
    let victim = controller.workers()[0].clone();
    let instance = victim.instance.clone().unwrap();

    provider.kill(&instance).await;
    assert!(provider.destroyed().await.is_empty());

    let report = controller.observe(provider.as_ref()).await.unwrap();

    assert_eq!(report.gone, vec![victim.id]);
    assert_eq!(provider.destroyed().await, vec![instance]);
}

#[tokio::test]
async fn test_entry_point_is_oldest_running_worker() {
    let (provider, mut controller) = fleet(3);
    assert!(controller.entry_point().is_none());

    controller.reconcile().await.unwrap();
    assert!(controller.entry_point().is_none());

    controller.observe(provider.as_ref()).await.unwrap();
    let entry = controller.entry_point().unwrap();
    assert_eq!(entry.ordinal, 1);
    assert!(entry.public_address.is_some());
    assert_eq!(entry.address(), entry.public_address);

    let first = entry.id.clone();
    controller.terminate(&first).await.unwrap();
    assert_eq!(controller.entry_point().unwrap().ordinal, 2);
}

#[tokio::test]
async fn test_adopt_existing_prevents_double_provisioning() {
    let provider = Arc::new(SimulatedProvider::new());
    let mut first = FleetController::new(spec(3), provider.clone());
    first.reconcile().await.unwrap();
    let first_ids: Vec<WorkerId> = first.workers().iter().map(|w| w.id.clone()).collect();
    drop(first);

    let mut restarted = FleetController::new(spec(3), provider.clone());
    let adopted = restarted.adopt_existing().await.unwrap();

    assert_eq!(adopted, 3);
    assert_eq!(restarted.live_count(), 3);
    for id in &first_ids {
        assert_eq!(
            restarted.worker(id).unwrap().state,
            LifecycleState::Bootstrapping
        );
    }
    assert!(restarted.reconcile().await.unwrap().is_noop());
    assert_eq!(provider.launch_attempts().await, 3);

    // Adopting again finds nothing new.
    assert_eq!(restarted.adopt_existing().await.unwrap(), 0);

    restarted.set_desired_count(4).unwrap();
    let report = restarted.reconcile().await.unwrap();
    let added = restarted.worker(&report.created[0]).unwrap();
    assert_eq!(added.name, "load-test-worker-4");
}

#[tokio::test]
async fn test_adopt_skips_terminated_instances() {
    let provider = Arc::new(SimulatedProvider::new());
    let mut first = FleetController::new(spec(2), provider.clone());
    let report = first.reconcile().await.unwrap();
    first.terminate(&report.created[0]).await.unwrap();

    let mut restarted = FleetController::new(spec(2), provider.clone());
    assert_eq!(restarted.adopt_existing().await.unwrap(), 1);
}

#[tokio::test]
async fn test_adopt_highest_ordinal_does_not_overflow() {
    let provider = Arc::new(SimulatedProvider::new());
    let name = format!("load-test-worker-{}", u32::MAX);
    provider.seed("load-test-worker", &name, Utc::now()).await;

    let mut controller = FleetController::new(spec(2), provider.clone());
    assert_eq!(controller.adopt_existing().await.unwrap(), 1);
    assert_eq!(controller.workers()[0].ordinal, u32::MAX);

    let report = controller.reconcile().await.unwrap();
    assert_eq!(report.created.len(), 1);
    assert_eq!(controller.live_count(), 2);
}

#[tokio::test]
async fn test_teardown_terminates_every_live_worker() {
    let (provider, mut controller) = fleet(4);
    controller.reconcile().await.unwrap();
    controller.observe(provider.as_ref()).await.unwrap();

    let report = controller.teardown().await;

    assert_eq!(report.terminated.len(), 4);
    assert!(report.errors.is_empty());
    assert_eq!(controller.live_count(), 0);
    assert_eq!(controller.status().terminated, 4);
    assert_eq!(provider.active_instances().await, 0);
    assert!(controller.inventory().entries.is_empty());
}

#[tokio::test]
async fn test_inventory_file_lists_live_workers() {
    let (provider, mut controller) = fleet(2);
    controller.reconcile().await.unwrap();
    controller.observe(provider.as_ref()).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("instance_ips.json");
    controller.inventory().write_to(&path).unwrap();

    let read = Inventory::read_from(&path).unwrap();
    assert_eq!(read.entries.len(), 2);
    assert!(read.entries.iter().all(|e| e.state == LifecycleState::Running));

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw[0]["InstanceId"].as_str().unwrap().starts_with("sim-"));
    assert!(raw[0]["PublicIpAddress"].as_str().unwrap().starts_with("198.18."));
    assert!(raw[0]["PrivateIpAddress"].as_str().unwrap().starts_with("10.0."));
}

#[tokio::test]
async fn test_restricted_policy_is_carried_by_template() {
    let restricted = NetworkPolicy::builder()
        .allow("tcp", (5000, 5000), "10.0.0.0/16")
        .unwrap()
        .build();
    let spec = WorkerPoolSpec::new("restricted", 2, 10, template_with(restricted)).unwrap();
    let provider = Arc::new(SimulatedProvider::new());
    let mut controller = FleetController::new(spec, provider.clone());

    controller.reconcile().await.unwrap();

    let policy = controller.spec().template().network();
    assert!(policy.permits(Protocol::Tcp, 5000, "10.0.3.4".parse().unwrap()));
    assert!(!policy.permits(Protocol::Tcp, 5000, "203.0.113.1".parse().unwrap()));
    assert!(!policy.exposes(Protocol::Tcp, 22));
    assert_eq!(controller.live_count(), 2);

    let permissive = NetworkPolicy::reference(Cidr::ANY_V4);
    assert!(permissive.permits(Protocol::Tcp, 22, "203.0.113.1".parse().unwrap()));
}

#[tokio::test]
async fn test_every_worker_gets_identical_payload() {
    let (_provider, controller) = fleet(1);
    let again = spec(1).template().render();

    assert_eq!(controller.payload(), &again);
    assert_eq!(controller.payload().digest(), again.digest());
    assert!(controller.payload().as_str().starts_with("#!/bin/bash\nset -e\n"));
}
