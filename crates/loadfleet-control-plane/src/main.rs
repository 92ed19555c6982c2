//! LoadFleet Control Plane Daemon

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use loadfleet_control_plane::{
    http, reconciler, AppState, ComputeProvider, Config, DockerProvider, FleetController,
    HealthProbe, ProviderKind, SimulatedProvider, TcpProbe,
};

/// LoadFleet control plane: keeps a load-test worker pool at its desired size.
#[derive(Parser, Debug)]
#[command(name = "loadfleet-control-plane", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "loadfleet.toml")]
    config: PathBuf,

    /// Override the HTTP bind address from the config file
    #[arg(long)]
    http_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load and validate config before anything is created
    let config = Config::from_file(&args.config)?;
    let spec = config.pool_spec()?;
    let http_addr: SocketAddr = args
        .http_addr
        .as_deref()
        .unwrap_or(&config.control_plane.http_bind_addr)
        .parse()?;

    let (provider, probe) = build_backend(&config)?;

    info!(
        provider = provider.name(),
        fleet = %spec.name_prefix(),
        desired_count = spec.desired_count(),
        max_count = spec.max_count(),
        instance_class = %spec.template().instance_class(),
        "Starting LoadFleet control plane"
    );

    let mut controller =
        FleetController::new(spec, provider).with_health(config.health_settings());
    info!(digest = %controller.payload().digest(), "Bootstrap payload rendered");

    if config.control_plane.adopt_existing {
        match controller.adopt_existing().await {
            Ok(0) => {}
            Ok(adopted) => info!(adopted, "Adopted workers from a previous run"),
            Err(e) => warn!(error = %e, "Could not list existing workers"),
        }
    }

    let state = match config.control_plane.inventory_path.clone() {
        Some(path) => AppState::with_inventory(controller, probe, path),
        None => AppState::new(controller, probe),
    };

    // Background reconciler
    let reconciler = tokio::spawn(reconciler::run_loop(
        state.clone(),
        config.reconcile_interval(),
    ));

    // HTTP API
    let http_router = http::create_router(state.clone());
    let http_listener = TcpListener::bind(http_addr).await?;
    let http_server = axum::serve(http_listener, http_router);

    info!("HTTP server listening on {}", http_addr);

    tokio::select! {
        result = http_server => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    reconciler.abort();

    if config.control_plane.teardown_on_shutdown {
        let report = state.controller.lock().await.teardown().await;
        info!(
            terminated = report.terminated.len(),
            errors = report.errors.len(),
            "Fleet torn down"
        );
    }

    info!("LoadFleet control plane stopped");
    Ok(())
}

/// Pick the compute backend and the matching health probe.
fn build_backend(
    config: &Config,
) -> Result<(Arc<dyn ComputeProvider>, Arc<dyn HealthProbe>), Box<dyn std::error::Error>> {
    match config.provider {
        ProviderKind::Simulated => {
            let provider = Arc::new(
                SimulatedProvider::new()
                    .with_boot_delay(Duration::from_secs(config.simulated.boot_delay_secs)),
            );
            // The simulated backend answers probes itself.
            let compute: Arc<dyn ComputeProvider> = provider.clone();
            let probe: Arc<dyn HealthProbe> = provider;
            Ok((compute, probe))
        }
        ProviderKind::Docker => {
            let compute: Arc<dyn ComputeProvider> = Arc::new(DockerProvider::connect()?);
            let probe: Arc<dyn HealthProbe> = Arc::new(TcpProbe::new(
                config.health.probe_port,
                config.probe_timeout(),
            ));
            Ok((compute, probe))
        }
    }
}
