//! LoadFleet CLI - Command line interface for the LoadFleet control plane.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use loadfleet_admin_client::HttpClient;
use loadfleet_control_plane::Config;
use loadfleet_core::api::{ReconcileResponse, StatusResponse, WorkerResponse};
use loadfleet_core::{IngressRule, WorkerPoolSpec};

/// LoadFleet CLI - Load-test worker fleet management tool
#[derive(Parser)]
#[command(name = "loadfleet")]
#[command(about = "CLI for the LoadFleet control plane", long_about = None)]
struct Cli {
    /// Control plane address
    #[arg(short, long, default_value = "http://127.0.0.1:8088")]
    addr: String,

    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show pool counts and readiness
    Status,

    /// List every worker, terminated ones included
    Workers,

    /// Show the address load-test coordinators should connect to
    #[command(name = "entry-point")]
    EntryPoint,

    /// Run one observe + reconcile cycle now
    Reconcile,

    /// Set the desired number of workers
    Scale {
        /// New desired count
        count: u32,
    },

    /// Terminate one worker
    Terminate {
        /// Worker ID
        id: String,
    },

    /// Print the startup script a config file produces (no control plane needed)
    Render {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = "loadfleet.toml")]
        config: PathBuf,

        /// Output encoding
        #[arg(short, long, value_enum, default_value_t = Encoding::Script)]
        encoding: Encoding,
    },

    /// Check a config file without creating anything
    Validate {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = "loadfleet.toml")]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Encoding {
    /// The shell script itself
    Script,
    /// Base64, as passed in cloud user-data
    Base64,
    /// Hex SHA-256 digest only
    Digest,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render { config, encoding } => render(&config, encoding)?,
        Commands::Validate { config } => validate(&config)?,
        command => {
            let client = HttpClient::new(&cli.addr);
            remote(&client, command, cli.json).await?;
        }
    }

    Ok(())
}

async fn remote(
    client: &HttpClient,
    command: Commands,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Status => {
            let status = client.status().await?;
            if json {
                return print_json(&status);
            }
            print_status(&status);
        }
        Commands::Workers => {
            let workers = client.workers().await?;
            if json {
                return print_json(&workers);
            }
            print_workers(&workers);
        }
        Commands::EntryPoint => match client.entry_point().await? {
            Some(entry) if json => return print_json(&entry),
            Some(entry) => println!("{} ({}, {})", entry.address, entry.name, entry.worker_id),
            None => {
                eprintln!("No running worker yet");
                std::process::exit(1);
            }
        },
        Commands::Reconcile => {
            let report = client.reconcile().await?;
            if json {
                return print_json(&report);
            }
            print_reconcile(&report);
        }
        Commands::Scale { count } => {
            let pool = client.scale(count).await?;
            if json {
                return print_json(&pool);
            }
            println!(
                "Desired count set to {} (max {}); applied on the next cycle",
                pool.desired_count, pool.max_count
            );
        }
        Commands::Terminate { id } => {
            let result = client.terminate(&id).await?;
            if json {
                return print_json(&result);
            }
            if result.already_terminal {
                println!("Worker {} was already terminated", result.worker_id);
            } else {
                println!("Worker {} terminated", result.worker_id);
            }
        }
        Commands::Render { .. } | Commands::Validate { .. } => {}
    }

    Ok(())
}

fn load_spec(path: &Path) -> Result<(Config, WorkerPoolSpec), Box<dyn std::error::Error>> {
    let config = Config::from_file(path)?;
    let spec = config.pool_spec()?;
    Ok((config, spec))
}

fn render(path: &Path, encoding: Encoding) -> Result<(), Box<dyn std::error::Error>> {
    let (_, spec) = load_spec(path)?;
    let payload = spec.template().render();

    match encoding {
        Encoding::Script => print!("{payload}"),
        Encoding::Base64 => println!("{}", payload.to_base64()),
        Encoding::Digest => println!("{}", payload.digest()),
    }
    Ok(())
}

fn validate(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (config, spec) = load_spec(path)?;
    let template = spec.template();

    println!("Configuration OK: {}", path.display());
    println!("  Provider:   {:?}", config.provider);
    println!("  Fleet:      {}", spec.name_prefix());
    println!(
        "  Workers:    {} desired, {} max",
        spec.desired_count(),
        spec.max_count()
    );
    println!(
        "  Class:      {} ({} vCPU, {} MiB)",
        template.instance_class(),
        template.instance_class().vcpus(),
        template.instance_class().memory_mib()
    );
    println!("  Image:      {}", template.image());
    println!(
        "  Placement:  {}/{}",
        template.placement().network_id(),
        template.placement().subnet_id()
    );
    println!("  Ingress:");
    for rule in template.network().rules() {
        println!("    - {}", format_rule(rule));
    }
    println!("  Bootstrap:  {} steps", template.bootstrap().steps().len());
    println!("  Digest:     {}", template.render().digest());
    Ok(())
}

fn format_rule(rule: &IngressRule) -> String {
    format!("{} {:<11} from {}", rule.protocol, rule.ports, rule.source)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_status(status: &StatusResponse) {
    let ready = if status.ready { "READY" } else { "NOT READY" };
    println!("Fleet {} ({}): {}", status.name_prefix, status.provider, ready);
    println!("  Desired:       {} (max {})", status.desired, status.max);
    println!("  Live:          {}", status.live);
    println!("  Provisioning:  {}", status.provisioning);
    println!("  Bootstrapping: {}", status.bootstrapping);
    println!("  Running:       {}", status.running);
    println!("  Failed:        {}", status.failed);
    println!("  Terminated:    {}", status.terminated);
}

fn print_workers(workers: &[WorkerResponse]) {
    println!("Workers ({}):", workers.len());
    println!(
        "{:<36}  {:<24}  {:<13}  {:<15}  {:<15}  {}",
        "ID", "NAME", "STATE", "PUBLIC", "PRIVATE", "CREATED"
    );
    println!("{}", "-".repeat(120));

    for worker in workers {
        println!(
            "{:<36}  {:<24}  {:<13}  {:<15}  {:<15}  {}",
            worker.worker_id,
            worker.name,
            worker.state.as_str().to_uppercase(),
            format_address(worker.public_address),
            format_address(worker.private_address),
            format_timestamp(worker.created_at)
        );
        if let Some(reason) = &worker.failure {
            println!("    reason: {reason}");
        }
    }
}

fn print_reconcile(report: &ReconcileResponse) {
    println!("Reconcile cycle:");
    println!("  Now running:  {}", report.now_running.len());
    println!("  Now failed:   {}", report.now_failed.len());
    println!("  Gone:         {}", report.gone.len());
    println!("  Created:      {}", report.created.len());
    println!("  Terminated:   {}", report.terminated.len());
    for failure in &report.failed {
        println!("  Launch failed: {} ({})", failure.worker_id, failure.reason);
    }
    for error in &report.errors {
        println!("  Error: {error}");
    }
}

fn format_address(address: Option<std::net::IpAddr>) -> String {
    address
        .map(|a| a.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}
