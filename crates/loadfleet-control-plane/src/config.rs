//! Control plane configuration.
//!
//! Loaded from a TOML file (default: `loadfleet.toml`). Only `[instance]` is
//! required; every other section falls back to the reference deployment.
//! Nothing here is validated by deserialization alone: call
//! [`Config::pool_spec`] to get a checked [`WorkerPoolSpec`] before creating
//! anything.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use loadfleet_core::{
    BootstrapSequence, Cidr, ConfigurationError, CredentialRef, ImageId, InstanceTemplate,
    NetworkPolicy, Placement, WorkerPoolSpec, WorkerSource, DEFAULT_MAX_WORKERS,
};

use crate::controller::HealthSettings;

/// Which compute backend runs the workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// In-process backend for rehearsals.
    #[default]
    Simulated,
    /// Containers on the local Docker daemon.
    Docker,
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub fleet: FleetConfig,
    pub instance: InstanceConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub bootstrap: WorkerSource,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,
    #[serde(default)]
    pub simulated: SimulatedConfig,
}

/// Pool size and naming.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Workers are named `{name_prefix}-{n}`; also names the network policy.
    pub name_prefix: String,
    pub desired_count: u32,
    pub max_count: u32,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            name_prefix: "load-test-worker".to_string(),
            desired_count: 1,
            max_count: DEFAULT_MAX_WORKERS,
        }
    }
}

/// Launch parameters shared by every worker.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    pub network_id: String,
    pub subnet_id: String,
    pub credential: String,
    pub image: String,
    #[serde(default = "default_instance_class")]
    pub instance_class: String,
}

fn default_instance_class() -> String {
    "t3.2xlarge".to_string()
}

/// Ingress rules.
///
/// With no `rules`, the reference rule set is used, admitted from
/// `reference_source` (default `0.0.0.0/0`). With `rules`, only those apply,
/// plus the reference set if `reference_source` is given explicitly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub reference_source: Option<String>,
    pub rules: Vec<RuleConfig>,
}

/// One ingress rule as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub protocol: String,
    pub from: i64,
    pub to: i64,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "0.0.0.0/0".to_string()
}

/// Health probing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Worker port probed for liveness.
    pub probe_port: u16,
    pub probe_timeout_secs: u64,
    /// 0 disables the timeout.
    pub bootstrap_timeout_secs: u64,
    pub unhealthy_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_port: loadfleet_core::network::ports::WORKER_CONTROL,
            probe_timeout_secs: 2,
            bootstrap_timeout_secs: 15 * 60,
            unhealthy_threshold: 3,
        }
    }
}

/// Daemon behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// HTTP API bind address.
    pub http_bind_addr: String,
    /// Seconds between observe/reconcile cycles.
    pub reconcile_interval_secs: u64,
    /// Inventory JSON rewritten after every cycle.
    pub inventory_path: Option<PathBuf>,
    /// Adopt labelled instances left by a previous run on startup.
    pub adopt_existing: bool,
    /// Terminate every worker when the daemon shuts down.
    pub teardown_on_shutdown: bool,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            http_bind_addr: "127.0.0.1:8088".to_string(),
            reconcile_interval_secs: 15,
            inventory_path: None,
            adopt_existing: true,
            teardown_on_shutdown: false,
        }
    }
}

/// Settings for the simulated backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    /// Seconds before a simulated worker answers probes.
    pub boot_delay_secs: u64,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self { boot_delay_secs: 5 }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Build the fleet's network policy.
    pub fn network_policy(&self) -> Result<NetworkPolicy, ConfigurationError> {
        let explicit_source = self
            .network
            .reference_source
            .as_deref()
            .map(Cidr::from_str)
            .transpose()?;

        if self.network.rules.is_empty() {
            return Ok(NetworkPolicy::reference(
                explicit_source.unwrap_or(Cidr::ANY_V4),
            ));
        }

        let mut builder = NetworkPolicy::builder();
        if let Some(source) = explicit_source {
            for rule in NetworkPolicy::reference(source).rules() {
                builder = builder.allow_rule(*rule);
            }
        }
        for rule in &self.network.rules {
            builder = builder.allow(&rule.protocol, (rule.from, rule.to), &rule.source)?;
        }
        Ok(builder.build())
    }

    /// Build the instance template.
    pub fn template(&self) -> Result<InstanceTemplate, ConfigurationError> {
        Ok(InstanceTemplate::new(
            self.instance.instance_class.parse()?,
            ImageId::new(self.instance.image.clone())?,
            CredentialRef::new(self.instance.credential.clone())?,
            Placement::new(self.instance.network_id.clone(), self.instance.subnet_id.clone())?,
            self.network_policy()?,
            BootstrapSequence::canonical(&self.bootstrap)?,
        ))
    }

    /// Build and validate the pool spec.
    pub fn pool_spec(&self) -> Result<WorkerPoolSpec, ConfigurationError> {
        WorkerPoolSpec::new(
            self.fleet.name_prefix.clone(),
            self.fleet.desired_count,
            self.fleet.max_count,
            self.template()?,
        )
    }

    pub fn health_settings(&self) -> HealthSettings {
        HealthSettings {
            bootstrap_timeout: (self.health.bootstrap_timeout_secs > 0)
                .then(|| Duration::from_secs(self.health.bootstrap_timeout_secs)),
            unhealthy_threshold: self.health.unhealthy_threshold.max(1),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.health.probe_timeout_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.control_plane.reconcile_interval_secs.max(1))
    }
}

impl FromStr for Config {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadfleet_core::Protocol;

    const MINIMAL: &str = r#"
        [instance]
        network_id = "vpc-0a1b2c3d"
        subnet_id = "subnet-0e4f5a6b"
        credential = "load-test-key"
        image = "ami-0123456789abcdef0"
    "#;

    #[test]
    fn test_minimal_config_uses_reference_defaults() {
        let config: Config = MINIMAL.parse().unwrap();
        assert_eq!(config.provider, ProviderKind::Simulated);
        assert_eq!(config.fleet.max_count, 10);
        assert_eq!(config.health.probe_port, 5000);

        let spec = config.pool_spec().unwrap();
        assert_eq!(spec.desired_count(), 1);
        assert_eq!(spec.template().instance_class().as_str(), "t3.2xlarge");

        let policy = spec.template().network();
        assert_eq!(policy.rules().len(), 5);
        assert!(policy.permits(Protocol::Tcp, 22, "203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn test_missing_instance_section_fails_to_parse() {
        assert!("[fleet]\ndesired_count = 2\n".parse::<Config>().is_err());
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
            provider = "docker"

            [fleet]
            name_prefix = "jmeter-slave"
            desired_count = 4
            max_count = 8

            [instance]
            network_id = "vpc-1"
            subnet_id = "subnet-1"
            credential = "key-1"
            image = "ubuntu:22.04"
            instance_class = "t3.large"

            [network]
            rules = [
                { protocol = "tcp", from = 5000, to = 5000, source = "10.0.0.0/16" },
                { protocol = "tcp", from = 22, to = 22, source = "192.0.2.10/32" },
            ]

            [bootstrap]
            repository_url = "https://git.example.com/load/worker.git"
            checkout_dir = "worker"

            [health]
            bootstrap_timeout_secs = 0

            [control_plane]
            inventory_path = "instance_ips.json"
            teardown_on_shutdown = true
        "#;
        let config: Config = toml.parse().unwrap();
        assert_eq!(config.provider, ProviderKind::Docker);
        assert!(config.health_settings().bootstrap_timeout.is_none());
        assert!(config.control_plane.teardown_on_shutdown);

        let spec = config.pool_spec().unwrap();
        assert_eq!(spec.desired_count(), 4);

        let policy = spec.template().network();
        assert_eq!(policy.rules().len(), 2);
        assert!(!policy.permits(Protocol::Tcp, 22, "203.0.113.9".parse().unwrap()));
        assert!(policy.permits(Protocol::Tcp, 22, "192.0.2.10".parse().unwrap()));

        assert!(spec
            .template()
            .render()
            .as_str()
            .contains("'https://git.example.com/load/worker.git'"));
    }

    #[test]
    fn test_restricted_reference_source() {
        let toml = format!("{MINIMAL}\n[network]\nreference_source = \"192.0.2.0/24\"\n");
        let config: Config = toml.parse().unwrap();
        let policy = config.network_policy().unwrap();
        assert!(policy.permits(Protocol::Tcp, 8080, "192.0.2.44".parse().unwrap()));
        assert!(!policy.permits(Protocol::Tcp, 8080, "198.51.100.1".parse().unwrap()));
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        let toml = format!("{MINIMAL}\n[fleet]\ndesired_count = 11\n");
        let config: Config = toml.parse().unwrap();
        assert!(matches!(
            config.pool_spec(),
            Err(ConfigurationError::DesiredCountOutOfRange { requested: 11, max: 10 })
        ));

        let toml = format!(
            "{MINIMAL}\n[network]\nrules = [{{ protocol = \"tcp\", from = 90, to = 80 }}]\n"
        );
        let config: Config = toml.parse().unwrap();
        assert!(matches!(
            config.pool_spec(),
            Err(ConfigurationError::Policy(_))
        ));

        let toml = MINIMAL.replace("ami-0123456789abcdef0", "");
        let config: Config = toml.parse().unwrap();
        assert!(matches!(
            config.pool_spec(),
            Err(ConfigurationError::InvalidIdentifier { kind: "image", .. })
        ));
    }

    #[test]
    fn test_example_config_is_valid() {
        let config: Config = include_str!("../../../loadfleet.example.toml")
            .parse()
            .unwrap();
        let spec = config.pool_spec().unwrap();
        assert_eq!(spec.name_prefix(), "jmeter-slave");
        assert_eq!(spec.desired_count(), 3);
        assert_eq!(config.control_plane.reconcile_interval_secs, 15);
        assert_eq!(
            config.control_plane.inventory_path,
            Some(PathBuf::from("instance_ips.json"))
        );
    }

    #[test]
    fn test_from_file_reports_path() {
        let err = Config::from_file(Path::new("/nonexistent/loadfleet.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/loadfleet.toml"));
    }
}
