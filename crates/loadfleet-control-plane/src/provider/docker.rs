//! Docker backend: each worker is a container on a dedicated bridge network.
//!
//! The bridge network stands in for the security group. Docker cannot filter
//! ingress by source, so only the ports the policy exposes are declared on
//! the container and source restrictions are logged, not enforced. The
//! bootstrap payload runs as the container command, so the image must ship
//! `bash` and `apt-get`.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions,
};
use bollard::models::{ContainerStateStatusEnum, HostConfig};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use bollard::Docker;
use chrono::{TimeZone, Utc};
use tracing::{debug, info, warn};

use loadfleet_core::{BootstrapPayload, InstanceId, InstanceTemplate, Protocol, WorkerId};

use super::{
    labels, Allocation, ComputeProvider, DiscoveredInstance, InstanceStatus, LaunchRequest,
    PolicyHandle,
};
use crate::error::ProviderError;

/// Ranges wider than this are not declared port by port.
const MAX_EXPOSED_RANGE: u32 = 64;

/// Compute provider backed by the local Docker daemon.
pub struct DockerProvider {
    docker: Docker,
}

impl DockerProvider {
    /// Connect using the platform's default socket.
    pub fn connect() -> Result<Self, ProviderError> {
        let docker = Docker::connect_with_local_defaults().map_err(map_error)?;
        Ok(Self { docker })
    }

    fn exposed_ports(template: &InstanceTemplate) -> HashMap<String, HashMap<(), ()>> {
        let mut exposed = HashMap::new();
        for rule in template.network().rules() {
            let proto = match rule.protocol {
                Protocol::Tcp => "tcp",
                Protocol::Udp => "udp",
                Protocol::Icmp => continue,
            };
            if rule.ports.port_count() > MAX_EXPOSED_RANGE {
                warn!(rule = %rule, "Port range too wide to expose on a container, skipping");
                continue;
            }
            for port in rule.ports.start()..=rule.ports.end() {
                exposed.insert(format!("{port}/{proto}"), HashMap::new());
            }
        }
        exposed
    }

    async fn start_and_inspect(
        &self,
        container: &str,
        network: &str,
    ) -> Result<Option<IpAddr>, ProviderError> {
        self.docker
            .start_container(container, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_error)?;

        let inspected = self
            .docker
            .inspect_container(container, None::<InspectContainerOptions>)
            .await
            .map_err(map_error)?;
        Ok(Self::container_address(
            inspected
                .network_settings
                .as_ref()
                .and_then(|n| n.networks.as_ref()),
            network,
        ))
    }

    /// Force-remove a container that never made it into the fleet.
    async fn discard(&self, container: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(err) = self.docker.remove_container(container, Some(options)).await {
            warn!(container = %container, error = %err, "Failed to remove half-launched container");
        }
    }

    fn container_address(
        networks: Option<&HashMap<String, bollard::models::EndpointSettings>>,
        network: &str,
    ) -> Option<IpAddr> {
        networks?
            .get(network)?
            .ip_address
            .as_deref()
            .filter(|ip| !ip.is_empty())?
            .parse()
            .ok()
    }
}

fn map_error(err: bollard::errors::Error) -> ProviderError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => match status_code {
            400 => ProviderError::InvalidTemplate(message),
            403 => ProviderError::PermissionDenied(message),
            404 => ProviderError::NotFound(message),
            _ => ProviderError::Backend(format!("{status_code}: {message}")),
        },
        other => ProviderError::Backend(other.to_string()),
    }
}

fn map_state(status: Option<ContainerStateStatusEnum>) -> InstanceStatus {
    match status {
        Some(ContainerStateStatusEnum::RUNNING) | Some(ContainerStateStatusEnum::RESTARTING) => {
            InstanceStatus::Running
        }
        Some(ContainerStateStatusEnum::EXITED)
        | Some(ContainerStateStatusEnum::DEAD)
        | Some(ContainerStateStatusEnum::REMOVING) => InstanceStatus::Terminated,
        _ => InstanceStatus::Pending,
    }
}

/// Container entry command. The payload detaches the worker, so the shell
/// waits on it afterwards; otherwise PID 1 exits and the container stops.
fn container_command(payload: &BootstrapPayload) -> Vec<String> {
    let script = format!("{}\nwait\n", payload.as_str().trim_end());
    vec!["/bin/bash".to_string(), "-c".to_string(), script]
}

/// Run `discard` before handing back a failed result.
async fn discard_on_error<T, F, Fut>(
    result: Result<T, ProviderError>,
    discard: F,
) -> Result<T, ProviderError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    if result.is_err() {
        discard().await;
    }
    result
}

#[async_trait]
impl ComputeProvider for DockerProvider {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn ensure_network_policy(
        &self,
        name: &str,
        template: &InstanceTemplate,
    ) -> Result<PolicyHandle, ProviderError> {
        if template
            .network()
            .rules()
            .iter()
            .any(|r| !r.source.is_unrestricted())
        {
            warn!(
                policy = %name,
                "Docker cannot restrict ingress by source; source CIDRs are not enforced"
            );
        }

        match self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(_) => {
                info!(network = %name, "Network already exists, reusing it");
                return Ok(PolicyHandle(name.to_string()));
            }
            Err(err) => match map_error(err) {
                ProviderError::NotFound(_) => {}
                other => return Err(other),
            },
        }

        let options = CreateNetworkOptions {
            name: name.to_string(),
            driver: "bridge".to_string(),
            labels: HashMap::from([(labels::FLEET.to_string(), name.to_string())]),
            ..Default::default()
        };
        self.docker.create_network(options).await.map_err(map_error)?;
        info!(network = %name, "Created network");

        Ok(PolicyHandle(name.to_string()))
    }

    async fn launch(&self, request: &LaunchRequest) -> Result<Allocation, ProviderError> {
        let template = &request.template;
        let class = template.instance_class();

        let container_labels = HashMap::from([
            (labels::FLEET.to_string(), request.fleet.clone()),
            (labels::WORKER_ID.to_string(), request.worker_id.to_string()),
            (labels::NAME.to_string(), request.name.clone()),
            (labels::TEMPLATE_DIGEST.to_string(), request.payload.digest()),
        ]);

        let config = Config {
            image: Some(template.image().to_string()),
            cmd: Some(container_command(&request.payload)),
            labels: Some(container_labels),
            exposed_ports: Some(Self::exposed_ports(template)),
            host_config: Some(HostConfig {
                network_mode: Some(request.policy.as_str().to_string()),
                nano_cpus: Some(i64::from(class.vcpus()) * 1_000_000_000),
                memory: Some(class.memory_mib() as i64 * 1024 * 1024),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: request.name.clone(),
            ..Default::default()
        };
        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(map_error)?;

        let started = self.start_and_inspect(&created.id, request.policy.as_str()).await;
        let private_address = discard_on_error(started, || self.discard(&created.id)).await?;

        debug!(container = %created.id, name = %request.name, "Container started");

        Ok(Allocation {
            instance: InstanceId::new(created.id),
            public_address: None,
            private_address,
        })
    }

    async fn describe(&self, instance: &InstanceId) -> Result<InstanceStatus, ProviderError> {
        match self
            .docker
            .inspect_container(instance.as_str(), None::<InspectContainerOptions>)
            .await
        {
            Ok(inspected) => Ok(map_state(inspected.state.and_then(|s| s.status))),
            Err(err) => match map_error(err) {
                ProviderError::NotFound(_) => Ok(InstanceStatus::Gone),
                other => Err(other),
            },
        }
    }

    async fn destroy(&self, instance: &InstanceId) -> Result<(), ProviderError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self
            .docker
            .remove_container(instance.as_str(), Some(options))
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => match map_error(err) {
                ProviderError::NotFound(_) => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn list_fleet(&self, fleet: &str) -> Result<Vec<DiscoveredInstance>, ProviderError> {
        let options = ListContainersOptions {
            all: true,
            filters: HashMap::from([(
                "label".to_string(),
                vec![format!("{}={}", labels::FLEET, fleet)],
            )]),
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(map_error)?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let tags = c.labels.unwrap_or_default();
                let status = match c.state.as_deref() {
                    Some("running") | Some("restarting") => InstanceStatus::Running,
                    Some("exited") | Some("dead") | Some("removing") => InstanceStatus::Terminated,
                    _ => InstanceStatus::Pending,
                };
                let private_address = Self::container_address(
                    c.network_settings.as_ref().and_then(|n| n.networks.as_ref()),
                    fleet,
                );
                Some(DiscoveredInstance {
                    instance: InstanceId::new(id),
                    worker_id: tags.get(labels::WORKER_ID).map(|w| WorkerId::new(w.clone())),
                    name: tags.get(labels::NAME).cloned().unwrap_or_default(),
                    status,
                    public_address: None,
                    private_address,
                    created_at: c.created.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                })
            })
            .collect())
    }
}
