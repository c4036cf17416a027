//! `RuntimeClient` — the narrow container-runtime surface the rest of the
//! crate depends on.
//!
//! Constructor and error handling are grounded on
//! `agent/src/docker/client.rs::DockerClient::new` (same
//! connect-with-defaults-or-socket split). Container creation is grounded
//! on `testcontainers-rs`'s `runners/async_runner.rs::AsyncRunner::start`,
//! the only pack example that builds a `bollard::container::Config` /
//! `HostConfig` / `PortBinding` triple from scratch rather than forwarding
//! an existing Swarm spec. Port- and timestamp-mapping in `ContainerView`'s
//! `From` impls follows `agent/src/docker/inventory.rs::ContainerInfo`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{Config, CreateContainerOptions, ListContainersOptions};
use bollard::models::{
    ContainerSummary, HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum,
};
use bollard::Docker;
use tracing::warn;

use super::error::RuntimeError;

/// The narrow container-runtime surface the rest of the crate depends on —
/// an object-safe trait so the provisioner, autoscaler, reindexer, naming,
/// and auto-delete paths can run against a fake in tests instead of a live
/// daemon, the same split
/// `agent/src/client/docker.rs::DockerOps` makes between the real
/// Bollard-backed client and `client/fake.rs::FakeDocker`.
#[async_trait]
pub trait RuntimeOps: Send + Sync {
    async fn ping(&self) -> Result<(), RuntimeError>;
    async fn create_and_start(&self, spec: ContainerSpec) -> Result<ContainerView, RuntimeError>;
    async fn inspect(&self, id: &str) -> Result<ContainerView, RuntimeError>;
    async fn list_by_label(&self, key: &str, value: &str) -> Result<Vec<ContainerView>, RuntimeError>;
    async fn list_all(&self) -> Result<Vec<ContainerView>, RuntimeError>;
    async fn stop(&self, id: &str, timeout_s: i64) -> Result<(), RuntimeError>;
    async fn remove(&self, id: &str, force: bool) -> Result<(), RuntimeError>;
}

/// Everything needed to create and start one container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub env: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub network: Option<String>,
    /// container port -> host port.
    pub port_bindings: HashMap<u16, u16>,
}

/// The fields the rest of the crate needs back from the runtime, independent
/// of whether they came from `create`, `inspect`, or `list`.
#[derive(Debug, Clone)]
pub struct ContainerView {
    pub id: String,
    pub name: String,
    pub image: String,
    pub created: String,
    pub status: String,
    pub labels: HashMap<String, String>,
    /// `"<container_port>/tcp"` -> host bindings.
    pub ports: HashMap<String, Vec<PortBindingView>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PortBindingView {
    pub host_ip: Option<String>,
    pub host_port: Option<String>,
}

impl From<ContainerSummary> for ContainerView {
    fn from(s: ContainerSummary) -> Self {
        Self {
            id: s.id.unwrap_or_default(),
            name: s
                .names
                .as_deref()
                .and_then(|n| n.first())
                .map(|n| n.trim_start_matches('/'))
                .unwrap_or_default()
                .to_string(),
            image: s.image.unwrap_or_default(),
            created: s.created.map(|c| c.to_string()).unwrap_or_default(),
            status: s.state.unwrap_or_default(),
            labels: s.labels.unwrap_or_default(),
            ports: HashMap::new(),
        }
    }
}

pub struct RuntimeClient {
    docker: Docker,
}

impl RuntimeClient {
    /// Connect, retrying with exponential backoff: initial 2s, factor 1.5,
    /// cap 10s, 10 attempts.
    pub async fn connect(socket_path: &str) -> Result<Self, RuntimeError> {
        let mut delay = Duration::from_secs(2);
        let mut last_err = None;
        for attempt in 1..=10 {
            match Self::connect_once(socket_path) {
                Ok(docker) => {
                    let client = Self { docker };
                    match client.ping().await {
                        Ok(()) => return Ok(client),
                        Err(e) => last_err = Some(e),
                    }
                }
                Err(e) => last_err = Some(e),
            }
            warn!(attempt, "container runtime not reachable yet, retrying");
            tokio::time::sleep(delay).await;
            delay = std::cmp::min(delay.mul_f32(1.5), Duration::from_secs(10));
        }
        Err(last_err.unwrap_or_else(|| {
            RuntimeError::ConnectionFailed("exhausted connection retries".to_string())
        }))
    }

    fn connect_once(socket_path: &str) -> Result<Docker, RuntimeError> {
        if socket_path.is_empty() {
            Docker::connect_with_defaults()
        } else {
            let clean_path = socket_path.trim_start_matches("unix://");
            Docker::connect_with_socket(clean_path, 120, bollard::API_DEFAULT_VERSION)
        }
        .map_err(|e| RuntimeError::ConnectionFailed(e.to_string()))
    }
}

#[async_trait]
impl RuntimeOps for RuntimeClient {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn create_and_start(
        &self,
        spec: ContainerSpec,
    ) -> Result<ContainerView, RuntimeError> {
        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
            .port_bindings
            .iter()
            .map(|(container_port, host_port)| {
                (
                    format!("{container_port}/tcp"),
                    Some(vec![PortBinding {
                        host_ip: None,
                        host_port: Some(host_port.to_string()),
                    }]),
                )
            })
            .collect();

        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .port_bindings
            .keys()
            .map(|p| (format!("{p}/tcp"), HashMap::new()))
            .collect();

        let host_config = HostConfig {
            network_mode: spec.network.clone(),
            port_bindings: Some(port_bindings),
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                maximum_retry_count: None,
            }),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(env),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await?;

        self.docker
            .start_container::<String>(&created.id, None)
            .await?;

        self.inspect(&created.id).await
    }

    async fn inspect(&self, id: &str) -> Result<ContainerView, RuntimeError> {
        let details = self.docker.inspect_container(id, None).await?;
        let status = details
            .state
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .map(|s| s.to_string())
            .unwrap_or_default();

        let ports = details
            .network_settings
            .as_ref()
            .and_then(|ns| ns.ports.as_ref())
            .map(|port_map| {
                port_map
                    .iter()
                    .filter_map(|(container_port, bindings)| {
                        let bindings = bindings.as_ref()?;
                        if bindings.is_empty() {
                            return None;
                        }
                        let views = bindings
                            .iter()
                            .map(|b| PortBindingView {
                                host_ip: b.host_ip.clone(),
                                host_port: b.host_port.clone(),
                            })
                            .collect();
                        Some((container_port.clone(), views))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ContainerView {
            id: details.id.unwrap_or_else(|| id.to_string()),
            name: details
                .name
                .as_deref()
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            image: details
                .config
                .as_ref()
                .and_then(|c| c.image.clone())
                .unwrap_or_default(),
            created: details.created.clone().unwrap_or_default(),
            status,
            labels: details
                .config
                .as_ref()
                .and_then(|c| c.labels.clone())
                .unwrap_or_default(),
            ports,
        })
    }

    async fn list_by_label(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<ContainerView>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{key}={value}")]);
        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(options)).await?;
        Ok(summaries.into_iter().map(ContainerView::from).collect())
    }

    async fn list_all(&self) -> Result<Vec<ContainerView>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(options)).await?;
        Ok(summaries.into_iter().map(ContainerView::from).collect())
    }

    async fn stop(&self, id: &str, timeout_s: i64) -> Result<(), RuntimeError> {
        let options = bollard::container::StopContainerOptions { t: timeout_s };
        match self.docker.stop_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        let options = bollard::container::RemoveContainerOptions {
            force,
            ..Default::default()
        };
        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
