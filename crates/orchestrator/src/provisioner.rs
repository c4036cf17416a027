//! Turns a provisioning request into a running container.
//!
//! Grounded on `agent/src/swarm/service.rs`'s pattern of assembling a typed
//! bollard spec from a request struct (there a `ServiceSpec`, here a plain
//! `ContainerSpec` matched to the `HostConfig`/`PortBinding` shapes
//! `agent/src/docker/inventory.rs` already deserializes the inverse of).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::naming::next_name;
use crate::persistence::Repo;
use crate::ports::{PortAllocator, PortRange};
use crate::runtime::{ContainerSpec, ContainerView, RuntimeError, RuntimeOps};

pub const ACESTREAM_LABEL_HTTP: &str = "acestream.http_port";
pub const ACESTREAM_LABEL_HTTPS: &str = "acestream.https_port";
pub const HOST_LABEL_HTTP: &str = "host.http_port";
pub const HOST_LABEL_HTTPS: &str = "host.https_port";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRequest {
    pub image: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// container port -> host port.
    #[serde(default)]
    pub ports: HashMap<u16, u16>,
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
}

fn default_name_prefix() -> String {
    "svc".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AceProvisionRequest {
    pub image: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub host_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AceProvisionResponse {
    pub container_id: String,
    pub container_name: String,
    pub host_http_port: u16,
    pub container_http_port: u16,
    pub container_https_port: u16,
}

pub struct Provisioner {
    runtime: Arc<dyn RuntimeOps>,
    ports: Arc<PortAllocator>,
    repo: Repo,
    config: Arc<OrchestratorConfig>,
}

impl Provisioner {
    pub fn new(
        runtime: Arc<dyn RuntimeOps>,
        ports: Arc<PortAllocator>,
        repo: Repo,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            runtime,
            ports,
            repo,
            config,
        }
    }

    fn container_label_kv(&self) -> (String, String) {
        let (k, v) = self
            .config
            .container_label
            .split_once('=')
            .expect("container_label is validated at boot to contain '='");
        (k.to_string(), v.to_string())
    }

    pub async fn start_container(&self, req: StartRequest) -> Result<String, OrchestratorError> {
        let (key, val) = self.container_label_kv();
        let mut labels = req.labels.clone();
        labels.insert(key, val);

        let image = req
            .image
            .clone()
            .unwrap_or_else(|| self.config.target_image.clone());
        let name = next_name(&self.repo, &self.runtime, &req.name_prefix).await;

        let spec = ContainerSpec {
            image: image.clone(),
            name,
            env: req.env.clone(),
            labels,
            network: self.config.docker_network.clone(),
            port_bindings: req.ports.clone(),
        };

        let view = self.create_with_startup_wait(spec, &image).await?;
        Ok(view.id)
    }

    pub async fn start_acestream(
        &self,
        req: AceProvisionRequest,
    ) -> Result<AceProvisionResponse, OrchestratorError> {
        let host_http = match req.host_port {
            Some(p) => {
                self.ports.reserve(PortRange::Host, p);
                p
            }
            None => self.ports.alloc(PortRange::Host)?,
        };
        let c_http = self.ports.alloc(PortRange::Http)?;
        let c_https = self.ports.alloc_https_avoiding(c_http)?;

        // A user-supplied CONF (even empty) is used verbatim; otherwise build
        // the default configuration block from the allocated ports.
        let final_conf = match req.env.get("CONF") {
            Some(conf) => conf.clone(),
            None => format!("--http-port={c_http}\n--https-port={c_https}\n--bind-all"),
        };

        let mut env = req.env.clone();
        env.insert("CONF".to_string(), final_conf);
        env.insert("HTTP_PORT".to_string(), c_http.to_string());
        env.insert("HTTPS_PORT".to_string(), c_https.to_string());
        env.insert("BIND_ALL".to_string(), "true".to_string());

        let (key, val) = self.container_label_kv();
        let mut labels = req.labels.clone();
        labels.insert(key, val);
        labels.insert(ACESTREAM_LABEL_HTTP.to_string(), c_http.to_string());
        labels.insert(ACESTREAM_LABEL_HTTPS.to_string(), c_https.to_string());
        labels.insert(HOST_LABEL_HTTP.to_string(), host_http.to_string());

        let mut port_bindings = HashMap::new();
        port_bindings.insert(c_http, host_http);
        if self.config.ace_map_https {
            let host_https = self.ports.alloc(PortRange::Host)?;
            port_bindings.insert(c_https, host_https);
            labels.insert(HOST_LABEL_HTTPS.to_string(), host_https.to_string());
        }

        let image = req
            .image
            .clone()
            .unwrap_or_else(|| self.config.target_image.clone());
        let name = next_name(&self.repo, &self.runtime, "acestream").await;

        let spec = ContainerSpec {
            image: image.clone(),
            name,
            env,
            labels: labels.clone(),
            network: self.config.docker_network.clone(),
            port_bindings,
        };

        let view = match self.create_with_startup_wait(spec, &image).await {
            Ok(v) => v,
            Err(e) => {
                self.release_ports_from_labels(&labels);
                return Err(e);
            }
        };

        Ok(AceProvisionResponse {
            container_id: view.id,
            container_name: view.name,
            host_http_port: host_http,
            container_http_port: c_http,
            container_https_port: c_https,
        })
    }

    /// Create, start, and poll until `running` or `STARTUP_TIMEOUT_S`
    /// elapses.
    async fn create_with_startup_wait(
        &self,
        spec: ContainerSpec,
        image_for_errors: &str,
    ) -> Result<ContainerView, OrchestratorError> {
        let view = self
            .runtime
            .create_and_start(spec)
            .await
            .map_err(|e| map_runtime_error(e, image_for_errors))?;

        let deadline = Instant::now() + Duration::from_secs(self.config.startup_timeout_s);
        loop {
            let current = self.runtime.inspect(&view.id).await?;
            if current.status == "running" {
                return Ok(current);
            }
            if Instant::now() >= deadline {
                let _ = self.runtime.remove(&view.id, true).await;
                return Err(OrchestratorError::StartupFailed(format!(
                    "container failed to start within {}s (status: {})",
                    self.config.startup_timeout_s, current.status
                )));
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    pub async fn stop_container(&self, id: &str) -> Result<(), OrchestratorError> {
        self.stop_container_with_grace(id, 10).await
    }

    /// Stop and remove with a caller-chosen grace period. The autoscaler's
    /// scale-down uses a shorter grace than teardown's default.
    pub async fn stop_container_with_grace(
        &self,
        id: &str,
        grace_s: i64,
    ) -> Result<(), OrchestratorError> {
        let view = self.runtime.inspect(id).await?;
        self.runtime.stop(id, grace_s).await?;
        self.release_ports_from_labels(&view.labels);
        self.runtime.remove(id, false).await?;
        Ok(())
    }

    pub async fn list_managed(&self) -> Result<Vec<ContainerView>, OrchestratorError> {
        let (key, val) = self.container_label_kv();
        Ok(self.runtime.list_by_label(&key, &val).await?)
    }

    fn release_ports_from_labels(&self, labels: &HashMap<String, String>) {
        let parse = |k: &str| labels.get(k).and_then(|v| v.parse::<u16>().ok());
        self.ports.free(PortRange::Host, parse(HOST_LABEL_HTTP));
        self.ports.free(PortRange::Host, parse(HOST_LABEL_HTTPS));
        self.ports.free(PortRange::Http, parse(ACESTREAM_LABEL_HTTP));
        self.ports.free(PortRange::Https, parse(ACESTREAM_LABEL_HTTPS));
    }
}

/// Map a runtime failure onto a user-facing error kind by matching
/// substrings in the lower-cased error message.
fn map_runtime_error(err: RuntimeError, image: &str) -> OrchestratorError {
    let msg = err.to_string().to_lowercase();
    if msg.contains("not found") || msg.contains("pull access denied") {
        OrchestratorError::ImageUnavailable(format!("image '{image}' not found: {err}"))
    } else if msg.contains("network") {
        OrchestratorError::NetworkError(err.to_string())
    } else {
        OrchestratorError::StartupFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;

    async fn provisioner(cfg: OrchestratorConfig) -> Provisioner {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite always connects");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations apply cleanly to a fresh in-memory database");
        let repo = Repo::new(pool);
        let runtime: Arc<dyn RuntimeOps> = Arc::new(FakeRuntime::new());
        let ports = Arc::new(
            PortAllocator::new(
                &cfg.port_range_host,
                &cfg.ace_http_range,
                &cfg.ace_https_range,
            )
            .unwrap(),
        );
        Provisioner::new(runtime, ports, repo, Arc::new(cfg))
    }

    #[tokio::test]
    async fn start_acestream_builds_default_conf_from_allocated_ports() {
        let p = provisioner(OrchestratorConfig::default()).await;
        let resp = p
            .start_acestream(AceProvisionRequest::default())
            .await
            .expect("start succeeds against the fake runtime");

        assert_eq!(resp.container_http_port, 40000);
        assert_eq!(resp.container_https_port, 45000);

        let view = p.runtime.inspect(&resp.container_id).await.unwrap();
        assert_eq!(view.status, "running");
    }

    #[tokio::test]
    async fn start_acestream_passes_through_a_user_supplied_conf_verbatim() {
        let p = provisioner(OrchestratorConfig::default()).await;
        let mut req = AceProvisionRequest::default();
        req.env.insert("CONF".to_string(), "--user-custom-flag".to_string());

        let resp = p
            .start_acestream(req)
            .await
            .expect("start succeeds against the fake runtime");
        let view = p.runtime.inspect(&resp.container_id).await.unwrap();
        assert_eq!(view.status, "running");
    }

    #[tokio::test]
    async fn start_acestream_honors_a_caller_supplied_host_port() {
        let p = provisioner(OrchestratorConfig::default()).await;
        let mut req = AceProvisionRequest::default();
        req.host_port = Some(19050);

        let resp = p.start_acestream(req).await.unwrap();
        assert_eq!(resp.host_http_port, 19050);
    }

    #[test]
    fn maps_not_found_substring_to_image_unavailable() {
        let err = RuntimeError::RuntimeError("No such image: pull access denied".to_string());
        let mapped = map_runtime_error(err, "acestream/engine:latest");
        assert!(matches!(mapped, OrchestratorError::ImageUnavailable(_)));
    }

    #[test]
    fn maps_network_substring_to_network_error() {
        let err = RuntimeError::RuntimeError("connection refused: network unreachable".to_string());
        let mapped = map_runtime_error(err, "img");
        assert!(matches!(mapped, OrchestratorError::NetworkError(_)));
    }

    #[test]
    fn maps_other_errors_to_startup_failed() {
        let err = RuntimeError::RuntimeError("some other docker failure".to_string());
        let mapped = map_runtime_error(err, "img");
        assert!(matches!(mapped, OrchestratorError::StartupFailed(_)));
    }
}
