//! `FakeRuntime` — an in-memory `RuntimeOps` double for exercising the
//! provisioner, autoscaler, naming, reindexer, and auto-delete paths without
//! a live daemon.
//!
//! Grounded on `agent/src/client/fake.rs::FakeDocker`: state lives behind a
//! single `tokio::sync::Mutex`, seeded through builder methods, and handed
//! back to callers as plain clones rather than references.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::client::{ContainerSpec, ContainerView, PortBindingView, RuntimeOps};
use super::error::RuntimeError;

struct Inner {
    containers: HashMap<String, ContainerView>,
    next_id: u64,
}

pub struct FakeRuntime {
    inner: Mutex<Inner>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                containers: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Seed a container as if it already existed before the test started
    /// (used by reindexer tests).
    pub async fn add_container(&self, view: ContainerView) {
        self.inner.lock().await.containers.insert(view.id.clone(), view);
    }
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeOps for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn create_and_start(&self, spec: ContainerSpec) -> Result<ContainerView, RuntimeError> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = format!("fake-{}", inner.next_id);

        let ports = spec
            .port_bindings
            .iter()
            .map(|(container_port, host_port)| {
                (
                    format!("{container_port}/tcp"),
                    vec![PortBindingView {
                        host_ip: Some("0.0.0.0".to_string()),
                        host_port: Some(host_port.to_string()),
                    }],
                )
            })
            .collect();

        let view = ContainerView {
            id: id.clone(),
            name: spec.name,
            image: spec.image,
            created: "2024-01-01T00:00:00Z".to_string(),
            status: "running".to_string(),
            labels: spec.labels,
            ports,
        };
        inner.containers.insert(id, view.clone());
        Ok(view)
    }

    async fn inspect(&self, id: &str) -> Result<ContainerView, RuntimeError> {
        self.inner
            .lock()
            .await
            .containers
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }

    async fn list_by_label(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<ContainerView>, RuntimeError> {
        Ok(self
            .inner
            .lock()
            .await
            .containers
            .values()
            .filter(|c| c.labels.get(key).map(|v| v.as_str()) == Some(value))
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<ContainerView>, RuntimeError> {
        Ok(self.inner.lock().await.containers.values().cloned().collect())
    }

    async fn stop(&self, id: &str, _timeout_s: i64) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().await;
        let c = inner
            .containers
            .get_mut(id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        c.status = "exited".to_string();
        Ok(())
    }

    async fn remove(&self, id: &str, _force: bool) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().await;
        inner
            .containers
            .remove(id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_start_assigns_an_id_and_reports_it_running() {
        let rt = FakeRuntime::new();
        let spec = ContainerSpec {
            image: "acestream/engine".to_string(),
            name: "acestream-1".to_string(),
            port_bindings: HashMap::from([(6878, 40001)]),
            ..Default::default()
        };
        let view = rt.create_and_start(spec).await.expect("create succeeds");
        assert_eq!(view.status, "running");
        assert_eq!(
            view.ports.get("6878/tcp").unwrap()[0].host_port.as_deref(),
            Some("40001")
        );

        let again = rt.inspect(&view.id).await.expect("inspect finds it");
        assert_eq!(again.id, view.id);
    }

    #[tokio::test]
    async fn inspect_missing_container_is_not_found() {
        let rt = FakeRuntime::new();
        let err = rt.inspect("nope").await.unwrap_err();
        assert!(matches!(err, RuntimeError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_by_label_filters_to_matching_containers() {
        let rt = FakeRuntime::new();
        rt.add_container(ContainerView {
            id: "a".to_string(),
            name: "a".to_string(),
            image: "img".to_string(),
            created: String::new(),
            status: "running".to_string(),
            labels: HashMap::from([("role".to_string(), "acestream".to_string())]),
            ports: HashMap::new(),
        })
        .await;
        rt.add_container(ContainerView {
            id: "b".to_string(),
            name: "b".to_string(),
            image: "img".to_string(),
            created: String::new(),
            status: "running".to_string(),
            labels: HashMap::from([("role".to_string(), "other".to_string())]),
            ports: HashMap::new(),
        })
        .await;

        let matched = rt.list_by_label("role", "acestream").await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "a");
    }

    #[tokio::test]
    async fn stop_then_remove_drops_the_container() {
        let rt = FakeRuntime::new();
        rt.add_container(ContainerView {
            id: "c".to_string(),
            name: "c".to_string(),
            image: "img".to_string(),
            created: String::new(),
            status: "running".to_string(),
            labels: HashMap::new(),
            ports: HashMap::new(),
        })
        .await;

        rt.stop("c", 5).await.expect("stop succeeds");
        assert_eq!(rt.inspect("c").await.unwrap().status, "exited");

        rt.remove("c", true).await.expect("remove succeeds");
        assert!(matches!(
            rt.inspect("c").await.unwrap_err(),
            RuntimeError::NotFound(_)
        ));
    }
}
