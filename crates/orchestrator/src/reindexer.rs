//! Re-derive port reservations and bootstrap engine records from whatever
//! managed containers the runtime already has, regardless of whether this
//! process created them. Idempotent by construction (`PortAllocator::reserve`
//! is idempotent, `StateStore::ensure_engine` never overwrites an existing
//! entry).

use tracing::warn;

use crate::ports::{PortAllocator, PortRange};
use crate::provisioner::{Provisioner, ACESTREAM_LABEL_HTTP, ACESTREAM_LABEL_HTTPS, HOST_LABEL_HTTP, HOST_LABEL_HTTPS};
use crate::runtime::RuntimeOps;
use crate::store::StateStore;

pub async fn reindex_existing(
    provisioner: &Provisioner,
    runtime: &dyn RuntimeOps,
    ports: &PortAllocator,
    store: &StateStore,
) {
    let containers = match provisioner.list_managed().await {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "reindex: failed to list managed containers");
            return;
        }
    };

    for c in containers {
        let label_port = |key: &str| c.labels.get(key).and_then(|v| v.parse::<u16>().ok());

        if let Some(p) = label_port(ACESTREAM_LABEL_HTTP) {
            ports.reserve(PortRange::Http, p);
        }
        if let Some(p) = label_port(ACESTREAM_LABEL_HTTPS) {
            ports.reserve(PortRange::Https, p);
        }
        if let Some(p) = label_port(HOST_LABEL_HTTP) {
            ports.reserve(PortRange::Host, p);
        }
        if let Some(p) = label_port(HOST_LABEL_HTTPS) {
            ports.reserve(PortRange::Host, p);
        }

        let host_port = match label_port(HOST_LABEL_HTTP) {
            Some(p) => p,
            None if c.status == "running" => {
                recover_host_http_port(runtime, &c.id, label_port(ACESTREAM_LABEL_HTTP))
                    .await
                    .inspect(|p| ports.reserve(PortRange::Host, *p))
                    .unwrap_or(0)
            }
            None => 0,
        };
        store.ensure_engine(&c.id, "127.0.0.1".to_string(), host_port, c.labels.clone());
    }
}

/// For a running container whose `host.http_port` label is missing, recover
/// the host-side port from the runtime's own `NetworkSettings.Ports` mapping,
/// keyed by `acestream.http_port/tcp`.
async fn recover_host_http_port(
    runtime: &dyn RuntimeOps,
    container_id: &str,
    container_http_port: Option<u16>,
) -> Option<u16> {
    let container_http_port = container_http_port?;
    let view = runtime.inspect(container_id).await.ok()?;
    let key = format!("{container_http_port}/tcp");
    view.ports
        .get(&key)?
        .iter()
        .find_map(|b| b.host_port.as_ref().and_then(|p| p.parse::<u16>().ok()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::persistence::Repo;
    use crate::runtime::fake::FakeRuntime;
    use crate::runtime::{ContainerView, PortBindingView};

    async fn harness() -> (Arc<FakeRuntime>, Provisioner, PortAllocator, StateStore) {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite always connects");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations apply cleanly to a fresh in-memory database");
        let repo = Repo::new(pool);
        let runtime = Arc::new(FakeRuntime::new());
        let cfg = Arc::new(OrchestratorConfig::default());
        let ports = PortAllocator::new(
            &cfg.port_range_host,
            &cfg.ace_http_range,
            &cfg.ace_https_range,
        )
        .unwrap();
        let provisioner = Provisioner::new(
            runtime.clone(),
            Arc::new(
                PortAllocator::new(
                    &cfg.port_range_host,
                    &cfg.ace_http_range,
                    &cfg.ace_https_range,
                )
                .unwrap(),
            ),
            repo.clone(),
            cfg,
        );
        let store = StateStore::new(repo, 10);
        (runtime, provisioner, ports, store)
    }

    fn managed_container(id: &str, labels: HashMap<String, String>) -> ContainerView {
        ContainerView {
            id: id.to_string(),
            name: id.to_string(),
            image: "acestream/engine".to_string(),
            created: String::new(),
            status: "running".to_string(),
            labels,
            ports: HashMap::new(),
        }
    }

    // `ondemand.app=myservice` is `OrchestratorConfig::default().container_label`.
    fn managed_label() -> (String, String) {
        ("ondemand.app".to_string(), "myservice".to_string())
    }

    #[tokio::test]
    async fn recovers_missing_host_http_port_from_network_settings() {
        let (runtime, provisioner, ports, store) = harness().await;
        let (key, val) = managed_label();

        let mut labels = HashMap::from([(key, val)]);
        labels.insert(ACESTREAM_LABEL_HTTP.to_string(), "6878".to_string());
        let mut view = managed_container("c1", labels);
        view.ports.insert(
            "6878/tcp".to_string(),
            vec![PortBindingView {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some("19050".to_string()),
            }],
        );
        runtime.add_container(view).await;

        reindex_existing(&provisioner, runtime.as_ref(), &ports, &store).await;

        let engine = store
            .get_engine("c1")
            .expect("container was reindexed into an engine record");
        assert_eq!(engine.port, 19050);
    }

    #[tokio::test]
    async fn reindexing_twice_is_idempotent() {
        let (runtime, provisioner, ports, store) = harness().await;
        let (key, val) = managed_label();
        let mut labels = HashMap::from([(key, val)]);
        labels.insert(HOST_LABEL_HTTP.to_string(), "19051".to_string());
        runtime.add_container(managed_container("c2", labels)).await;

        reindex_existing(&provisioner, runtime.as_ref(), &ports, &store).await;
        reindex_existing(&provisioner, runtime.as_ref(), &ports, &store).await;

        assert_eq!(store.list_engines().len(), 1);
        // the port was reserved once per reindex call but the allocator still
        // only ever holds it once: allocating a fresh host port must not
        // return 19051.
        assert_ne!(ports.alloc(PortRange::Host).unwrap(), 19051);
    }
}
