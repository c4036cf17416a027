//! Shared application state, grounded on `cluster/src/state.rs::AppState`:
//! one `Clone`-able struct threaded through `axum`'s `State` extractor,
//! owning the `tokio::sync::watch` shutdown signal the collector listens on.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::OrchestratorConfig;
use crate::metrics::Metrics;
use crate::persistence::{self, Repo};
use crate::ports::PortAllocator;
use crate::provisioner::Provisioner;
use crate::runtime::{RuntimeClient, RuntimeOps};
use crate::store::StateStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<OrchestratorConfig>,
    pub store: Arc<StateStore>,
    pub provisioner: Arc<Provisioner>,
    pub ports: Arc<PortAllocator>,
    pub runtime: Arc<dyn RuntimeOps>,
    pub metrics: Arc<Metrics>,
    shutdown_tx: watch::Sender<bool>,
}

impl AppState {
    pub async fn bootstrap(config: OrchestratorConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let runtime: Arc<dyn RuntimeOps> =
            Arc::new(RuntimeClient::connect(&config.docker_socket).await?);

        let pool = persistence::connect(&config.db_url).await?;
        let repo = Repo::new(pool);

        let ports = Arc::new(PortAllocator::new(
            &config.port_range_host,
            &config.ace_http_range,
            &config.ace_https_range,
        )?);

        let store = Arc::new(StateStore::new(repo.clone(), config.stats_history_max));
        let provisioner = Arc::new(Provisioner::new(
            runtime.clone(),
            ports.clone(),
            repo,
            config.clone(),
        ));
        let metrics = Arc::new(Metrics::new());

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            store,
            provisioner,
            ports,
            runtime,
            metrics,
            shutdown_tx,
        })
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
