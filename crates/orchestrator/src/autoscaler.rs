//! Keep the managed fleet within `[min_replicas, max_replicas]`.
//! Per-container failures are logged and do not abort the loop — the
//! teacher's background sync (`service/background.rs`) follows the same
//! "log and continue" idiom.

use tracing::{error, info};

use crate::config::OrchestratorConfig;
use crate::provisioner::{Provisioner, StartRequest};

pub async fn ensure_minimum(provisioner: &Provisioner, config: &OrchestratorConfig) {
    let running = match provisioner.list_managed().await {
        Ok(containers) => containers.iter().filter(|c| c.status == "running").count() as u32,
        Err(e) => {
            error!(error = %e, "ensure_minimum: failed to list managed containers");
            return;
        }
    };

    let deficit = config.min_replicas.saturating_sub(running);
    if deficit > 0 {
        info!(
            deficit,
            min_replicas = config.min_replicas,
            running,
            "starting containers to meet minimum replica count"
        );
    }
    for i in 0..deficit {
        let req = StartRequest {
            image: Some(config.target_image.clone()),
            ..Default::default()
        };
        match provisioner.start_container(req).await {
            Ok(id) => info!(container_id = %id, attempt = i + 1, deficit, "started container"),
            Err(e) => error!(error = %e, attempt = i + 1, deficit, "failed to start container"),
        }
    }
}

pub async fn scale_to(provisioner: &Provisioner, config: &OrchestratorConfig, demand: u32) {
    let desired = demand.clamp(config.min_replicas, config.max_replicas);

    let containers = match provisioner.list_managed().await {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "scale_to: failed to list managed containers");
            return;
        }
    };
    let running: Vec<_> = containers
        .into_iter()
        .filter(|c| c.status == "running")
        .collect();

    if (running.len() as u32) < desired {
        let deficit = desired - running.len() as u32;
        info!(deficit, desired, running = running.len(), "scaling up");
        for _ in 0..deficit {
            let req = StartRequest {
                image: Some(config.target_image.clone()),
                ..Default::default()
            };
            if let Err(e) = provisioner.start_container(req).await {
                error!(error = %e, "failed to start container for scale-up");
            }
        }
    } else if (running.len() as u32) > desired {
        let excess = running.len() as u32 - desired;
        info!(excess, desired, running = running.len(), "scaling down");
        for c in running.into_iter().skip(desired as usize) {
            if let Err(e) = provisioner.stop_container_with_grace(&c.id, 5).await {
                error!(error = %e, container_id = %c.id, "failed to stop container for scale-down");
            }
        }
    }
}
