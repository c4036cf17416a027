//! Request/response DTOs for the HTTP surface.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Engine, Stream, StreamStatus};
use crate::runtime::{ContainerView, PortBindingView};

#[derive(Debug, Deserialize)]
pub struct StreamsQuery {
    pub status: Option<StreamStatus>,
    pub container_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ByLabelQuery {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct EngineWithStreams {
    pub engine: Engine,
    pub streams: Vec<Stream>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: String,
}

#[derive(Debug, Serialize)]
pub struct ProvisionResponse {
    pub container_id: String,
}

#[derive(Debug, Serialize)]
pub struct ScaledResponse {
    pub scaled_to: u32,
}

#[derive(Debug, Serialize)]
pub struct GcResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct EventAckResponse {
    pub updated: bool,
    pub stream: Option<Stream>,
}

/// Raw container inspection response.
#[derive(Debug, Serialize)]
pub struct ContainerInspectResponse {
    pub id: String,
    pub name: String,
    pub image: String,
    pub created: String,
    pub status: String,
    pub labels: HashMap<String, String>,
    pub ports: HashMap<String, Vec<PortBindingView>>,
}

impl From<ContainerView> for ContainerInspectResponse {
    fn from(v: ContainerView) -> Self {
        Self {
            id: v.id,
            name: v.name,
            image: v.image,
            created: v.created,
            status: v.status,
            labels: v.labels,
            ports: v.ports,
        }
    }
}
