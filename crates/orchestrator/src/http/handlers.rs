//! HTTP handlers, grounded on `cluster/src/main.rs`'s handler style (thin
//! extractor-in, `Json`-out functions that delegate to the owning
//! component).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::{StreamEndedEvent, StreamStartedEvent};
use crate::provisioner::{AceProvisionRequest, AceProvisionResponse, StartRequest};
use crate::state::AppState;

use super::models::{
    ByLabelQuery, ContainerInspectResponse, DeletedResponse, EngineWithStreams, EventAckResponse,
    GcResponse, ProvisionResponse, ScaledResponse, StatsQuery, StreamsQuery,
};

pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match state.runtime.ping().await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
}

pub async fn provision(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> OrchestratorResult<Json<ProvisionResponse>> {
    let container_id = state.provisioner.start_container(req).await?;
    state.metrics.provision_total.with_label_values(&["generic"]).inc();
    Ok(Json(ProvisionResponse { container_id }))
}

pub async fn provision_acestream(
    State(state): State<AppState>,
    Json(req): Json<AceProvisionRequest>,
) -> OrchestratorResult<Json<AceProvisionResponse>> {
    state.metrics.provision_total.with_label_values(&["acestream"]).inc();
    let resp = state.provisioner.start_acestream(req).await?;
    Ok(Json(resp))
}

pub async fn scale(
    State(state): State<AppState>,
    Path(demand): Path<u32>,
) -> OrchestratorResult<Json<ScaledResponse>> {
    crate::autoscaler::scale_to(&state.provisioner, &state.config, demand).await;
    Ok(Json(ScaledResponse { scaled_to: demand }))
}

/// Idle sweeping is configured (`IDLE_TTL_S`) but not yet implemented;
/// this stays a documented no-op until that requirement is defined.
pub async fn garbage_collect() -> Json<GcResponse> {
    Json(GcResponse { status: "ok" })
}

pub async fn delete_container(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
) -> OrchestratorResult<Json<DeletedResponse>> {
    state.provisioner.stop_container(&container_id).await?;
    Ok(Json(DeletedResponse {
        deleted: container_id,
    }))
}

pub async fn get_container(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
) -> OrchestratorResult<Json<ContainerInspectResponse>> {
    let view = state.runtime.inspect(&container_id).await?;
    Ok(Json(view.into()))
}

pub async fn stream_started(
    State(state): State<AppState>,
    Json(evt): Json<StreamStartedEvent>,
) -> Json<crate::domain::Stream> {
    state.metrics.events_started.inc();
    state.metrics.streams_active.inc();
    Json(state.store.on_stream_started(&evt).await)
}

pub async fn stream_ended(
    State(state): State<AppState>,
    Json(evt): Json<StreamEndedEvent>,
) -> Json<EventAckResponse> {
    let stream = state.store.on_stream_ended(&evt).await;
    if let Some(stream) = &stream {
        state.metrics.events_ended.inc();
        state.metrics.streams_active.dec();
        if state.config.auto_delete {
            crate::events::spawn_auto_delete(state.provisioner.clone(), stream.clone());
        }
    }
    Json(EventAckResponse {
        updated: stream.is_some(),
        stream,
    })
}

pub async fn list_engines(State(state): State<AppState>) -> Json<Vec<crate::domain::Engine>> {
    Json(state.store.list_engines())
}

pub async fn get_engine(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
) -> OrchestratorResult<Json<EngineWithStreams>> {
    let engine = state
        .store
        .get_engine(&container_id)
        .ok_or_else(|| OrchestratorError::NotFound(container_id.clone()))?;
    let streams = state.store.list_streams(None, Some(&container_id));
    Ok(Json(EngineWithStreams { engine, streams }))
}

pub async fn list_streams(
    State(state): State<AppState>,
    Query(q): Query<StreamsQuery>,
) -> Json<Vec<crate::domain::Stream>> {
    Json(
        state
            .store
            .list_streams(q.status, q.container_id.as_deref()),
    )
}

pub async fn get_stream_stats(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    Query(q): Query<StatsQuery>,
) -> Json<Vec<crate::domain::StatSample>> {
    Json(state.store.get_stream_stats(&stream_id, q.since))
}

pub async fn by_label(
    State(state): State<AppState>,
    Query(q): Query<ByLabelQuery>,
) -> OrchestratorResult<Json<Vec<ContainerInspectResponse>>> {
    let containers = state.runtime.list_by_label(&q.key, &q.value).await?;
    let mut out = Vec::with_capacity(containers.len());
    for c in containers {
        if let Ok(view) = state.runtime.inspect(&c.id).await {
            out.push(view.into());
        }
    }
    Ok(Json(out))
}
