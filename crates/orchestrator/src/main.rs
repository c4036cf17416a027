//! Entry point: boot sequence and HTTP router, grounded on
//! `cluster/src/main.rs`'s two-phase tracing init / config / state /
//! graceful-shutdown shape, adapted to this service's own boot order:
//! config -> persistence schema -> autoscaler floor -> collector
//! start -> state hydration -> reindex.

mod auth;
mod autoscaler;
mod collector;
mod config;
mod domain;
mod error;
mod events;
mod http;
mod metrics;
mod naming;
mod persistence;
mod ports;
mod provisioner;
mod reindexer;
mod runtime;
mod state;
mod store;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::OrchestratorConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("starting AceStream on-demand orchestrator v{}", env!("CARGO_PKG_VERSION"));

    let config = OrchestratorConfig::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    info!(app_port = config.app_port, min_replicas = config.min_replicas, max_replicas = config.max_replicas, "configuration loaded");

    let state = AppState::bootstrap(config).await.context("failed to bootstrap application state")?;

    // Enforce the replica floor, then start the collector, then hydrate
    // state from the database, then reconcile against the live runtime.
    autoscaler::ensure_minimum(&state.provisioner, &state.config).await;

    let collector_handle = collector::spawn(
        state.store.clone(),
        state.metrics.clone(),
        Duration::from_secs(state.config.collect_interval_s),
        state.shutdown_rx(),
    );

    state.store.load_from_db().await.context("failed to hydrate state from database")?;

    reindexer::reindex_existing(&state.provisioner, &state.runtime, &state.ports, &state.store).await;

    let app = build_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.app_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("orchestrator listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.shutdown();
    let _ = collector_handle.await;

    info!("orchestrator shut down gracefully");
    Ok(())
}

fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/provision", post(http::handlers::provision))
        .route("/provision/acestream", post(http::handlers::provision_acestream))
        .route("/scale/{demand}", post(http::handlers::scale))
        .route("/gc", post(http::handlers::garbage_collect))
        .route("/containers/{container_id}", delete(http::handlers::delete_container))
        .route("/containers", get(http::handlers::by_label))
        .route("/events/stream_started", post(http::handlers::stream_started))
        .route("/events/stream_ended", post(http::handlers::stream_ended))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    let open = Router::new()
        .route("/healthz", get(http::handlers::health))
        .route("/readyz", get(http::handlers::readiness))
        .route("/metrics", get(http::handlers::metrics))
        .route("/containers/{container_id}", get(http::handlers::get_container))
        .route("/engines", get(http::handlers::list_engines))
        .route("/engines/{container_id}", get(http::handlers::get_engine))
        .route("/streams", get(http::handlers::list_streams))
        .route("/streams/{stream_id}/stats", get(http::handlers::get_stream_stats));

    Router::new()
        .merge(protected)
        .merge(open)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(30)))
                .layer(DefaultBodyLimit::max(1024 * 1024))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,orchestrator=debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { warn!("received Ctrl+C, shutting down"); }
        _ = terminate => { warn!("received SIGTERM, shutting down"); }
    }
}
