//! Bearer-token auth middleware, grounded on `cluster/src/main.rs`'s
//! `ServiceBuilder::new().layer(...)` style of composing cross-cutting
//! concerns as `axum` middleware/layers.
//!
//! A configured `api_key` is required on every protected route; when unset,
//! auth is a no-op.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::OrchestratorError;
use crate::state::AppState;

pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, OrchestratorError> {
    let Some(expected) = &state.config.api_key else {
        return Ok(next.run(request).await);
    };

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        None => Err(OrchestratorError::AuthMissing),
        Some(t) if t != expected => Err(OrchestratorError::AuthInvalid),
        Some(_) => Ok(next.run(request).await),
    }
}
