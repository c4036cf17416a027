//! Crate-wide error type and its mapping onto HTTP status codes.
//!
//! One enum, one variant per distinguishable failure mode, each with a
//! single `#[error("...")]` message — grounded on `cluster/src/error.rs::
//! ApiError`, with `status_code()` playing the role of `ApiError::extend()`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration invalid: {0}")]
    ConfigInvalid(String),

    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("image unavailable: {0}")]
    ImageUnavailable(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("startup failed: {0}")]
    StartupFailed(String),

    #[error("no free port in range")]
    NoFreePort,

    #[error("missing bearer token")]
    AuthMissing,

    #[error("invalid bearer token")]
    AuthInvalid,

    #[error("unknown stream: {0}")]
    StreamUnknown(String),

    #[error("persistence error: {0}")]
    PersistenceError(String),

    #[error("collector scrape failed: {0}")]
    CollectorScrapeFailed(String),
}

impl OrchestratorError {
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::ConfigInvalid(_) => "ConfigInvalid",
            OrchestratorError::RuntimeUnavailable(_) => "RuntimeUnavailable",
            OrchestratorError::NotFound(_) => "NotFound",
            OrchestratorError::ImageUnavailable(_) => "ImageUnavailable",
            OrchestratorError::NetworkError(_) => "NetworkError",
            OrchestratorError::StartupFailed(_) => "StartupFailed",
            OrchestratorError::NoFreePort => "NoFreePort",
            OrchestratorError::AuthMissing => "AuthMissing",
            OrchestratorError::AuthInvalid => "AuthInvalid",
            OrchestratorError::StreamUnknown(_) => "StreamUnknown",
            OrchestratorError::PersistenceError(_) => "PersistenceError",
            OrchestratorError::CollectorScrapeFailed(_) => "CollectorScrapeFailed",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OrchestratorError::AuthMissing => StatusCode::UNAUTHORIZED,
            OrchestratorError::AuthInvalid => StatusCode::FORBIDDEN,
            OrchestratorError::NotFound(_) | OrchestratorError::StreamUnknown(_) => {
                StatusCode::NOT_FOUND
            }
            OrchestratorError::NoFreePort
            | OrchestratorError::ImageUnavailable(_)
            | OrchestratorError::NetworkError(_)
            | OrchestratorError::StartupFailed(_) => StatusCode::BAD_GATEWAY,
            OrchestratorError::ConfigInvalid(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OrchestratorError::RuntimeUnavailable(_)
            | OrchestratorError::PersistenceError(_)
            | OrchestratorError::CollectorScrapeFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(kind = self.kind(), "{}", self);
        }
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<crate::persistence::PersistenceError> for OrchestratorError {
    fn from(err: crate::persistence::PersistenceError) -> Self {
        OrchestratorError::PersistenceError(err.to_string())
    }
}

impl From<crate::runtime::RuntimeError> for OrchestratorError {
    fn from(err: crate::runtime::RuntimeError) -> Self {
        match err {
            crate::runtime::RuntimeError::NotFound(msg) => OrchestratorError::NotFound(msg),
            other => OrchestratorError::RuntimeUnavailable(other.to_string()),
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
