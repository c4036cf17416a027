//! Error mapping for the runtime adapter — grounded on
//! `agent/src/docker/client.rs::DockerError` and
//! `agent/src/docker/error_map.rs`, keeping the same NotFound/generic
//! runtime-error split.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("container runtime connection failed: {0}")]
    ConnectionFailed(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("runtime error: {0}")]
    RuntimeError(String),
}

impl From<bollard::errors::Error> for RuntimeError {
    fn from(err: bollard::errors::Error) -> Self {
        match &err {
            bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                RuntimeError::NotFound(err.to_string())
            }
            _ => RuntimeError::RuntimeError(err.to_string()),
        }
    }
}
