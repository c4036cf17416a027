//! Narrow interface to the container runtime.

mod client;
mod error;
pub mod fake;

pub use client::{ContainerSpec, ContainerView, PortBindingView, RuntimeClient, RuntimeOps};
pub use error::RuntimeError;
