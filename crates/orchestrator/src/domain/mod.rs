//! Domain types: the Engine/Stream/StatSample records the State Store indexes.

mod engine;
mod stat;
mod stream;

pub use engine::Engine;
pub use stat::StatSample;
pub use stream::{Stream, StreamKeyType, StreamStatus};
