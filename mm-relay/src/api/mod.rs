//! HTTP API handlers for mm-relay

pub mod emit;
pub mod health;
pub mod sse;
pub mod values;

pub use emit::emit;
pub use health::health_routes;
pub use sse::event_stream;
pub use values::{get_source_values, get_values};
