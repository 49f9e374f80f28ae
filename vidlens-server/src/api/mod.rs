//! HTTP and WebSocket surface

mod health;
mod lookup;
mod sse;
mod ws;

pub use health::{health_check, health_routes, HealthResponse};
pub use lookup::lookup_routes;
pub use sse::event_stream;
pub use ws::ws_handler;
