//! vidlens-server library interface
//!
//! Exposes the worker tree, the collaborator client and the router for
//! integration testing.

pub mod api;
pub mod error;
pub mod workers;
pub mod youtube;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use vidlens_common::events::EventBus;
use workers::Supervisor;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Supervisor,
    /// Event bus for SSE broadcasting
    pub events: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(supervisor: Supervisor) -> Self {
        let events = supervisor.events().clone();
        Self {
            supervisor,
            events,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .route("/ws", get(api::ws_handler))
        .route("/events", get(api::event_stream))
        .merge(api::lookup_routes())
        .merge(api::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
