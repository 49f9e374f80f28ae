//! Health check endpoint with per-worker supervision status

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::workers::ChildStatusSnapshot;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", "degraded" (some worker stopped) or "error" (supervisor unreachable)
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub workers: Vec<ChildStatusSnapshot>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let (status, workers) = match state.supervisor.status().await {
        Ok(workers) if workers.iter().all(|w| w.alive) => ("ok", workers),
        Ok(workers) => ("degraded", workers),
        Err(_) => ("error", Vec::new()),
    };

    Json(HealthResponse {
        status: status.to_string(),
        module: "vidlens-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        workers,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
