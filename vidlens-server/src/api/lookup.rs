//! Request/response lookups served through the supervisor
//!
//! Each handler opens a throwaway session, so HTTP callers get the same
//! replies and fallbacks as WebSocket clients.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::workers::{ClientReply, Inbound};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct WordStatsParams {
    pub query: Option<String>,
}

async fn ask(state: &AppState, message: Inbound) -> ApiResult<Json<ClientReply>> {
    match state.supervisor.ask(message).await? {
        ClientReply::Error { error } => Err(ApiError::Unavailable(error)),
        reply => Ok(Json(reply)),
    }
}

/// GET /api/search?q=term
async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<ClientReply>> {
    if params.q.trim().is_empty() {
        return Err(ApiError::BadRequest("query parameter 'q' is required".to_string()));
    }
    ask(&state, Inbound::RawQuery(params.q)).await
}

/// GET /api/word-stats[?query=term]
///
/// With a query, its videos are merged into the table before the snapshot.
async fn word_stats(
    State(state): State<AppState>,
    Query(params): Query<WordStatsParams>,
) -> ApiResult<Json<ClientReply>> {
    let message = match params.query {
        Some(query) if !query.trim().is_empty() => Inbound::WordStatsForQuery(query),
        _ => Inbound::CumulativeStatsRequest,
    };
    ask(&state, message).await
}

/// GET /api/videos/:video_id
async fn video_details(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<ClientReply>> {
    match ask(&state, Inbound::VideoDetailsRequest(video_id)).await? {
        Json(ClientReply::VideoDetails {
            video_id,
            video: None,
        }) => Err(ApiError::NotFound(format!("video '{}'", video_id))),
        reply => Ok(reply),
    }
}

/// GET /api/tags/:tag
async fn tag_lookup(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> ApiResult<Json<ClientReply>> {
    ask(&state, Inbound::TagLookup(tag)).await
}

/// GET /api/channels/:channel_id
async fn channel_profile(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> ApiResult<Json<ClientReply>> {
    ask(&state, Inbound::ChannelProfileRequest(channel_id)).await
}

pub fn lookup_routes() -> Router<AppState> {
    Router::new()
        .route("/api/search", get(search))
        .route("/api/word-stats", get(word_stats))
        .route("/api/videos/:video_id", get(video_details))
        .route("/api/tags/:tag", get(tag_lookup))
        .route("/api/channels/:channel_id", get(channel_profile))
}
