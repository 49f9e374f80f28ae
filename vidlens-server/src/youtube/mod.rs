//! Video search collaborator
//!
//! Workers only see the [`VideoSource`] trait. [`YouTubeClient`] is the live
//! implementation against the YouTube Data API v3; tests plug in fakes.

mod client;
pub mod raw;

pub use client::YouTubeClient;
pub use raw::{map_channel, map_videos, ChannelRaw, VideoRaw};

use async_trait::async_trait;
use thiserror::Error;

/// Collaborator call failure
///
/// Workers never let these escape; each substitutes its own typed fallback.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API returned status {0}: {1}")]
    Status(u16, String),

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Asynchronous video search API
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Videos matching a free-text query
    async fn search(&self, query: &str, limit: usize) -> SourceResult<Vec<VideoRaw>>;

    /// Metadata and statistics of one channel
    async fn channel_info(&self, channel_id: &str) -> SourceResult<ChannelRaw>;

    /// Most recent uploads of a channel, newest first
    async fn recent_videos(&self, channel_id: &str, limit: usize) -> SourceResult<Vec<VideoRaw>>;

    /// Videos matching a tag
    async fn videos_by_tag(&self, tag: &str, limit: usize) -> SourceResult<Vec<VideoRaw>>;

    /// Full snippet of one video, tags included
    async fn video_details(&self, video_id: &str) -> SourceResult<VideoRaw>;
}
