//! Raw YouTube Data API v3 records and their mapping into the data model

use serde::{Deserialize, Serialize};
use vidlens_common::{ChannelProfile, VideoResult};

/// `{"items": [...]}` envelope shared by every list endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// `id` is an object for search results and a bare string for `videos.list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Nested {
        #[serde(rename = "videoId", default)]
        video_id: Option<String>,
    },
    Plain(String),
}

impl RawId {
    fn video_id(&self) -> Option<&str> {
        match self {
            RawId::Nested { video_id } => video_id.as_deref(),
            RawId::Plain(id) => Some(id.as_str()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawThumbnail {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawThumbnails {
    #[serde(default)]
    pub default: Option<RawThumbnail>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSnippet {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub channel_title: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub thumbnails: Option<RawThumbnails>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One video item as returned by `search.list` or `videos.list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRaw {
    #[serde(default)]
    pub id: Option<RawId>,
    #[serde(default)]
    pub snippet: Option<RawSnippet>,
}

impl VideoRaw {
    /// Minimal record with the fields the enrichment pipeline reads
    pub fn new(video_id: &str, title: &str, description: &str, channel_id: &str) -> Self {
        Self {
            id: Some(RawId::Nested {
                video_id: Some(video_id.to_string()),
            }),
            snippet: Some(RawSnippet {
                title: Some(title.to_string()),
                description: Some(description.to_string()),
                channel_id: Some(channel_id.to_string()),
                ..RawSnippet::default()
            }),
        }
    }

    pub fn video_id(&self) -> Option<&str> {
        self.id.as_ref().and_then(RawId::video_id).filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnippet {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Channel counters; the API reports them as decimal strings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatistics {
    #[serde(default)]
    pub subscriber_count: Option<String>,
    #[serde(default)]
    pub view_count: Option<String>,
    #[serde(default)]
    pub video_count: Option<String>,
}

/// One channel item as returned by `channels.list`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelRaw {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub snippet: Option<ChannelSnippet>,
    #[serde(default)]
    pub statistics: Option<ChannelStatistics>,
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn counter(value: &Option<String>) -> u64 {
    value
        .as_deref()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

/// Map raw items into un-enriched videos, skipping items without a video id
pub fn map_videos(raws: Vec<VideoRaw>) -> Vec<VideoResult> {
    raws.into_iter()
        .filter_map(|raw| {
            let video_id = raw.video_id()?.to_string();
            let snippet = raw.snippet.unwrap_or_default();
            let thumbnail_url = snippet
                .thumbnails
                .as_ref()
                .and_then(|t| t.default.as_ref())
                .map(|t| text(&t.url))
                .unwrap_or_default();

            let mut video = VideoResult::new(
                text(&snippet.title),
                text(&snippet.description),
                text(&snippet.channel_id),
                video_id,
            );
            video.thumbnail_url = thumbnail_url;
            video.channel_title = text(&snippet.channel_title);
            video.published_date = text(&snippet.published_at);
            video.tags = snippet.tags;
            Some(video)
        })
        .collect()
}

/// Map a raw channel record; `requested_id` fills in a missing `id`
pub fn map_channel(raw: ChannelRaw, requested_id: &str) -> ChannelProfile {
    let snippet = raw.snippet.unwrap_or_default();
    let stats = raw.statistics.unwrap_or_default();

    ChannelProfile {
        name: text(&snippet.title),
        description: text(&snippet.description),
        subscriber_count: counter(&stats.subscriber_count),
        view_count: counter(&stats.view_count),
        video_count: counter(&stats.video_count),
        channel_id: raw.id.unwrap_or_else(|| requested_id.to_string()),
    }
}
