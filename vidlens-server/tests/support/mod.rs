//! Shared fixtures for vidlens-server integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use vidlens_common::events::EventBus;
use vidlens_server::workers::{Supervisor, WorkerOverrides, WorkerSettings};
use vidlens_server::youtube::raw::{ChannelSnippet, ChannelStatistics, RawId};
use vidlens_server::youtube::{ChannelRaw, SourceError, SourceResult, VideoRaw, VideoSource};

/// In-memory collaborator with switchable failures
#[derive(Default)]
pub struct FakeSource {
    pub videos: Vec<VideoRaw>,
    pub channel: Option<ChannelRaw>,
    pub fail_search: bool,
    pub fail_channel_info: bool,
    pub fail_recent_videos: bool,
    pub fail_tags: bool,
    pub fail_video_details: bool,
    pub calls: AtomicUsize,
    /// `limit` of every search call, in order
    pub search_limits: Mutex<Vec<usize>>,
}

impl FakeSource {
    /// Three videos about cats with one clearly happy description
    pub fn with_cat_videos() -> Self {
        let mut funny = VideoRaw::new(
            "v1",
            "Funny cats",
            "Happy cats playing. They love boxes! So happy and funny.",
            "UC1",
        );
        if let Some(snippet) = funny.snippet.as_mut() {
            snippet.tags = vec!["cats".to_string(), "funny".to_string()];
        }

        Self {
            videos: vec![
                funny,
                VideoRaw::new("v2", "Cat care", "How to brush your cat. Be gentle.", "UC1"),
                VideoRaw::new("v3", "Cats in Canada", "Snow cats in Canada", "UC2"),
            ],
            channel: Some(ChannelRaw {
                id: Some("UC1".to_string()),
                snippet: Some(ChannelSnippet {
                    title: Some("Cat TV".to_string()),
                    description: Some("All cats, all day".to_string()),
                }),
                statistics: Some(ChannelStatistics {
                    subscriber_count: Some("1500".to_string()),
                    view_count: Some("90000".to_string()),
                    video_count: Some("42".to_string()),
                }),
            }),
            ..Self::default()
        }
    }

    pub fn search_limits(&self) -> Vec<usize> {
        self.search_limits.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VideoSource for FakeSource {
    async fn search(&self, _query: &str, limit: usize) -> SourceResult<Vec<VideoRaw>> {
        self.record();
        self.search_limits.lock().unwrap().push(limit);
        if self.fail_search {
            return Err(SourceError::Network("connection refused".to_string()));
        }
        Ok(self.videos.iter().take(limit).cloned().collect())
    }

    async fn channel_info(&self, channel_id: &str) -> SourceResult<ChannelRaw> {
        self.record();
        if self.fail_channel_info {
            return Err(SourceError::Status(403, "quotaExceeded".to_string()));
        }
        self.channel
            .clone()
            .ok_or_else(|| SourceError::NotFound(channel_id.to_string()))
    }

    async fn recent_videos(&self, _channel_id: &str, limit: usize) -> SourceResult<Vec<VideoRaw>> {
        self.record();
        if self.fail_recent_videos {
            return Err(SourceError::Parse("unexpected end of input".to_string()));
        }
        Ok(self.videos.iter().take(limit).cloned().collect())
    }

    async fn videos_by_tag(&self, _tag: &str, limit: usize) -> SourceResult<Vec<VideoRaw>> {
        self.record();
        if self.fail_tags {
            return Err(SourceError::Network("timeout".to_string()));
        }
        Ok(self.videos.iter().take(limit).cloned().collect())
    }

    /// Answers the way `videos.list` does, with a bare string id
    async fn video_details(&self, video_id: &str) -> SourceResult<VideoRaw> {
        self.record();
        if self.fail_video_details {
            return Err(SourceError::Status(500, "backendError".to_string()));
        }
        self.videos
            .iter()
            .find(|v| v.video_id() == Some(video_id))
            .map(|v| VideoRaw {
                id: Some(RawId::Plain(video_id.to_string())),
                snippet: v.snippet.clone(),
            })
            .ok_or_else(|| SourceError::NotFound(video_id.to_string()))
    }
}

pub fn start_supervisor(source: FakeSource) -> Supervisor {
    start_shared(Arc::new(source))
}

/// Keeps a handle on the source so tests can inspect its calls
pub fn start_shared(source: Arc<FakeSource>) -> Supervisor {
    start_with(source, WorkerSettings::default(), WorkerOverrides::default())
}

pub fn start_with(
    source: Arc<FakeSource>,
    settings: WorkerSettings,
    overrides: WorkerOverrides,
) -> Supervisor {
    Supervisor::start_with(settings, source, EventBus::new(100), overrides)
}
