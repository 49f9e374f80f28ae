//! YouTube Data API v3 client
//!
//! API Documentation: https://developers.google.com/youtube/v3/docs

use super::raw::{ChannelRaw, ListResponse, VideoRaw};
use super::{SourceError, SourceResult, VideoSource};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;
use vidlens_common::config::ServiceConfig;

type DirectLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Live [`VideoSource`] backed by the YouTube Data API
///
/// Requests are throttled client-side so a burst of searches does not burn
/// through the daily API quota.
pub struct YouTubeClient {
    client: Client,
    base_url: String,
    api_key: String,
    /// `None` when throttling is disabled (`requests_per_second = 0`)
    rate_limiter: Option<DirectLimiter>,
}

impl YouTubeClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        requests_per_second: u32,
    ) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("vidlens/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let rate_limiter = NonZeroU32::new(requests_per_second)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            rate_limiter,
        })
    }

    /// Build a client from resolved service configuration
    ///
    /// A missing API key is allowed: every call then fails with a 403 from the
    /// API and the workers fall back to empty results.
    pub fn from_config(config: &ServiceConfig) -> SourceResult<Self> {
        Self::new(
            config.api_base_url.clone(),
            config.api_key.clone().unwrap_or_default(),
            Duration::from_secs(config.http_timeout_secs),
            config.requests_per_second,
        )
    }

    async fn get_items<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> SourceResult<Vec<T>> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(endpoint, "Querying YouTube API");

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("{} request failed: {}", endpoint, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(endpoint.to_string()));
        } else if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status(status.as_u16(), body));
        }

        let list: ListResponse<T> = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;
        Ok(list.items)
    }
}

#[async_trait]
impl VideoSource for YouTubeClient {
    async fn search(&self, query: &str, limit: usize) -> SourceResult<Vec<VideoRaw>> {
        self.get_items(
            "search",
            &[
                ("part", "snippet".to_string()),
                ("q", query.to_string()),
                ("type", "video".to_string()),
                ("maxResults", limit.to_string()),
            ],
        )
        .await
    }

    async fn channel_info(&self, channel_id: &str) -> SourceResult<ChannelRaw> {
        let items: Vec<ChannelRaw> = self
            .get_items(
                "channels",
                &[
                    ("part", "snippet,statistics".to_string()),
                    ("id", channel_id.to_string()),
                ],
            )
            .await?;

        items
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::NotFound(format!("channel {}", channel_id)))
    }

    async fn recent_videos(&self, channel_id: &str, limit: usize) -> SourceResult<Vec<VideoRaw>> {
        self.get_items(
            "search",
            &[
                ("part", "snippet".to_string()),
                ("channelId", channel_id.to_string()),
                ("order", "date".to_string()),
                ("type", "video".to_string()),
                ("maxResults", limit.to_string()),
            ],
        )
        .await
    }

    async fn videos_by_tag(&self, tag: &str, limit: usize) -> SourceResult<Vec<VideoRaw>> {
        self.get_items(
            "search",
            &[
                ("part", "snippet".to_string()),
                ("q", tag.to_string()),
                ("type", "video".to_string()),
                ("maxResults", limit.to_string()),
            ],
        )
        .await
    }

    async fn video_details(&self, video_id: &str) -> SourceResult<VideoRaw> {
        let items: Vec<VideoRaw> = self
            .get_items(
                "videos",
                &[
                    ("part", "snippet".to_string()),
                    ("id", video_id.to_string()),
                ],
            )
            .await?;

        items
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::NotFound(format!("video {}", video_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_disables_limiter() {
        let client =
            YouTubeClient::new("http://localhost/", "key", Duration::from_secs(1), 0).unwrap();
        assert!(client.rate_limiter.is_none());
        assert_eq!(client.base_url, "http://localhost");
    }

    #[test]
    fn test_from_default_config() {
        let client = YouTubeClient::from_config(&ServiceConfig::default()).unwrap();
        assert!(client.rate_limiter.is_some());
        assert!(client.api_key.is_empty());
    }
}
