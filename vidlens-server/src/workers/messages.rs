//! Client-facing message vocabulary
//!
//! [`Inbound`] is what a client can ask for; [`ClientReply`] is the single
//! terminal answer each request receives.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use vidlens_common::{ChannelProfile, Sentiment, VideoResult, WordCount};

/// Requests routed by the supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    RawQuery(String),
    TagLookup(String),
    ChannelProfileRequest(String),
    WordFrequencyBatch(Vec<String>),
    CumulativeStatsRequest,
    /// Search a term and merge the results into the cumulative statistics
    WordStatsForQuery(String),
    /// Full record (including tags) of one video
    VideoDetailsRequest(String),
    /// Recent searches of the requesting session
    SearchHistory,
    /// Anything the protocol does not define; carries the offending type name
    Unrecognized(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Frame {
    Search {
        term: String,
    },
    Tag {
        tag: String,
    },
    Channel {
        #[serde(rename = "channelId")]
        channel_id: String,
    },
    WordBatch {
        #[serde(default)]
        texts: Vec<String>,
    },
    WordStats {
        #[serde(default)]
        query: Option<String>,
    },
    Video {
        #[serde(rename = "videoId")]
        video_id: String,
    },
    History {},
}

impl From<Frame> for Inbound {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Search { term } => Inbound::RawQuery(term),
            Frame::Tag { tag } => Inbound::TagLookup(tag),
            Frame::Channel { channel_id } => Inbound::ChannelProfileRequest(channel_id),
            Frame::WordBatch { texts } => Inbound::WordFrequencyBatch(texts),
            Frame::WordStats { query: Some(query) } if !query.trim().is_empty() => {
                Inbound::WordStatsForQuery(query)
            }
            Frame::WordStats { .. } => Inbound::CumulativeStatsRequest,
            Frame::Video { video_id } => Inbound::VideoDetailsRequest(video_id),
            Frame::History {} => Inbound::SearchHistory,
        }
    }
}

impl Inbound {
    /// Decode one WebSocket text frame
    ///
    /// JSON objects are dispatched on their `type` field. Any other frame is a
    /// bare search query.
    pub fn from_frame(text: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value @ serde_json::Value::Object(_)) => {
                let type_name = value
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("<missing>")
                    .to_string();
                match serde_json::from_value::<Frame>(value) {
                    Ok(frame) => frame.into(),
                    Err(e) => {
                        debug!("Unrecognized frame type '{}': {}", type_name, e);
                        Inbound::Unrecognized(type_name)
                    }
                }
            }
            Ok(serde_json::Value::String(term)) => Inbound::RawQuery(term),
            _ => Inbound::RawQuery(text.trim().to_string()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Inbound::RawQuery(_) => "RawQuery",
            Inbound::TagLookup(_) => "TagLookup",
            Inbound::ChannelProfileRequest(_) => "ChannelProfileRequest",
            Inbound::WordFrequencyBatch(_) => "WordFrequencyBatch",
            Inbound::CumulativeStatsRequest => "CumulativeStatsRequest",
            Inbound::WordStatsForQuery(_) => "WordStatsForQuery",
            Inbound::VideoDetailsRequest(_) => "VideoDetailsRequest",
            Inbound::SearchHistory => "SearchHistory",
            Inbound::Unrecognized(_) => "Unrecognized",
        }
    }
}

/// Terminal reply delivered to a client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientReply {
    #[serde(rename_all = "camelCase")]
    SearchResults {
        search_term: String,
        videos: Vec<VideoResult>,
        aggregate_sentiment: Sentiment,
        sentiment_glyph: String,
        average_grade_level: f64,
        average_reading_ease: f64,
    },
    #[serde(rename_all = "camelCase")]
    TagResults { tag: String, videos: Vec<VideoResult> },
    #[serde(rename_all = "camelCase")]
    ChannelProfile {
        channel_info: ChannelProfile,
        videos: Vec<VideoResult>,
    },
    #[serde(rename_all = "camelCase")]
    WordStats { word_stats: Vec<WordCount> },
    /// Snapshot taken right after merging one query's videos
    #[serde(rename_all = "camelCase")]
    QueryWordStats {
        search_term: String,
        word_stats: Vec<WordCount>,
    },
    /// `video` is `None` when the video is unknown or the lookup failed
    #[serde(rename_all = "camelCase")]
    VideoDetails {
        video_id: String,
        video: Option<VideoResult>,
    },
    /// Newest first
    #[serde(rename_all = "camelCase")]
    SearchHistory { searches: Vec<SearchHistoryEntry> },
    Error { error: String },
}

/// One remembered search of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHistoryEntry {
    pub search_term: String,
    pub videos: Vec<VideoResult>,
}

impl ClientReply {
    pub fn error(message: impl Into<String>) -> Self {
        ClientReply::Error {
            error: message.into(),
        }
    }

    pub fn unknown_message_type() -> Self {
        Self::error("Unknown message type")
    }
}

/// Outbound side of one client connection
#[derive(Clone, Debug)]
pub struct ClientChannel {
    tx: mpsc::Sender<ClientReply>,
}

impl ClientChannel {
    pub fn new(tx: mpsc::Sender<ClientReply>) -> Self {
        Self { tx }
    }

    /// Returns false when the client has gone away
    pub async fn deliver(&self, reply: ClientReply) -> bool {
        if self.tx.send(reply).await.is_err() {
            debug!("Client channel closed, reply dropped");
            return false;
        }
        true
    }

    pub fn try_deliver(&self, reply: ClientReply) -> bool {
        self.tx.try_send(reply).is_ok()
    }
}
