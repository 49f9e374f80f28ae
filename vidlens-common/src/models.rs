//! Data model for search results, channel profiles and word statistics
//!
//! All records are immutable once built. Enrichment (readability scores,
//! sentiment counts) is attached through consuming builders that return a
//! new value, so a batch handed to one worker is never mutated under another.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Readability scores derived from a video description
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadabilityScores {
    pub flesch_kincaid_grade: f64,
    pub flesch_reading_ease: f64,
}

impl ReadabilityScores {
    /// Scores reported for a missing or empty description
    pub const ZERO: ReadabilityScores = ReadabilityScores {
        flesch_kincaid_grade: 0.0,
        flesch_reading_ease: 0.0,
    };
}

/// Per-video sentiment word counts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSentiment {
    pub happy_word_count: f64,
    pub sad_word_count: f64,
    pub sentiment_label: Sentiment,
}

/// A single video as returned by the search collaborator
///
/// Enrichment fields are absent (not defaulted) until computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResult {
    pub title: String,
    pub description: String,
    pub channel_id: String,
    pub video_id: String,
    pub thumbnail_url: String,
    pub channel_title: String,
    pub published_date: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub readability: Option<ReadabilityScores>,
    #[serde(flatten)]
    pub sentiment: Option<VideoSentiment>,
}

impl VideoResult {
    /// Create an un-enriched video record
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        channel_id: impl Into<String>,
        video_id: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            channel_id: channel_id.into(),
            video_id: video_id.into(),
            thumbnail_url: String::new(),
            channel_title: String::new(),
            published_date: String::new(),
            tags: Vec::new(),
            readability: None,
            sentiment: None,
        }
    }

    /// Return a copy of this video with readability scores attached
    pub fn with_readability(mut self, scores: ReadabilityScores) -> Self {
        self.readability = Some(scores);
        self
    }

    /// Return a copy of this video with sentiment counts attached
    pub fn with_sentiment(mut self, sentiment: VideoSentiment) -> Self {
        self.sentiment = Some(sentiment);
        self
    }

    /// Title and description joined for word statistics
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// Channel metadata shown on a channel profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfile {
    pub name: String,
    pub description: String,
    pub subscriber_count: u64,
    pub view_count: u64,
    pub video_count: u64,
    pub channel_id: String,
}

impl ChannelProfile {
    /// Sentinel profile substituted when the metadata fetch fails
    pub fn unavailable(channel_id: impl Into<String>) -> Self {
        Self {
            name: "Unavailable".to_string(),
            description: "No description available".to_string(),
            subscriber_count: 0,
            view_count: 0,
            video_count: 0,
            channel_id: channel_id.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.name == "Unavailable"
            && self.subscriber_count == 0
            && self.view_count == 0
            && self.video_count == 0
    }
}

/// One query's unit of work carried through the enrichment pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchBatch {
    pub search_term: String,
    pub videos: Vec<VideoResult>,
}

impl SearchBatch {
    pub fn new(search_term: impl Into<String>, videos: Vec<VideoResult>) -> Self {
        Self {
            search_term: search_term.into(),
            videos,
        }
    }

    /// Batch with the term preserved and no videos (collaborator fallback)
    pub fn empty(search_term: impl Into<String>) -> Self {
        Self::new(search_term, Vec::new())
    }

    /// Title + description of every video, in batch order
    pub fn texts(&self) -> Vec<String> {
        self.videos.iter().map(VideoResult::text).collect()
    }
}

/// Aggregate emotional tone of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Happy,
    Sad,
    Neutral,
    /// No input at all (distinct from balanced input)
    Unavailable,
}

impl Sentiment {
    /// Glyph shown to clients
    pub fn glyph(&self) -> &'static str {
        match self {
            Sentiment::Happy => ":-)",
            Sentiment::Sad => ":-(",
            Sentiment::Neutral => ":-|",
            Sentiment::Unavailable => "N/A",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sentiment::Happy => "happy",
            Sentiment::Sad => "sad",
            Sentiment::Neutral => "neutral",
            Sentiment::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// One entry of a word-frequency snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCount {
    pub word: String,
    pub count: u64,
}

impl WordCount {
    pub fn new(word: impl Into<String>, count: u64) -> Self {
        Self {
            word: word.into(),
            count,
        }
    }
}
