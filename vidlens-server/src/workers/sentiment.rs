//! SentimentWorker: aggregate tone of a batch from fixed word lists

use super::mailbox::Worker;
use super::policy::WorkerFault;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;
use vidlens_common::models::VideoSentiment;
use vidlens_common::text::{classify, happy_word_count, sad_word_count, SENTIMENT_VIDEO_CAP};
use vidlens_common::{SearchBatch, Sentiment};

#[derive(Debug, Clone, PartialEq)]
pub struct SentimentReport {
    pub label: Sentiment,
    /// Counts for the first videos of the batch, in batch order
    pub per_video: Vec<VideoSentiment>,
    pub happy_total: f64,
    pub sad_total: f64,
}

impl SentimentReport {
    /// Report for a batch with no videos at all
    pub fn unavailable() -> Self {
        Self {
            label: Sentiment::Unavailable,
            per_video: Vec::new(),
            happy_total: 0.0,
            sad_total: 0.0,
        }
    }
}

pub enum SentimentMsg {
    Analyze {
        batch: Arc<SearchBatch>,
        reply: oneshot::Sender<SentimentReport>,
    },
}

#[derive(Default)]
pub struct SentimentWorker;

impl SentimentWorker {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(batch: &SearchBatch) -> SentimentReport {
        if batch.videos.is_empty() {
            return SentimentReport::unavailable();
        }

        let per_video: Vec<VideoSentiment> = batch
            .videos
            .iter()
            .take(SENTIMENT_VIDEO_CAP)
            .map(|video| {
                let happy = happy_word_count(&video.description) as f64;
                let sad = sad_word_count(&video.description) as f64;
                VideoSentiment {
                    happy_word_count: happy,
                    sad_word_count: sad,
                    sentiment_label: classify(happy, sad),
                }
            })
            .collect();

        let happy_total: f64 = per_video.iter().map(|s| s.happy_word_count).sum();
        let sad_total: f64 = per_video.iter().map(|s| s.sad_word_count).sum();
        let label = classify(happy_total, sad_total);
        debug!(term = %batch.search_term, happy_total, sad_total, %label, "Batch sentiment");

        SentimentReport {
            label,
            per_video,
            happy_total,
            sad_total,
        }
    }
}

#[async_trait]
impl Worker for SentimentWorker {
    type Message = SentimentMsg;

    async fn handle(&mut self, msg: SentimentMsg) -> Result<(), WorkerFault> {
        let SentimentMsg::Analyze { batch, reply } = msg;
        let _ = reply.send(Self::analyze(&batch));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidlens_common::VideoResult;

    fn batch_of(descriptions: &[&str]) -> SearchBatch {
        let videos = descriptions
            .iter()
            .enumerate()
            .map(|(i, d)| VideoResult::new("t", *d, "c", format!("v{}", i)))
            .collect();
        SearchBatch::new("q", videos)
    }

    #[test]
    fn test_empty_batch_is_unavailable() {
        let report = SentimentWorker::analyze(&SearchBatch::empty("q"));
        assert_eq!(report.label, Sentiment::Unavailable);
    }

    #[test]
    fn test_happy_majority() {
        let report = SentimentWorker::analyze(&batch_of(&["happy happy happy happy sad"]));
        assert_eq!(report.label, Sentiment::Happy);
        assert_eq!(report.happy_total, 4.0);
        assert_eq!(report.sad_total, 1.0);
    }

    #[test]
    fn test_no_matches_is_neutral() {
        let report = SentimentWorker::analyze(&batch_of(&["plain words only"]));
        assert_eq!(report.label, Sentiment::Neutral);
    }

    #[test]
    fn test_only_first_fifty_videos_counted() {
        let mut descriptions = vec!["plain"; 50];
        descriptions.extend(vec!["sad sad sad"; 10]);
        let report = SentimentWorker::analyze(&batch_of(&descriptions));
        assert_eq!(report.per_video.len(), 50);
        assert_eq!(report.sad_total, 0.0);
        assert_eq!(report.label, Sentiment::Neutral);
    }
}
