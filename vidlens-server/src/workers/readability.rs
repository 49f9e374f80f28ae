//! ReadabilityWorker: Flesch scores for every video of a batch

use super::mailbox::Worker;
use super::policy::WorkerFault;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::oneshot;
use vidlens_common::text::{readability_scores, round2};
use vidlens_common::{SearchBatch, VideoResult};

/// Videos averaged for the batch-level scores
const AVERAGE_VIDEO_CAP: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct ReadabilityReport {
    /// Copies of the batch's videos with scores attached, in batch order
    pub videos: Vec<VideoResult>,
    pub average_grade_level: f64,
    pub average_reading_ease: f64,
}

pub enum ReadabilityMsg {
    Score {
        batch: Arc<SearchBatch>,
        reply: oneshot::Sender<ReadabilityReport>,
    },
}

#[derive(Default)]
pub struct ReadabilityWorker;

impl ReadabilityWorker {
    pub fn new() -> Self {
        Self
    }

    /// Score a batch without touching the shared input
    pub fn score(batch: &SearchBatch) -> Result<ReadabilityReport, WorkerFault> {
        let mut videos = Vec::with_capacity(batch.videos.len());
        for video in &batch.videos {
            let scores = readability_scores(Some(video.description.as_str()));
            if !scores.flesch_kincaid_grade.is_finite() || !scores.flesch_reading_ease.is_finite() {
                return Err(WorkerFault::invariant_violation(format!(
                    "non-finite readability score for video {}",
                    video.video_id
                )));
            }
            videos.push(video.clone().with_readability(scores));
        }

        let sample: Vec<_> = videos
            .iter()
            .take(AVERAGE_VIDEO_CAP)
            .filter_map(|v| v.readability)
            .collect();
        let (average_grade_level, average_reading_ease) = if sample.is_empty() {
            (0.0, 0.0)
        } else {
            let n = sample.len() as f64;
            (
                round2(sample.iter().map(|s| s.flesch_kincaid_grade).sum::<f64>() / n),
                round2(sample.iter().map(|s| s.flesch_reading_ease).sum::<f64>() / n),
            )
        };

        Ok(ReadabilityReport {
            videos,
            average_grade_level,
            average_reading_ease,
        })
    }
}

#[async_trait]
impl Worker for ReadabilityWorker {
    type Message = ReadabilityMsg;

    async fn handle(&mut self, msg: ReadabilityMsg) -> Result<(), WorkerFault> {
        let ReadabilityMsg::Score { batch, reply } = msg;
        let report = Self::score(&batch)?;
        let _ = reply.send(report);
        Ok(())
    }
}
