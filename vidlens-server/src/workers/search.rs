//! SearchWorker: free-text query against the video search collaborator

use super::mailbox::Worker;
use super::policy::WorkerFault;
use crate::youtube::{map_videos, VideoSource};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use vidlens_common::SearchBatch;

pub enum SearchMsg {
    /// `limit` overrides the configured result count
    Search {
        term: String,
        limit: Option<usize>,
        reply: oneshot::Sender<SearchBatch>,
    },
}

/// Stateless; each query's collaborator call runs on its own task so the
/// mailbox keeps moving while requests are in flight.
pub struct SearchWorker {
    source: Arc<dyn VideoSource>,
    limit: usize,
}

impl SearchWorker {
    pub fn new(source: Arc<dyn VideoSource>, limit: usize) -> Self {
        Self { source, limit }
    }
}

#[async_trait]
impl Worker for SearchWorker {
    type Message = SearchMsg;

    async fn handle(&mut self, msg: SearchMsg) -> Result<(), WorkerFault> {
        let SearchMsg::Search { term, limit, reply } = msg;

        if term.trim().is_empty() {
            debug!("Blank search term, replying with empty batch");
            let _ = reply.send(SearchBatch::empty(term));
            return Ok(());
        }

        let source = self.source.clone();
        let limit = limit.unwrap_or(self.limit);
        tokio::spawn(async move {
            let batch = match source.search(&term, limit).await {
                Ok(raws) => SearchBatch::new(term, map_videos(raws)),
                Err(e) => {
                    warn!(term = %term, "Search failed, using empty result: {}", e);
                    SearchBatch::empty(term)
                }
            };
            debug!(term = %batch.search_term, videos = batch.videos.len(), "Search completed");
            let _ = reply.send(batch);
        });
        Ok(())
    }
}
