//! RequestCoordinator: drives search queries for one client session
//!
//! A query moves through three messages on the coordinator's own mailbox:
//! the search result, then the readability and sentiment reports in whichever
//! order they finish. Once both reports (or their fallbacks) are in, exactly
//! one `SearchResults` reply goes to the client.
//!
//! The coordinator also remembers the session's last [`HISTORY_SIZE`]
//! distinct search terms with the videos they returned.

use super::mailbox::{pipe_to, WeakWorkerRef, Worker, WorkerRef};
use super::messages::{ClientChannel, ClientReply, SearchHistoryEntry};
use super::policy::WorkerFault;
use super::readability::{ReadabilityMsg, ReadabilityReport};
use super::search::SearchMsg;
use super::sentiment::{SentimentMsg, SentimentReport};
use super::word_stats::WordStatsMsg;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use vidlens_common::events::{EventBus, ServiceEvent};
use vidlens_common::{SearchBatch, Sentiment, VideoResult};

/// Query ids are unique across sessions and incarnations, so a reply that
/// outlives the instance that asked for it can never match a newer query.
static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// Distinct search terms remembered per session
pub const HISTORY_SIZE: usize = 10;

pub enum CoordinatorMsg {
    Query(String),
    SearchCompleted {
        query_id: u64,
        batch: Option<SearchBatch>,
    },
    ReadabilityCompleted {
        query_id: u64,
        report: Option<ReadabilityReport>,
    },
    SentimentCompleted {
        query_id: u64,
        report: Option<SentimentReport>,
    },
    /// Reply to the client with the session's search history
    History,
}

/// Addresses of the backend workers a coordinator talks to
#[derive(Clone)]
pub struct Backends {
    pub search: WorkerRef<SearchMsg>,
    pub readability: WorkerRef<ReadabilityMsg>,
    pub sentiment: WorkerRef<SentimentMsg>,
    pub word_stats: WorkerRef<WordStatsMsg>,
}

enum Partial<T> {
    Waiting,
    Arrived(T),
    Failed,
}

impl<T> Partial<T> {
    fn from_reply(reply: Option<T>) -> Self {
        match reply {
            Some(value) => Partial::Arrived(value),
            None => Partial::Failed,
        }
    }

    fn is_waiting(&self) -> bool {
        matches!(self, Partial::Waiting)
    }
}

struct PendingQuery {
    term: String,
    batch: Option<Arc<SearchBatch>>,
    readability: Partial<ReadabilityReport>,
    sentiment: Partial<SentimentReport>,
}

pub struct RequestCoordinator {
    session_id: String,
    self_ref: WeakWorkerRef<CoordinatorMsg>,
    backends: Backends,
    client: ClientChannel,
    events: EventBus,
    pending: HashMap<u64, PendingQuery>,
    /// Oldest first
    history: VecDeque<SearchHistoryEntry>,
}

impl RequestCoordinator {
    pub fn new(
        session_id: impl Into<String>,
        self_ref: WeakWorkerRef<CoordinatorMsg>,
        backends: Backends,
        client: ClientChannel,
        events: EventBus,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            self_ref,
            backends,
            client,
            events,
            pending: HashMap::new(),
            history: VecDeque::with_capacity(HISTORY_SIZE),
        }
    }

    /// A repeated term keeps its place and takes the newer videos
    fn remember(&mut self, search_term: &str, videos: &[VideoResult]) {
        if search_term.trim().is_empty() {
            return;
        }
        if let Some(entry) = self.history.iter_mut().find(|e| e.search_term == search_term) {
            entry.videos = videos.to_vec();
            return;
        }
        if self.history.len() == HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(SearchHistoryEntry {
            search_term: search_term.to_string(),
            videos: videos.to_vec(),
        });
    }

    async fn on_history(&mut self) -> Result<(), WorkerFault> {
        let searches = self.history.iter().rev().cloned().collect();
        self.client
            .deliver(ClientReply::SearchHistory { searches })
            .await;
        Ok(())
    }

    async fn on_query(&mut self, term: String) -> Result<(), WorkerFault> {
        let query_id = NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed);
        debug!(session = %self.session_id, query_id, term = %term, "Query received");

        self.pending.insert(
            query_id,
            PendingQuery {
                term: term.clone(),
                batch: None,
                readability: Partial::Waiting,
                sentiment: Partial::Waiting,
            },
        );

        // Never wait on a full search mailbox; degrade like a failed search
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self.backends.search.try_tell(SearchMsg::Search {
            term,
            limit: None,
            reply: reply_tx,
        });

        match sent {
            Ok(()) => {
                pipe_to(reply_rx, self.self_ref.clone(), move |batch| {
                    CoordinatorMsg::SearchCompleted { query_id, batch }
                });
                Ok(())
            }
            Err(e) => {
                warn!(session = %self.session_id, "Search worker unreachable: {}", e);
                self.on_search_batch(query_id, None).await
            }
        }
    }

    async fn on_search_batch(
        &mut self,
        query_id: u64,
        batch: Option<SearchBatch>,
    ) -> Result<(), WorkerFault> {
        let Some(pending) = self.pending.get_mut(&query_id) else {
            debug!(query_id, "Stale search result ignored");
            return Ok(());
        };
        if pending.batch.is_some() {
            return Err(WorkerFault::invariant_violation(format!(
                "duplicate search result for query {}",
                query_id
            )));
        }

        let batch = Arc::new(batch.unwrap_or_else(|| {
            warn!(term = %pending.term, "Search produced no batch, continuing with empty result");
            SearchBatch::empty(pending.term.clone())
        }));
        pending.batch = Some(batch.clone());

        // Side channel: never awaited, never surfaced to the client
        if !batch.videos.is_empty() {
            let merge = WordStatsMsg::Merge {
                texts: batch.texts(),
                reply: None,
            };
            if let Err(e) = self.backends.word_stats.try_tell(merge) {
                warn!(term = %batch.search_term, "Word statistics update dropped: {}", e);
            }
        }

        let (readability_tx, readability_rx) = oneshot::channel();
        let readability_sent = self.backends.readability.try_tell(ReadabilityMsg::Score {
            batch: batch.clone(),
            reply: readability_tx,
        });

        let (sentiment_tx, sentiment_rx) = oneshot::channel();
        let sentiment_sent = self.backends.sentiment.try_tell(SentimentMsg::Analyze {
            batch: batch.clone(),
            reply: sentiment_tx,
        });

        if let Some(pending) = self.pending.get_mut(&query_id) {
            match readability_sent {
                Ok(()) => pipe_to(readability_rx, self.self_ref.clone(), move |report| {
                    CoordinatorMsg::ReadabilityCompleted { query_id, report }
                }),
                Err(e) => {
                    warn!("Readability unavailable: {}", e);
                    pending.readability = Partial::Failed;
                }
            }
            match sentiment_sent {
                Ok(()) => pipe_to(sentiment_rx, self.self_ref.clone(), move |report| {
                    CoordinatorMsg::SentimentCompleted { query_id, report }
                }),
                Err(e) => {
                    warn!("Sentiment unavailable: {}", e);
                    pending.sentiment = Partial::Failed;
                }
            }
        }

        self.finish_if_ready(query_id).await;
        Ok(())
    }

    /// `Ok(None)` for a query this instance does not know (a stale reply)
    fn pending_after_search(
        &mut self,
        query_id: u64,
    ) -> Result<Option<&mut PendingQuery>, WorkerFault> {
        match self.pending.get_mut(&query_id) {
            None => {
                debug!(query_id, "Stale enrichment result ignored");
                Ok(None)
            }
            Some(pending) if pending.batch.is_some() => Ok(Some(pending)),
            Some(_) => Err(WorkerFault::invariant_violation(format!(
                "enrichment result for query {} before its search result",
                query_id
            ))),
        }
    }

    async fn finish_if_ready(&mut self, query_id: u64) {
        let ready = self
            .pending
            .get(&query_id)
            .is_some_and(|p| p.batch.is_some() && !p.readability.is_waiting() && !p.sentiment.is_waiting());
        if !ready {
            return;
        }
        let Some(pending) = self.pending.remove(&query_id) else {
            return;
        };
        let Some(batch) = pending.batch else {
            return;
        };

        let (videos, average_grade_level, average_reading_ease) = match pending.readability {
            Partial::Arrived(report) => (
                report.videos,
                report.average_grade_level,
                report.average_reading_ease,
            ),
            _ => {
                warn!(term = %pending.term, "Readability failed, replying without scores");
                (batch.videos.clone(), 0.0, 0.0)
            }
        };

        let (label, per_video) = match pending.sentiment {
            Partial::Arrived(report) => (report.label, report.per_video),
            _ => {
                warn!(term = %pending.term, "Sentiment failed, replying neutral");
                (Sentiment::Neutral, Vec::new())
            }
        };

        let videos: Vec<_> = videos
            .into_iter()
            .enumerate()
            .map(|(i, video)| match per_video.get(i) {
                Some(sentiment) => video.with_sentiment(*sentiment),
                None => video,
            })
            .collect();
        let video_count = videos.len();
        self.remember(&batch.search_term, &videos);

        let reply = ClientReply::SearchResults {
            search_term: batch.search_term.clone(),
            videos,
            aggregate_sentiment: label,
            sentiment_glyph: label.glyph().to_string(),
            average_grade_level,
            average_reading_ease,
        };

        info!(
            session = %self.session_id,
            term = %batch.search_term,
            videos = video_count,
            sentiment = %label,
            "Query completed"
        );
        self.client.deliver(reply).await;
        self.events.emit_lossy(ServiceEvent::QueryCompleted {
            search_term: batch.search_term.clone(),
            video_count,
            sentiment: label,
            timestamp: Utc::now(),
        });
    }
}

#[async_trait]
impl Worker for RequestCoordinator {
    type Message = CoordinatorMsg;

    async fn handle(&mut self, msg: CoordinatorMsg) -> Result<(), WorkerFault> {
        match msg {
            CoordinatorMsg::Query(term) => self.on_query(term).await,
            CoordinatorMsg::SearchCompleted { query_id, batch } => {
                self.on_search_batch(query_id, batch).await
            }
            CoordinatorMsg::ReadabilityCompleted { query_id, report } => {
                let Some(pending) = self.pending_after_search(query_id)? else {
                    return Ok(());
                };
                if !pending.readability.is_waiting() {
                    return Err(WorkerFault::invariant_violation(format!(
                        "duplicate readability result for query {}",
                        query_id
                    )));
                }
                pending.readability = Partial::from_reply(report);
                self.finish_if_ready(query_id).await;
                Ok(())
            }
            CoordinatorMsg::SentimentCompleted { query_id, report } => {
                let Some(pending) = self.pending_after_search(query_id)? else {
                    return Ok(());
                };
                if !pending.sentiment.is_waiting() {
                    return Err(WorkerFault::invariant_violation(format!(
                        "duplicate sentiment result for query {}",
                        query_id
                    )));
                }
                pending.sentiment = Partial::from_reply(report);
                self.finish_if_ready(query_id).await;
                Ok(())
            }
            CoordinatorMsg::History => self.on_history().await,
        }
    }
}

impl Drop for RequestCoordinator {
    /// Queries still in flight when this instance goes away (restart, stop or
    /// session close) are answered with an error so no query is left silent.
    fn drop(&mut self) {
        for (_, pending) in self.pending.drain() {
            let reply = ClientReply::error(format!("Query '{}' was aborted", pending.term));
            if !self.client.try_deliver(reply) {
                debug!(term = %pending.term, "Abort notice not delivered");
            }
        }
    }
}
