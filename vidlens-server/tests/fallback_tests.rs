//! Degraded replies when a backend worker misbehaves
//!
//! Built-in workers are swapped for stand-ins through `WorkerOverrides`, so
//! each test controls exactly how one backend fails.

mod support;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Semaphore};
use vidlens_common::{SearchBatch, Sentiment};
use vidlens_server::workers::readability::ReadabilityMsg;
use vidlens_server::workers::search::SearchMsg;
use vidlens_server::workers::sentiment::SentimentMsg;
use vidlens_server::workers::word_stats::WordStatsMsg;
use vidlens_server::workers::{
    worker_factory, ClientReply, Inbound, Worker, WorkerFault, WorkerOverrides, WorkerSettings,
};

use support::{start_with, FakeSource};

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

async fn next_reply(rx: &mut mpsc::Receiver<ClientReply>) -> ClientReply {
    tokio::time::timeout(REPLY_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for reply")
        .expect("client channel closed")
}

/// Takes the request and drops its reply channel
struct SilentReadability;

#[async_trait]
impl Worker for SilentReadability {
    type Message = ReadabilityMsg;

    async fn handle(&mut self, msg: ReadabilityMsg) -> Result<(), WorkerFault> {
        let ReadabilityMsg::Score { .. } = msg;
        Ok(())
    }
}

struct SilentSentiment;

#[async_trait]
impl Worker for SilentSentiment {
    type Message = SentimentMsg;

    async fn handle(&mut self, msg: SentimentMsg) -> Result<(), WorkerFault> {
        let SentimentMsg::Analyze { .. } = msg;
        Ok(())
    }
}

/// Fails every message with an invariant violation, which stops it
struct BrokenWordStats;

#[async_trait]
impl Worker for BrokenWordStats {
    type Message = WordStatsMsg;

    async fn handle(&mut self, _msg: WordStatsMsg) -> Result<(), WorkerFault> {
        Err(WorkerFault::invariant_violation("word table corrupted"))
    }
}

/// Holds on to every search request without answering
struct ParkedSearch {
    parked: Vec<oneshot::Sender<SearchBatch>>,
    started: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Worker for ParkedSearch {
    type Message = SearchMsg;

    async fn handle(&mut self, msg: SearchMsg) -> Result<(), WorkerFault> {
        let SearchMsg::Search { term, reply, .. } = msg;
        self.parked.push(reply);
        let _ = self.started.send(term);
        Ok(())
    }
}

/// Blocks its own mailbox until the gate opens
struct GatedSearch {
    gate: Arc<Semaphore>,
    started: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Worker for GatedSearch {
    type Message = SearchMsg;

    async fn handle(&mut self, msg: SearchMsg) -> Result<(), WorkerFault> {
        let SearchMsg::Search { term, reply, .. } = msg;
        let _ = self.started.send(term.clone());
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| WorkerFault::transient(e.to_string()))?;
        let _ = reply.send(SearchBatch::empty(term));
        Ok(())
    }
}

fn cats() -> Arc<FakeSource> {
    Arc::new(FakeSource::with_cat_videos())
}

#[tokio::test]
async fn readability_without_reply_still_sends_one_result() {
    let overrides = WorkerOverrides {
        readability: Some(worker_factory(|| SilentReadability)),
        ..WorkerOverrides::default()
    };
    let supervisor = start_with(cats(), WorkerSettings::default(), overrides);

    let reply = supervisor
        .ask(Inbound::RawQuery("cats".to_string()))
        .await
        .unwrap();

    match reply {
        ClientReply::SearchResults {
            videos,
            aggregate_sentiment,
            average_grade_level,
            average_reading_ease,
            ..
        } => {
            assert_eq!(videos.len(), 3);
            assert!(videos.iter().all(|v| v.readability.is_none()));
            assert!(videos.iter().all(|v| v.sentiment.is_some()));
            assert_eq!(average_grade_level, 0.0);
            assert_eq!(average_reading_ease, 0.0);
            assert_eq!(aggregate_sentiment, Sentiment::Happy);
        }
        other => panic!("expected search results, got {:?}", other),
    }
}

#[tokio::test]
async fn sentiment_without_reply_falls_back_to_neutral() {
    let overrides = WorkerOverrides {
        sentiment: Some(worker_factory(|| SilentSentiment)),
        ..WorkerOverrides::default()
    };
    let supervisor = start_with(cats(), WorkerSettings::default(), overrides);

    let reply = supervisor
        .ask(Inbound::RawQuery("cats".to_string()))
        .await
        .unwrap();

    match reply {
        ClientReply::SearchResults {
            videos,
            aggregate_sentiment,
            sentiment_glyph,
            ..
        } => {
            assert_eq!(videos.len(), 3);
            assert!(videos.iter().all(|v| v.readability.is_some()));
            assert!(videos.iter().all(|v| v.sentiment.is_none()));
            assert_eq!(aggregate_sentiment, Sentiment::Neutral);
            assert_eq!(sentiment_glyph, ":-|");
        }
        other => panic!("expected search results, got {:?}", other),
    }
}

#[tokio::test]
async fn stopped_word_stats_answers_with_error() {
    let overrides = WorkerOverrides {
        word_stats: Some(worker_factory(|| BrokenWordStats)),
        ..WorkerOverrides::default()
    };
    let supervisor = start_with(cats(), WorkerSettings::default(), overrides);

    // The failing request itself gets an error, not silence
    let reply = supervisor.ask(Inbound::CumulativeStatsRequest).await.unwrap();
    assert!(matches!(reply, ClientReply::Error { .. }), "got {:?}", reply);

    let mut stopped = false;
    for _ in 0..40 {
        let status = supervisor.status().await.unwrap();
        if status.iter().any(|s| s.name == "word-stats" && !s.alive) {
            stopped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(stopped, "word-stats was not stopped");

    match supervisor.ask(Inbound::CumulativeStatsRequest).await.unwrap() {
        ClientReply::Error { error } => assert!(error.contains("stopped"), "{}", error),
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn closing_session_mid_query_sends_abort_notice() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let overrides = WorkerOverrides {
        search: Some(worker_factory(move || ParkedSearch {
            parked: Vec::new(),
            started: started_tx.clone(),
        })),
        ..WorkerOverrides::default()
    };
    let supervisor = start_with(cats(), WorkerSettings::default(), overrides);
    let (tx, mut rx) = mpsc::channel(8);
    let session = supervisor.connect(tx).await.unwrap();

    session.send(Inbound::RawQuery("cats".to_string())).await.unwrap();
    let started = tokio::time::timeout(REPLY_TIMEOUT, started_rx.recv()).await.unwrap();
    assert_eq!(started.as_deref(), Some("cats"));

    session.close().await;

    assert_eq!(
        next_reply(&mut rx).await,
        ClientReply::error("Query 'cats' was aborted")
    );
}

#[tokio::test]
async fn full_search_mailbox_does_not_stall_the_session() {
    let gate = Arc::new(Semaphore::new(0));
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let search_gate = gate.clone();
    let overrides = WorkerOverrides {
        search: Some(worker_factory(move || GatedSearch {
            gate: search_gate.clone(),
            started: started_tx.clone(),
        })),
        ..WorkerOverrides::default()
    };
    let settings = WorkerSettings {
        mailbox_capacity: 1,
        ..WorkerSettings::default()
    };
    let supervisor = start_with(cats(), settings, overrides);
    let (tx, mut rx) = mpsc::channel(8);
    let session = supervisor.connect(tx).await.unwrap();

    // "first" occupies the search worker, "second" fills its mailbox
    session.send(Inbound::RawQuery("first".to_string())).await.unwrap();
    let started = tokio::time::timeout(REPLY_TIMEOUT, started_rx.recv()).await.unwrap();
    assert_eq!(started.as_deref(), Some("first"));
    session.send(Inbound::RawQuery("second".to_string())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    session.send(Inbound::RawQuery("third".to_string())).await.unwrap();
    match next_reply(&mut rx).await {
        ClientReply::SearchResults {
            search_term,
            videos,
            ..
        } => {
            assert_eq!(search_term, "third");
            assert!(videos.is_empty());
        }
        other => panic!("expected search results, got {:?}", other),
    }

    gate.add_permits(1);
    let mut terms = HashSet::new();
    for _ in 0..2 {
        match next_reply(&mut rx).await {
            ClientReply::SearchResults { search_term, .. } => {
                terms.insert(search_term);
            }
            other => panic!("expected search results, got {:?}", other),
        }
    }
    assert_eq!(
        terms,
        HashSet::from(["first".to_string(), "second".to_string()])
    );
}
