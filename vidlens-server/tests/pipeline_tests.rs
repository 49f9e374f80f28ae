//! End-to-end request flows through the supervised worker tree

mod support;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use vidlens_common::events::ServiceEvent;
use vidlens_common::{Sentiment, WordCount};
use vidlens_server::workers::{ClientReply, ClientSession, Inbound};

use support::{start_shared, start_supervisor, FakeSource};

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

async fn next_reply(rx: &mut mpsc::Receiver<ClientReply>) -> ClientReply {
    tokio::time::timeout(REPLY_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for reply")
        .expect("client channel closed")
}

async fn assert_no_more_replies(rx: &mut mpsc::Receiver<ClientReply>) {
    let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(extra.is_err(), "unexpected second reply: {:?}", extra);
}

#[tokio::test]
async fn search_query_gets_exactly_one_enriched_reply() {
    let supervisor = start_supervisor(FakeSource::with_cat_videos());
    let (tx, mut rx) = mpsc::channel(8);
    let session = supervisor.connect(tx).await.unwrap();

    session.send(Inbound::RawQuery("cats".to_string())).await.unwrap();

    match next_reply(&mut rx).await {
        ClientReply::SearchResults {
            search_term,
            videos,
            aggregate_sentiment,
            sentiment_glyph,
            average_grade_level,
            average_reading_ease,
        } => {
            assert_eq!(search_term, "cats");
            assert_eq!(videos.len(), 3);
            assert_eq!(videos[0].video_id, "v1");
            assert!(videos.iter().all(|v| v.readability.is_some()));
            assert!(videos.iter().all(|v| v.sentiment.is_some()));
            assert_eq!(aggregate_sentiment, Sentiment::Happy);
            assert_eq!(sentiment_glyph, ":-)");
            assert!(average_grade_level.is_finite());
            assert!(average_reading_ease.is_finite());
        }
        other => panic!("expected search results, got {:?}", other),
    }
    assert_no_more_replies(&mut rx).await;
}

#[tokio::test]
async fn concurrent_queries_in_one_session_each_complete() {
    let supervisor = start_supervisor(FakeSource::with_cat_videos());
    let (tx, mut rx) = mpsc::channel(8);
    let session = supervisor.connect(tx).await.unwrap();

    session.send(Inbound::RawQuery("cats".to_string())).await.unwrap();
    session.send(Inbound::RawQuery("kittens".to_string())).await.unwrap();

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
        HashSet::from(["cats".to_string(), "kittens".to_string()])
    );
    assert_no_more_replies(&mut rx).await;
}

#[tokio::test]
async fn search_failure_still_replies() {
    let source = FakeSource {
        fail_search: true,
        ..FakeSource::with_cat_videos()
    };
    let supervisor = start_supervisor(source);

    let reply = supervisor
        .ask(Inbound::RawQuery("cats".to_string()))
        .await
        .unwrap();

    match reply {
        ClientReply::SearchResults {
            search_term,
            videos,
            aggregate_sentiment,
            average_grade_level,
            ..
        } => {
            assert_eq!(search_term, "cats");
            assert!(videos.is_empty());
            assert_eq!(aggregate_sentiment, Sentiment::Unavailable);
            assert_eq!(average_grade_level, 0.0);
        }
        other => panic!("expected search results, got {:?}", other),
    }
}

#[tokio::test]
async fn blank_query_replies_with_empty_results() {
    let supervisor = start_supervisor(FakeSource::with_cat_videos());

    let reply = supervisor
        .ask(Inbound::RawQuery("   ".to_string()))
        .await
        .unwrap();

    match reply {
        ClientReply::SearchResults { videos, .. } => assert!(videos.is_empty()),
        other => panic!("expected search results, got {:?}", other),
    }
}

#[tokio::test]
async fn search_feeds_cumulative_word_stats() {
    let supervisor = start_supervisor(FakeSource::with_cat_videos());
    supervisor
        .ask(Inbound::RawQuery("cats".to_string()))
        .await
        .unwrap();

    // The merge runs on a side channel, so poll until it lands
    let mut found = None;
    for _ in 0..40 {
        if let ClientReply::WordStats { word_stats } =
            supervisor.ask(Inbound::CumulativeStatsRequest).await.unwrap()
        {
            if let Some(entry) = word_stats.iter().find(|w| w.word == "canada") {
                found = Some(entry.clone());
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(found, Some(WordCount::new("canada", 2)));
}

#[tokio::test]
async fn word_batch_merges_and_replies_with_snapshot() {
    let supervisor = start_supervisor(FakeSource::default());

    let reply = supervisor
        .ask(Inbound::WordFrequencyBatch(vec![
            "Canada is great".to_string(),
            "Canada is vibrant".to_string(),
        ]))
        .await
        .unwrap();

    match reply {
        ClientReply::WordStats { word_stats } => {
            assert_eq!(word_stats[0], WordCount::new("canada", 2));
            assert!(word_stats.contains(&WordCount::new("great", 1)));
            assert!(word_stats.contains(&WordCount::new("vibrant", 1)));
        }
        other => panic!("expected word stats, got {:?}", other),
    }

    let reply = supervisor.ask(Inbound::CumulativeStatsRequest).await.unwrap();
    match reply {
        ClientReply::WordStats { word_stats } => {
            assert_eq!(word_stats[0], WordCount::new("canada", 2));
        }
        other => panic!("expected word stats, got {:?}", other),
    }
}

#[tokio::test]
async fn empty_word_batch_replies_empty() {
    let supervisor = start_supervisor(FakeSource::default());
    let reply = supervisor
        .ask(Inbound::WordFrequencyBatch(Vec::new()))
        .await
        .unwrap();
    assert_eq!(reply, ClientReply::WordStats { word_stats: vec![] });
}

#[tokio::test]
async fn channel_profile_combines_both_calls() {
    let supervisor = start_supervisor(FakeSource::with_cat_videos());

    let reply = supervisor
        .ask(Inbound::ChannelProfileRequest("UC1".to_string()))
        .await
        .unwrap();

    match reply {
        ClientReply::ChannelProfile {
            channel_info,
            videos,
        } => {
            assert_eq!(channel_info.name, "Cat TV");
            assert_eq!(channel_info.subscriber_count, 1500);
            assert_eq!(channel_info.view_count, 90000);
            assert_eq!(channel_info.video_count, 42);
            assert_eq!(videos.len(), 3);
        }
        other => panic!("expected channel profile, got {:?}", other),
    }
}

#[tokio::test]
async fn channel_info_failure_uses_sentinel_but_keeps_videos() {
    let source = FakeSource {
        fail_channel_info: true,
        ..FakeSource::with_cat_videos()
    };
    let supervisor = start_supervisor(source);

    let reply = supervisor
        .ask(Inbound::ChannelProfileRequest("UC1".to_string()))
        .await
        .unwrap();

    match reply {
        ClientReply::ChannelProfile {
            channel_info,
            videos,
        } => {
            assert!(channel_info.is_unavailable());
            assert_eq!(channel_info.channel_id, "UC1");
            assert_eq!(videos.len(), 3);
        }
        other => panic!("expected channel profile, got {:?}", other),
    }
}

#[tokio::test]
async fn recent_videos_failure_keeps_channel_info() {
    let source = FakeSource {
        fail_recent_videos: true,
        ..FakeSource::with_cat_videos()
    };
    let supervisor = start_supervisor(source);

    let reply = supervisor
        .ask(Inbound::ChannelProfileRequest("UC1".to_string()))
        .await
        .unwrap();

    match reply {
        ClientReply::ChannelProfile {
            channel_info,
            videos,
        } => {
            assert_eq!(channel_info.name, "Cat TV");
            assert!(videos.is_empty());
        }
        other => panic!("expected channel profile, got {:?}", other),
    }
}

#[tokio::test]
async fn tag_lookup_failure_preserves_tag() {
    let source = FakeSource {
        fail_tags: true,
        ..FakeSource::with_cat_videos()
    };
    let supervisor = start_supervisor(source);

    let reply = supervisor
        .ask(Inbound::TagLookup("kittens".to_string()))
        .await
        .unwrap();

    assert_eq!(
        reply,
        ClientReply::TagResults {
            tag: "kittens".to_string(),
            videos: vec![],
        }
    );
}

#[tokio::test]
async fn tag_lookup_returns_videos() {
    let supervisor = start_supervisor(FakeSource::with_cat_videos());

    let reply = supervisor
        .ask(Inbound::TagLookup("cats".to_string()))
        .await
        .unwrap();

    match reply {
        ClientReply::TagResults { tag, videos } => {
            assert_eq!(tag, "cats");
            assert_eq!(videos.len(), 3);
        }
        other => panic!("expected tag results, got {:?}", other),
    }
}

#[tokio::test]
async fn unknown_message_type_gets_error_reply() {
    let supervisor = start_supervisor(FakeSource::default());

    let reply = supervisor
        .ask(Inbound::Unrecognized("dance".to_string()))
        .await
        .unwrap();

    assert_eq!(reply, ClientReply::unknown_message_type());
}

#[tokio::test]
async fn query_completion_is_published() {
    let supervisor = start_supervisor(FakeSource::with_cat_videos());
    let mut events = supervisor.events().subscribe();

    supervisor
        .ask(Inbound::RawQuery("cats".to_string()))
        .await
        .unwrap();

    let event = tokio::time::timeout(REPLY_TIMEOUT, async {
        loop {
            if let Ok(event @ ServiceEvent::QueryCompleted { .. }) = events.recv().await {
                return event;
            }
        }
    })
    .await
    .expect("no QueryCompleted event");

    match event {
        ServiceEvent::QueryCompleted {
            search_term,
            video_count,
            sentiment,
            ..
        } => {
            assert_eq!(search_term, "cats");
            assert_eq!(video_count, 3);
            assert_eq!(sentiment, Sentiment::Happy);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn closing_session_retires_its_coordinator() {
    let supervisor = start_supervisor(FakeSource::default());
    let (tx, _rx) = mpsc::channel(8);
    let session = supervisor.connect(tx).await.unwrap();
    let coordinator = format!("coordinator-{}", &session.id()[..8]);

    let names: Vec<_> = supervisor
        .status()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert!(names.contains(&coordinator));

    session.close().await;

    let names: Vec<_> = supervisor
        .status()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert!(!names.contains(&coordinator));
}

#[tokio::test]
async fn dropped_session_retires_its_coordinator() {
    let supervisor = start_supervisor(FakeSource::default());
    let (tx, _rx) = mpsc::channel(8);
    let session = supervisor.connect(tx).await.unwrap();
    let coordinator = format!("coordinator-{}", &session.id()[..8]);

    drop(session);

    let mut retired = false;
    for _ in 0..40 {
        let status = supervisor.status().await.unwrap();
        if !status.iter().any(|s| s.name == coordinator) {
            retired = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(retired, "{} still listed", coordinator);
}

async fn search(session: &ClientSession, rx: &mut mpsc::Receiver<ClientReply>, term: &str) {
    session.send(Inbound::RawQuery(term.to_string())).await.unwrap();
    match next_reply(rx).await {
        ClientReply::SearchResults { search_term, .. } => assert_eq!(search_term, term),
        other => panic!("expected search results, got {:?}", other),
    }
}

async fn history(session: &ClientSession, rx: &mut mpsc::Receiver<ClientReply>) -> Vec<String> {
    session.send(Inbound::SearchHistory).await.unwrap();
    match next_reply(rx).await {
        ClientReply::SearchHistory { searches } => {
            searches.into_iter().map(|entry| entry.search_term).collect()
        }
        other => panic!("expected search history, got {:?}", other),
    }
}

#[tokio::test]
async fn history_keeps_last_ten_searches_newest_first() {
    let supervisor = start_supervisor(FakeSource::with_cat_videos());
    let (tx, mut rx) = mpsc::channel(8);
    let session = supervisor.connect(tx).await.unwrap();

    assert!(history(&session, &mut rx).await.is_empty());

    for i in 1..=12 {
        search(&session, &mut rx, &format!("term{}", i)).await;
    }

    let terms = history(&session, &mut rx).await;
    assert_eq!(terms.len(), 10);
    assert_eq!(terms.first().map(String::as_str), Some("term12"));
    assert_eq!(terms.last().map(String::as_str), Some("term3"));
}

#[tokio::test]
async fn repeated_search_keeps_its_place_in_history() {
    let supervisor = start_supervisor(FakeSource::with_cat_videos());
    let (tx, mut rx) = mpsc::channel(8);
    let session = supervisor.connect(tx).await.unwrap();

    search(&session, &mut rx, "cats").await;
    search(&session, &mut rx, "dogs").await;
    search(&session, &mut rx, "cats").await;

    assert_eq!(history(&session, &mut rx).await, vec!["dogs", "cats"]);
}

#[tokio::test]
async fn history_is_per_session() {
    let supervisor = start_supervisor(FakeSource::with_cat_videos());
    let (tx, mut rx) = mpsc::channel(8);
    let session = supervisor.connect(tx).await.unwrap();
    search(&session, &mut rx, "cats").await;

    let (other_tx, mut other_rx) = mpsc::channel(8);
    let other = supervisor.connect(other_tx).await.unwrap();
    assert!(history(&other, &mut other_rx).await.is_empty());
    assert_eq!(history(&session, &mut rx).await, vec!["cats"]);
}

#[tokio::test]
async fn word_stats_for_query_merges_fifty_videos_and_replies() {
    let source = Arc::new(FakeSource::with_cat_videos());
    let supervisor = start_shared(source.clone());

    let reply = supervisor
        .ask(Inbound::WordStatsForQuery("cats".to_string()))
        .await
        .unwrap();

    match reply {
        ClientReply::QueryWordStats {
            search_term,
            word_stats,
        } => {
            assert_eq!(search_term, "cats");
            assert!(word_stats.contains(&WordCount::new("canada", 2)));
        }
        other => panic!("expected query word stats, got {:?}", other),
    }
    assert_eq!(source.search_limits(), vec![50]);

    // The merge is cumulative
    match supervisor.ask(Inbound::CumulativeStatsRequest).await.unwrap() {
        ClientReply::WordStats { word_stats } => {
            assert!(word_stats.contains(&WordCount::new("canada", 2)));
        }
        other => panic!("expected word stats, got {:?}", other),
    }
}

#[tokio::test]
async fn word_stats_for_query_without_videos_is_empty() {
    let source = FakeSource {
        fail_search: true,
        ..FakeSource::with_cat_videos()
    };
    let supervisor = start_supervisor(source);

    let reply = supervisor
        .ask(Inbound::WordStatsForQuery("cats".to_string()))
        .await
        .unwrap();

    assert_eq!(
        reply,
        ClientReply::QueryWordStats {
            search_term: "cats".to_string(),
            word_stats: vec![],
        }
    );
}

#[tokio::test]
async fn video_details_include_tags() {
    let supervisor = start_supervisor(FakeSource::with_cat_videos());

    let reply = supervisor
        .ask(Inbound::VideoDetailsRequest("v1".to_string()))
        .await
        .unwrap();

    match reply {
        ClientReply::VideoDetails { video_id, video } => {
            assert_eq!(video_id, "v1");
            let video = video.expect("video v1");
            assert_eq!(video.video_id, "v1");
            assert_eq!(video.title, "Funny cats");
            assert_eq!(video.tags, vec!["cats".to_string(), "funny".to_string()]);
        }
        other => panic!("expected video details, got {:?}", other),
    }
}

#[tokio::test]
async fn unknown_or_failed_video_details_are_empty() {
    let supervisor = start_supervisor(FakeSource::with_cat_videos());
    let reply = supervisor
        .ask(Inbound::VideoDetailsRequest("missing".to_string()))
        .await
        .unwrap();
    assert_eq!(
        reply,
        ClientReply::VideoDetails {
            video_id: "missing".to_string(),
            video: None,
        }
    );

    let source = FakeSource {
        fail_video_details: true,
        ..FakeSource::with_cat_videos()
    };
    let supervisor = start_supervisor(source);
    let reply = supervisor
        .ask(Inbound::VideoDetailsRequest("v1".to_string()))
        .await
        .unwrap();
    assert!(matches!(reply, ClientReply::VideoDetails { video: None, .. }));
}

#[tokio::test]
async fn requests_after_shutdown_fail() {
    let supervisor = start_supervisor(FakeSource::default());
    supervisor.shutdown().await;

    assert!(supervisor.ask(Inbound::CumulativeStatsRequest).await.is_err());
}
