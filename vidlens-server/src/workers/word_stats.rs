//! WordFrequencyAggregator: sole owner of the cumulative word table
//!
//! The table lives inside the worker task and is only reachable through
//! `Merge` and `Snapshot` messages. Each merge is applied completely or not at
//! all, and replies carry owned copies.

use super::mailbox::Worker;
use super::policy::WorkerFault;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::{debug, info};
use vidlens_common::text::count_words;
use vidlens_common::WordCount;

/// Entries returned by a snapshot
pub const SNAPSHOT_SIZE: usize = 50;

/// Cumulative word -> occurrence mapping; counts never decrease
#[derive(Debug, Default)]
pub struct WordFrequencyTable {
    counts: HashMap<String, u64>,
}

impl WordFrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn count(&self, word: &str) -> u64 {
        self.counts.get(word).copied().unwrap_or(0)
    }

    /// Add the tokens of every text; returns the number of distinct words touched
    ///
    /// New totals are computed before anything is written, so a counter
    /// overflow leaves the table unchanged.
    pub fn merge<S: AsRef<str>>(&mut self, texts: &[S]) -> Result<usize, WorkerFault> {
        let batch = count_words(texts);

        let mut updates = Vec::with_capacity(batch.len());
        for (word, added) in batch {
            let total = self.count(&word).checked_add(added).ok_or_else(|| {
                WorkerFault::invariant_violation(format!("counter overflow for '{}'", word))
            })?;
            updates.push((word, total));
        }

        let touched = updates.len();
        self.counts.extend(updates);
        Ok(touched)
    }

    /// Top `limit` words by count descending, ties alphabetical
    pub fn snapshot(&self, limit: usize) -> Vec<WordCount> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut entries: Vec<WordCount> = self
            .counts
            .iter()
            .map(|(word, count)| WordCount::new(word.clone(), *count))
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
        entries.truncate(limit);
        entries
    }
}

pub enum WordStatsMsg {
    /// Merge texts; `reply` receives the snapshot taken right after the merge
    Merge {
        texts: Vec<String>,
        reply: Option<oneshot::Sender<Vec<WordCount>>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<WordCount>>,
    },
}

#[derive(Default)]
pub struct WordFrequencyAggregator {
    table: WordFrequencyTable,
}

impl WordFrequencyAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn with_table(table: WordFrequencyTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl Worker for WordFrequencyAggregator {
    type Message = WordStatsMsg;

    async fn handle(&mut self, msg: WordStatsMsg) -> Result<(), WorkerFault> {
        match msg {
            WordStatsMsg::Merge { texts, reply } => {
                if texts.iter().all(|t| t.trim().is_empty()) {
                    debug!("Empty word batch, nothing merged");
                    if let Some(reply) = reply {
                        let _ = reply.send(Vec::new());
                    }
                    return Ok(());
                }

                let touched = self.table.merge(&texts)?;
                info!(
                    texts = texts.len(),
                    words = touched,
                    table_size = self.table.len(),
                    "Merged word batch"
                );
                if let Some(reply) = reply {
                    let _ = reply.send(self.table.snapshot(SNAPSHOT_SIZE));
                }
            }
            WordStatsMsg::Snapshot { reply } => {
                let _ = reply.send(self.table.snapshot(SNAPSHOT_SIZE));
            }
        }
        Ok(())
    }
}
