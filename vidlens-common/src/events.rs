//! Service events and the broadcast event bus
//!
//! The bus is one-to-many and lossy: emitters never wait on listeners, and a
//! missing listener is not an error for the emitter.

use crate::models::Sentiment;
use crate::supervision::{Directive, FaultKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events published by the worker tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServiceEvent {
    /// The supervisor applied a directive to a failing child
    FaultHandled {
        worker: String,
        kind: FaultKind,
        directive: Directive,
        detail: String,
        timestamp: DateTime<Utc>,
    },

    /// A search query received its terminal reply
    QueryCompleted {
        search_term: String,
        video_count: usize,
        sentiment: Sentiment,
        timestamp: DateTime<Utc>,
    },

    /// A client session opened or closed
    SessionChanged {
        session_id: String,
        connected: bool,
        timestamp: DateTime<Utc>,
    },
}

impl ServiceEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ServiceEvent::FaultHandled { .. } => "FaultHandled",
            ServiceEvent::QueryCompleted { .. } => "QueryCompleted",
            ServiceEvent::SessionChanged { .. } => "SessionChanged",
        }
    }
}

/// Broadcast bus for [`ServiceEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ServiceEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ServiceEvent,
    ) -> Result<usize, broadcast::error::SendError<ServiceEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ServiceEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
