use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::broadcast;

use pkg_constants::state::EVENT_CHANNEL_CAPACITY;

/// Type of event in the watch stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventType {
    Put,
    Delete,
}

/// A single watch event representing a state change.
///
/// For `Put` the value is the new object; for `Delete` it is the object as
/// it was right before removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub seq: u64,
    pub event_type: EventType,
    pub key: String,
    #[serde(default)]
    pub value: Option<Vec<u8>>,
}

/// In-memory event log that tracks all state mutations with monotonic sequence numbers.
/// Clients can subscribe to receive events as they are emitted, or replay
/// the recent backlog with `events_since`.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<RwLock<EventLogInner>>,
    sender: broadcast::Sender<WatchEvent>,
}

struct EventLogInner {
    seq: u64,
    /// Ring buffer of recent events (capped)
    events: VecDeque<WatchEvent>,
    max_events: usize,
}

impl EventLog {
    /// Create a new event log with the given capacity for recent events.
    pub fn new(max_events: usize) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(EventLogInner {
                seq: 0,
                events: VecDeque::with_capacity(max_events),
                max_events,
            })),
            sender,
        }
    }

    /// Record a new event. Called by StateStore on put/delete.
    pub async fn emit(&self, event_type: EventType, key: String, value: Option<Vec<u8>>) {
        let mut inner = self.inner.write().await;
        inner.seq += 1;
        let event = WatchEvent {
            seq: inner.seq,
            event_type,
            key,
            value,
        };
        if inner.events.len() >= inner.max_events {
            inner.events.pop_front();
        }
        inner.events.push_back(event.clone());
        // Broadcast to subscribers (ignore errors if no receivers)
        let _ = self.sender.send(event);
    }

    /// Get the current sequence number.
    pub async fn current_seq(&self) -> u64 {
        self.inner.read().await.seq
    }

    /// Sequence number of the oldest event still buffered, if any.
    pub async fn oldest_seq(&self) -> Option<u64> {
        self.inner.read().await.events.front().map(|e| e.seq)
    }

    /// Get all buffered events since the given sequence number.
    pub async fn events_since(&self, from_seq: u64) -> Vec<WatchEvent> {
        let inner = self.inner.read().await;
        inner
            .events
            .iter()
            .filter(|e| e.seq > from_seq)
            .cloned()
            .collect()
    }

    /// Whether every event after `from_seq` is still in the buffer.
    pub async fn covers(&self, from_seq: u64) -> bool {
        let inner = self.inner.read().await;
        match inner.events.front() {
            Some(oldest) => oldest.seq <= from_seq + 1,
            None => inner.seq == from_seq,
        }
    }

    /// Subscribe to receive new events as they are emitted.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }
}
