//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans reconciliation-pass results out to every live-feed
//! subscriber. It is designed to be shared via `Arc<EventBus>` across
//! the application. Subscribers come and go freely; publishing never
//! depends on anyone listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A download-state event published after a reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadEvent {
    /// Dot-separated event name, e.g. `"download.updated"`.
    pub event_type: String,

    /// Per-record payload for this pass (the normalized deltas).
    pub items: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl DownloadEvent {
    /// Create an event carrying the given items payload.
    pub fn new(event_type: impl Into<String>, items: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            items,
            timestamp: Utc::now(),
        }
    }
}

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so any number of subscribers can
/// independently receive every published [`DownloadEvent`].
pub struct EventBus {
    sender: broadcast::Sender<DownloadEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are
    /// dropped and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently
    /// dropped; reconciliation state is already durable in the store.
    pub fn publish(&self, event: DownloadEvent) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
