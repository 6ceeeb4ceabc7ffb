//! Broadcast channel for match notifications.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Coordinators
//! publish a [`MatchEvent`] after each committed state change, and every
//! WebSocket connection subscribes and filters by match topic.

use tokio::sync::broadcast;

use super::MatchEvent;

/// Fire-and-forget relay for [`MatchEvent`]s.
///
/// Backed by a `tokio::broadcast` ring buffer. Publishing never blocks and
/// never fails the caller; lagging receivers lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MatchEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Returns the number of receivers that got the event; with no
    /// receivers the event is dropped and `0` is returned.
    pub fn publish(&self, event: MatchEvent) -> usize {
        let event_type = event.event_type_str();
        let match_id = event.match_id();
        let delivered = self.sender.send(event).unwrap_or(0);
        tracing::trace!(%match_id, event_type, delivered, "match event published");
        delivered
    }

    /// Creates a receiver for all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MatchEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
