//! Fan-out of committed booking events over a tokio broadcast channel.
//!
//! The socket relay subscribes once per connection. Slow subscribers lag
//! and miss events instead of blocking the booking core.

use tokio::sync::broadcast;

use crate::core::events::{EventEnvelope, EventSink};

/// Broadcast-backed [`EventSink`].
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<EventEnvelope>,
}

impl BroadcastEventSink {
    /// Create a sink buffering up to `capacity` events per subscriber.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; validated configuration never is.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// New receiver seeing events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, envelope: EventEnvelope) {
        let name = envelope.event.name();
        if self.sender.send(envelope).is_err() {
            tracing::trace!(event = name, "no subscribers for booking event");
        }
    }
}
