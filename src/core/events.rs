//! Booking events relayed to the notification layer.
//!
//! Events are published only after the transaction that produced them has
//! committed. Sinks must not block: delivery is fire-and-forget and the
//! relay is expected to provide its own at-least-once guarantees.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::serde::{BookingId, MemberId, ScheduleId, WaitlistEntryId};

/// Event payloads, tagged with their dotted wire name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BookingEvent {
    /// A confirmed booking was created.
    #[serde(rename = "booking.confirmed")]
    BookingConfirmed {
        /// New booking.
        booking_id: BookingId,
        /// Seat holder.
        member_id: MemberId,
        /// Booked schedule.
        schedule_id: ScheduleId,
    },
    /// A confirmed booking was cancelled.
    #[serde(rename = "booking.cancelled")]
    BookingCancelled {
        /// Cancelled booking.
        booking_id: BookingId,
    },
    /// A waitlist entry was turned into a booking.
    #[serde(rename = "waitlist.promoted")]
    WaitlistPromoted {
        /// Promoted entry.
        entry_id: WaitlistEntryId,
        /// Booking created for it.
        booking_id: BookingId,
    },
    /// A member joined a waitlist.
    #[serde(rename = "waitlist.joined")]
    WaitlistJoined {
        /// New entry.
        entry_id: WaitlistEntryId,
        /// Waiting member.
        member_id: MemberId,
        /// Schedule waited on.
        schedule_id: ScheduleId,
        /// Assigned position.
        position: u32,
    },
    /// A waitlist entry lapsed or was skipped during promotion.
    #[serde(rename = "waitlist.expired")]
    WaitlistExpired {
        /// Expired entry.
        entry_id: WaitlistEntryId,
    },
}

impl BookingEvent {
    /// Dotted wire name, e.g. `booking.confirmed`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BookingConfirmed { .. } => "booking.confirmed",
            Self::BookingCancelled { .. } => "booking.cancelled",
            Self::WaitlistPromoted { .. } => "waitlist.promoted",
            Self::WaitlistJoined { .. } => "waitlist.joined",
            Self::WaitlistExpired { .. } => "waitlist.expired",
        }
    }
}

/// Event plus delivery metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique id so the relay can deduplicate redeliveries.
    pub event_id: Uuid,
    /// Commit-time instant.
    pub occurred_at: DateTime<Utc>,
    /// Payload.
    #[serde(flatten)]
    pub event: BookingEvent,
}

/// Receiver of committed booking events.
pub trait EventSink: Send + Sync {
    /// Hand an event to the notification layer without blocking.
    fn publish(&self, envelope: EventEnvelope);
}

/// Bounded in-memory sink for testing and dev.
pub struct InMemoryEventSink {
    events: Mutex<VecDeque<EventEnvelope>>,
    max_events: usize,
}

impl InMemoryEventSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events.lock().iter().cloned().collect()
    }

    /// Wire names of stored events, oldest first.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.event.name()).collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn publish(&self, envelope: EventEnvelope) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(envelope);
    }
}

/// Wrap a payload into an envelope stamped at `occurred_at`.
#[must_use]
pub fn build_event(event: BookingEvent, occurred_at: DateTime<Utc>) -> EventEnvelope {
    EventEnvelope {
        event_id: Uuid::new_v4(),
        occurred_at,
        event,
    }
}
