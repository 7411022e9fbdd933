//! Tests for booking events and sinks

use chrono::Utc;
use gym_booking::core::{build_event, BookingEvent, EventEnvelope, EventSink, InMemoryEventSink};
use gym_booking::util::serde::{BookingId, MemberId, ScheduleId, WaitlistEntryId};

#[test]
fn test_event_names() {
    let event = BookingEvent::WaitlistPromoted {
        entry_id: WaitlistEntryId::new(),
        booking_id: BookingId::new(),
    };
    assert_eq!(event.name(), "waitlist.promoted");
}

#[test]
fn test_envelope_json_shape() {
    let booking_id = BookingId::new();
    let member_id = MemberId::new();
    let schedule_id = ScheduleId::new();
    let envelope = build_event(
        BookingEvent::BookingConfirmed {
            booking_id,
            member_id,
            schedule_id,
        },
        Utc::now(),
    );

    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["type"], "booking.confirmed");
    assert_eq!(json["member_id"], member_id.to_string());
    assert!(json["event_id"].is_string());

    let parsed: EventEnvelope = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, envelope);
}

#[test]
fn test_in_memory_sink_keeps_order() {
    let sink = InMemoryEventSink::new(10);
    let booking_id = BookingId::new();
    sink.publish(build_event(
        BookingEvent::BookingCancelled { booking_id },
        Utc::now(),
    ));
    sink.publish(build_event(
        BookingEvent::WaitlistExpired {
            entry_id: WaitlistEntryId::new(),
        },
        Utc::now(),
    ));

    assert_eq!(sink.names(), vec!["booking.cancelled", "waitlist.expired"]);
    assert_eq!(
        sink.events()[0].event,
        BookingEvent::BookingCancelled { booking_id }
    );
}
