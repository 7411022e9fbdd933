//! Tests for utility types

use chrono::{Duration, Utc};
use gym_booking::util::{Clock, ManualClock, MemberId, SystemClock};
use uuid::Uuid;

#[test]
fn test_ids_serialize_transparently() {
    let raw = Uuid::new_v4();
    let id = MemberId::from(raw);
    assert_eq!(serde_json::to_value(id).unwrap(), serde_json::json!(raw.to_string()));
    assert_eq!(id.as_uuid(), raw);
    assert_eq!(id.to_string(), raw.to_string());
}

#[test]
fn test_fresh_ids_differ() {
    assert_ne!(MemberId::new(), MemberId::new());
}

#[test]
fn test_manual_clock_is_frozen() {
    let start = Utc::now();
    let clock = ManualClock::new(start);
    assert_eq!(clock.now(), start);
    clock.advance(Duration::seconds(5));
    assert_eq!(clock.now(), start + Duration::seconds(5));
}

#[test]
fn test_system_clock_moves_forward() {
    let before = Utc::now();
    assert!(SystemClock.now() >= before);
}

#[test]
fn test_init_tracing_is_idempotent() {
    gym_booking::util::init_tracing();
    gym_booking::util::init_tracing();
    tracing::info!("tracing initialised");
}
