//! Tests for builder modules

use gym_booking::builders::{build_engine, build_from_config, connect_store};
use gym_booking::config::{BookingConfig, StoreBackendConfig};
use chrono::{Duration, Utc};
use gym_booking::core::{
    ClassDefinition, ClassSchedule, Membership, MembershipStatus, ScheduleStatus,
};
use gym_booking::infra::{ConfiguredStore, InMemoryStore};
use gym_booking::util::{ClassId, GymId, MemberId, MembershipId, ScheduleId};

fn config() -> BookingConfig {
    BookingConfig {
        max_tx_retries: 2,
        retry_backoff_ms: 1,
        cancellation_cutoff_mins: Some(30),
        waitlist_ttl_secs: Some(600),
        event_buffer: 16,
        store: StoreBackendConfig::InMemory,
    }
}

#[test]
fn test_build_engine_with_factory() {
    let engine = build_engine(&config(), |store_cfg| {
        assert_eq!(*store_cfg, StoreBackendConfig::InMemory);
        Ok(InMemoryStore::new())
    });
    assert!(engine.is_ok());
}

#[test]
fn test_build_engine_rejects_invalid_config() {
    let cfg = BookingConfig {
        max_tx_retries: 0,
        ..config()
    };
    let result = build_engine(&cfg, |_| Ok(InMemoryStore::new()));
    let err = result.err().unwrap();
    assert!(err.to_string().starts_with("config invalid"));
}

#[tokio::test]
async fn test_connect_in_memory_store() {
    let store = connect_store(&StoreBackendConfig::InMemory).await.unwrap();
    assert!(matches!(store, ConfiguredStore::InMemory(_)));
    assert_eq!(store.backend(), "in_memory");
}

#[tokio::test]
async fn test_build_from_config_wires_event_sink() {
    let (engine, sink) = build_from_config(&config()).await.unwrap();
    let mut events = sink.subscribe();

    let ConfiguredStore::InMemory(store) = engine.store().clone() else {
        panic!("expected in-memory store");
    };
    let (schedule, member) = seed(&store).await;
    engine.reserve(member, schedule, None).await.unwrap();

    let envelope = events.recv().await.unwrap();
    assert_eq!(envelope.event.name(), "booking.confirmed");
}

async fn seed(store: &InMemoryStore) -> (ScheduleId, MemberId) {
    let class = ClassDefinition {
        id: ClassId::new(),
        gym_id: GymId::new(),
        name: "Yoga".into(),
        capacity: 8,
        credits_required: 1,
        is_active: true,
    };
    let start = Utc::now() + Duration::days(1);
    let schedule = ClassSchedule {
        id: ScheduleId::new(),
        class_id: class.id,
        start_time: start,
        end_time: start + Duration::hours(1),
        capacity_override: None,
        price_override_cents: None,
        status: ScheduleStatus::Scheduled,
    };
    let membership = Membership {
        id: MembershipId::new(),
        member_id: MemberId::new(),
        status: MembershipStatus::Active,
        class_credits_remaining: Some(3),
        frozen_until: None,
    };
    let ids = (schedule.id, membership.member_id);
    store.insert_class(class).await;
    store.insert_schedule(schedule).await;
    store.insert_membership(membership).await;
    ids
}
