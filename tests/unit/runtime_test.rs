//! Tests for the API handlers

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gym_booking::core::{
    Actor, BookingEngine, ClassDefinition, ClassSchedule, CutoffWindow, Membership,
    MembershipStatus, ScheduleStatus, WaitlistExpiry,
};
use gym_booking::infra::InMemoryStore;
use gym_booking::runtime::api::{
    self, CancelRequest, ErrorBody, ReserveRequest, ScheduleRequest, WithdrawRequest,
};
use gym_booking::util::{ClassId, GymId, MemberId, MembershipId, ScheduleId};

async fn setup(capacity: u32) -> (BookingEngine<InMemoryStore>, ScheduleId, MemberId, MemberId) {
    let store = InMemoryStore::new();
    let class = ClassDefinition {
        id: ClassId::new(),
        gym_id: GymId::new(),
        name: "Boxing".into(),
        capacity,
        credits_required: 1,
        is_active: true,
    };
    let start = Utc::now() + chrono::Duration::days(1);
    let schedule = ClassSchedule {
        id: ScheduleId::new(),
        class_id: class.id,
        start_time: start,
        end_time: start + chrono::Duration::hours(1),
        capacity_override: None,
        price_override_cents: Some(1500),
        status: ScheduleStatus::Scheduled,
    };
    let schedule_id = schedule.id;
    store.insert_class(class).await;
    store.insert_schedule(schedule).await;

    let mut members = Vec::new();
    for _ in 0..2 {
        let membership = Membership {
            id: MembershipId::new(),
            member_id: MemberId::new(),
            status: MembershipStatus::Active,
            class_credits_remaining: Some(2),
            frozen_until: None,
        };
        members.push(membership.member_id);
        store.insert_membership(membership).await;
    }

    let engine = BookingEngine::new(
        store,
        Arc::new(CutoffWindow::until_start()),
        WaitlistExpiry::never(),
    );
    (engine, schedule_id, members[0], members[1])
}

#[tokio::test]
async fn test_reserve_and_cancel_handlers() {
    let (engine, schedule_id, member, _) = setup(4).await;

    let booking = api::reserve(
        &engine,
        ReserveRequest {
            member_id: member,
            schedule_id,
            notes: Some("bring gloves".into()),
        },
    )
    .await
    .unwrap();

    let response = api::cancel(
        &engine,
        CancelRequest {
            booking_id: booking.id,
            actor: Actor::Member(member),
            reason: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(response.booking.id, booking.id);
    assert!(response.promoted.is_none());
}

#[tokio::test]
async fn test_refusal_maps_to_error_body() {
    let (engine, schedule_id, first, second) = setup(1).await;
    let req = |member_id| ReserveRequest {
        member_id,
        schedule_id,
        notes: None,
    };

    api::reserve(&engine, req(first)).await.unwrap();
    let err = api::reserve(&engine, req(second)).await.unwrap_err();
    assert_eq!(
        err,
        ErrorBody {
            code: "class_full".into(),
            message: "class is full".into(),
            retryable: false,
        }
    );

    let eligibility = api::check_eligibility(
        &engine,
        ScheduleRequest {
            member_id: second,
            schedule_id,
        },
    )
    .await
    .unwrap();
    assert!(!eligibility.eligible);
    assert_eq!(eligibility.reason.as_deref(), Some("class_full"));
}

#[tokio::test]
async fn test_waitlist_handlers() {
    let (engine, schedule_id, first, second) = setup(1).await;
    api::reserve(
        &engine,
        ReserveRequest {
            member_id: first,
            schedule_id,
            notes: None,
        },
    )
    .await
    .unwrap();

    let entry = api::join_waitlist(
        &engine,
        ScheduleRequest {
            member_id: second,
            schedule_id,
        },
    )
    .await
    .unwrap();
    assert_eq!(entry.position, 1);

    let err = api::withdraw_from_waitlist(
        &engine,
        WithdrawRequest {
            entry_id: entry.id,
            actor: Actor::Member(first),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, "not_owner");
}

#[test]
fn test_request_json_shape() {
    let member_id = MemberId::new();
    let json = serde_json::json!({
        "booking_id": uuid::Uuid::new_v4(),
        "actor": { "kind": "member", "member_id": member_id },
    });
    let req: CancelRequest = serde_json::from_value(json).unwrap();
    assert_eq!(req.actor, Actor::Member(member_id));
    assert_eq!(req.reason, None);

    let staff: Actor = serde_json::from_value(serde_json::json!({ "kind": "staff" })).unwrap();
    assert_eq!(staff, Actor::Staff);
}

#[tokio::test]
async fn test_deadline_exceeded_is_retryable() {
    let result: Result<(), ErrorBody> = api::with_deadline(Duration::from_millis(5), async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    })
    .await;
    let err = result.unwrap_err();
    assert_eq!(err.code, "unavailable");
    assert!(err.retryable);
}

#[test]
fn test_health() {
    assert!(api::health().ok);
}
