//! Shared fixtures: a seeded in-memory gym driven by a manual clock.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use gym_booking::core::{
    BookingEngine, ClassDefinition, ClassSchedule, CutoffWindow, InMemoryEventSink, Membership,
    MembershipStatus, RetryPolicy, ScheduleStatus, WaitlistExpiry,
};
use gym_booking::infra::InMemoryStore;
use gym_booking::util::clock::ManualClock;
use gym_booking::util::serde::{ClassId, GymId, MemberId, MembershipId, ScheduleId};

pub struct Gym {
    pub store: InMemoryStore,
    pub clock: Arc<ManualClock>,
    pub events: Arc<InMemoryEventSink>,
    pub gym_id: GymId,
    pub start: DateTime<Utc>,
}

impl Gym {
    pub fn new() -> Self {
        let start = Utc::now();
        Self {
            store: InMemoryStore::new(),
            clock: Arc::new(ManualClock::new(start)),
            events: Arc::new(InMemoryEventSink::new(1024)),
            gym_id: GymId::new(),
            start,
        }
    }

    /// Engine allowing cancellation up to start, with entries that never lapse.
    pub fn engine(&self) -> BookingEngine<InMemoryStore> {
        self.engine_with(CutoffWindow::until_start(), WaitlistExpiry::never())
    }

    pub fn engine_with(
        &self,
        cancellation: CutoffWindow,
        expiry: WaitlistExpiry,
    ) -> BookingEngine<InMemoryStore> {
        BookingEngine::new(self.store.clone(), Arc::new(cancellation), expiry)
            .with_clock(self.clock.clone())
            .with_event_sink(self.events.clone())
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                backoff: std::time::Duration::from_millis(1),
            })
    }

    /// Schedule starting a day from the fixture's start.
    pub async fn class(&self, capacity: u32, credits_required: u32) -> ScheduleId {
        self.class_at(capacity, credits_required, self.start + Duration::days(1))
            .await
    }

    pub async fn class_at(
        &self,
        capacity: u32,
        credits_required: u32,
        start_time: DateTime<Utc>,
    ) -> ScheduleId {
        let class = ClassDefinition {
            id: ClassId::new(),
            gym_id: self.gym_id,
            name: "Spin".into(),
            capacity,
            credits_required,
            is_active: true,
        };
        let schedule = ClassSchedule {
            id: ScheduleId::new(),
            class_id: class.id,
            start_time,
            end_time: start_time + Duration::minutes(45),
            capacity_override: None,
            price_override_cents: None,
            status: ScheduleStatus::Scheduled,
        };
        let id = schedule.id;
        self.store.insert_class(class).await;
        self.store.insert_schedule(schedule).await;
        id
    }

    /// Member with an active membership holding `credits` (`None` = unlimited).
    pub async fn member(&self, credits: Option<u32>) -> (MemberId, MembershipId) {
        let membership = Membership {
            id: MembershipId::new(),
            member_id: MemberId::new(),
            status: MembershipStatus::Active,
            class_credits_remaining: credits,
            frozen_until: None,
        };
        let ids = (membership.member_id, membership.id);
        self.store.insert_membership(membership).await;
        ids
    }

    pub async fn set_credits(&self, member_id: MemberId, membership_id: MembershipId, credits: u32) {
        self.store
            .insert_membership(Membership {
                id: membership_id,
                member_id,
                status: MembershipStatus::Active,
                class_credits_remaining: Some(credits),
                frozen_until: None,
            })
            .await;
    }

    pub async fn credits(&self, membership_id: MembershipId) -> Option<u32> {
        self.store
            .membership(membership_id)
            .await
            .and_then(|m| m.class_credits_remaining)
    }
}
