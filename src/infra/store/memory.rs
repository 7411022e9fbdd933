//! In-memory booking store for development, tests and benches.
//!
//! A transaction takes the store's async mutex for its whole lifetime and
//! works on a private copy of the state; commit writes the copy back, drop
//! throws it away. Transactions are therefore fully serialised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::model::{
    Booking, BookingStatus, ClassDefinition, ClassSchedule, Membership, MembershipStatus,
    ScheduleSnapshot, ScheduleStatus, WaitlistEntry,
};
use crate::core::store::{
    BookingRows, BookingStore, CatalogTx, LedgerTx, LockMode, StoreTx, WaitlistRows,
};
use crate::core::StoreError;
use crate::util::serde::{
    BookingId, ClassId, GymId, MemberId, MembershipId, ScheduleId, WaitlistEntryId,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    classes: HashMap<ClassId, ClassDefinition>,
    schedules: HashMap<ScheduleId, ClassSchedule>,
    memberships: HashMap<MembershipId, Membership>,
    bookings: HashMap<BookingId, Booking>,
    waitlist: HashMap<WaitlistEntryId, WaitlistEntry>,
}

impl MemoryState {
    fn confirmed_count(&self, schedule_id: ScheduleId) -> u32 {
        let count = self
            .bookings
            .values()
            .filter(|b| b.schedule_id == schedule_id && b.status == BookingStatus::Confirmed)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    fn snapshot(&self, schedule: &ClassSchedule) -> Result<ScheduleSnapshot, StoreError> {
        let class = self.classes.get(&schedule.class_id).ok_or_else(|| {
            StoreError::Constraint(format!(
                "schedule {} references unknown class {}",
                schedule.id, schedule.class_id
            ))
        })?;
        Ok(ScheduleSnapshot {
            schedule: schedule.clone(),
            class: class.clone(),
            confirmed_count: self.confirmed_count(schedule.id),
        })
    }

    fn start_of(&self, schedule_id: ScheduleId) -> Option<DateTime<Utc>> {
        self.schedules.get(&schedule_id).map(|s| s.start_time)
    }
}

/// Shared, clonable in-memory store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    injected_conflicts: Arc<AtomicU32>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a class definition.
    pub async fn insert_class(&self, class: ClassDefinition) {
        self.state.lock().await.classes.insert(class.id, class);
    }

    /// Seed a schedule.
    pub async fn insert_schedule(&self, schedule: ClassSchedule) {
        self.state.lock().await.schedules.insert(schedule.id, schedule);
    }

    /// Seed or replace a membership.
    pub async fn insert_membership(&self, membership: Membership) {
        self.state
            .lock()
            .await
            .memberships
            .insert(membership.id, membership);
    }

    /// Set the status of an existing schedule, as staff tooling would.
    pub async fn set_schedule_status(&self, schedule_id: ScheduleId, status: ScheduleStatus) {
        if let Some(schedule) = self.state.lock().await.schedules.get_mut(&schedule_id) {
            schedule.status = status;
        }
    }

    /// Mark a confirmed booking completed, as the attendance collaborator would.
    pub async fn complete_booking(&self, booking_id: BookingId) {
        if let Some(booking) = self.state.lock().await.bookings.get_mut(&booking_id) {
            if booking.status == BookingStatus::Confirmed {
                booking.status = BookingStatus::Completed;
            }
        }
    }

    /// Make the next `count` commits fail with [`StoreError::Conflict`].
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Booking by id.
    pub async fn booking(&self, booking_id: BookingId) -> Option<Booking> {
        self.state.lock().await.bookings.get(&booking_id).cloned()
    }

    /// Membership by id.
    pub async fn membership(&self, membership_id: MembershipId) -> Option<Membership> {
        self.state
            .lock()
            .await
            .memberships
            .get(&membership_id)
            .cloned()
    }

    /// All bookings of a schedule, oldest first.
    pub async fn bookings_for(&self, schedule_id: ScheduleId) -> Vec<Booking> {
        let state = self.state.lock().await;
        let mut bookings: Vec<_> = state
            .bookings
            .values()
            .filter(|b| b.schedule_id == schedule_id)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.created_at);
        bookings
    }

    /// Confirmed bookings of a schedule.
    pub async fn confirmed_count(&self, schedule_id: ScheduleId) -> u32 {
        self.state.lock().await.confirmed_count(schedule_id)
    }

    /// Every waitlist entry of a schedule, in any status, by join time.
    pub async fn waitlist_for(&self, schedule_id: ScheduleId) -> Vec<WaitlistEntry> {
        let state = self.state.lock().await;
        let mut entries: Vec<_> = state
            .waitlist
            .values()
            .filter(|e| e.schedule_id == schedule_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.joined_at, e.id));
        entries
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            work,
            conflicts: Arc::clone(&self.injected_conflicts),
        }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
    conflicts: Arc<AtomicU32>,
}

#[async_trait]
impl CatalogTx for MemoryTx {
    async fn schedule_with_class(
        &mut self,
        schedule_id: ScheduleId,
        _lock: LockMode,
    ) -> Result<Option<ScheduleSnapshot>, StoreError> {
        self.work
            .schedules
            .get(&schedule_id)
            .map(|schedule| self.work.snapshot(schedule))
            .transpose()
    }

    async fn schedules_between(
        &mut self,
        gym_id: GymId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScheduleSnapshot>, StoreError> {
        let mut found = Vec::new();
        for schedule in self.work.schedules.values() {
            if schedule.status != ScheduleStatus::Scheduled
                || schedule.start_time < from
                || schedule.start_time > to
            {
                continue;
            }
            let snapshot = self.work.snapshot(schedule)?;
            if snapshot.class.gym_id == gym_id && snapshot.class.is_active {
                found.push(snapshot);
            }
        }
        found.sort_by_key(|s| (s.schedule.start_time, s.schedule.id));
        Ok(found)
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn active_membership(
        &mut self,
        member_id: MemberId,
        _lock: LockMode,
    ) -> Result<Option<Membership>, StoreError> {
        Ok(self
            .work
            .memberships
            .values()
            .filter(|m| m.member_id == member_id && m.status == MembershipStatus::Active)
            .min_by_key(|m| m.id)
            .cloned())
    }

    async fn adjust_credits(
        &mut self,
        membership_id: MembershipId,
        delta: i64,
    ) -> Result<(), StoreError> {
        let membership = self
            .work
            .memberships
            .get_mut(&membership_id)
            .ok_or_else(|| StoreError::Backend(format!("unknown membership {membership_id}")))?;
        let Some(remaining) = membership.class_credits_remaining else {
            return Ok(());
        };
        let balance = i64::from(remaining) + delta;
        let balance = u32::try_from(balance).map_err(|_| {
            StoreError::Constraint(format!(
                "credit balance of {membership_id} would become {balance}"
            ))
        })?;
        membership.class_credits_remaining = Some(balance);
        Ok(())
    }
}

#[async_trait]
impl BookingRows for MemoryTx {
    async fn booking(
        &mut self,
        booking_id: BookingId,
        _lock: LockMode,
    ) -> Result<Option<Booking>, StoreError> {
        Ok(self.work.bookings.get(&booking_id).cloned())
    }

    async fn confirmed_booking(
        &mut self,
        member_id: MemberId,
        schedule_id: ScheduleId,
    ) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .work
            .bookings
            .values()
            .find(|b| {
                b.member_id == member_id
                    && b.schedule_id == schedule_id
                    && b.status == BookingStatus::Confirmed
            })
            .cloned())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), StoreError> {
        if booking.status == BookingStatus::Confirmed
            && self
                .confirmed_booking(booking.member_id, booking.schedule_id)
                .await?
                .is_some()
        {
            return Err(StoreError::UniqueViolation(format!(
                "member {} already holds a confirmed booking for {}",
                booking.member_id, booking.schedule_id
            )));
        }
        if self.work.bookings.contains_key(&booking.id) {
            return Err(StoreError::UniqueViolation(format!("booking {}", booking.id)));
        }
        self.work.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> Result<(), StoreError> {
        let row = self
            .work
            .bookings
            .get_mut(&booking.id)
            .ok_or_else(|| StoreError::Backend(format!("unknown booking {}", booking.id)))?;
        row.clone_from(booking);
        Ok(())
    }

    async fn upcoming_bookings(
        &mut self,
        member_id: MemberId,
        after: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Booking>, StoreError> {
        let mut upcoming: Vec<_> = self
            .work
            .bookings
            .values()
            .filter(|b| b.member_id == member_id && b.status == BookingStatus::Confirmed)
            .filter_map(|b| {
                let start = self.work.start_of(b.schedule_id)?;
                (start > after).then(|| (start, b.clone()))
            })
            .collect();
        upcoming.sort_by_key(|(start, b)| (*start, b.id));
        Ok(upcoming.into_iter().take(limit).map(|(_, b)| b).collect())
    }
}

#[async_trait]
impl WaitlistRows for MemoryTx {
    async fn waitlist_entry(
        &mut self,
        entry_id: WaitlistEntryId,
        _lock: LockMode,
    ) -> Result<Option<WaitlistEntry>, StoreError> {
        Ok(self.work.waitlist.get(&entry_id).cloned())
    }

    async fn pending_entries(
        &mut self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<WaitlistEntry>, StoreError> {
        let mut pending: Vec<_> = self
            .work
            .waitlist
            .values()
            .filter(|e| e.schedule_id == schedule_id && e.status.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|e| (e.position, e.joined_at));
        Ok(pending)
    }

    async fn insert_waitlist_entry(&mut self, entry: &WaitlistEntry) -> Result<(), StoreError> {
        let duplicate = self.work.waitlist.values().any(|e| {
            e.member_id == entry.member_id
                && e.schedule_id == entry.schedule_id
                && e.status.is_pending()
        });
        if duplicate {
            return Err(StoreError::UniqueViolation(format!(
                "member {} already waits for {}",
                entry.member_id, entry.schedule_id
            )));
        }
        self.work.waitlist.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn update_waitlist_entry(&mut self, entry: &WaitlistEntry) -> Result<(), StoreError> {
        let row = self
            .work
            .waitlist
            .get_mut(&entry.id)
            .ok_or_else(|| StoreError::Backend(format!("unknown waitlist entry {}", entry.id)))?;
        if !row.status.is_pending() {
            return Err(StoreError::Conflict(format!(
                "waitlist entry {} is no longer pending",
                entry.id
            )));
        }
        row.clone_from(entry);
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self {
            mut guard,
            work,
            conflicts,
        } = *self;
        let injected = conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Conflict("injected serialization failure".into()));
        }
        *guard = work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
