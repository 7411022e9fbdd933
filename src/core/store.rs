//! Storage contracts consumed by the booking core.
//!
//! All reads and writes happen inside a [`StoreTx`] obtained from
//! [`BookingStore::begin`]. A transaction that is dropped without
//! [`StoreTx::commit`] is rolled back, so an abandoned operation never
//! leaves a booking without its debit or a debit without its booking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::model::{Booking, Membership, ScheduleSnapshot, WaitlistEntry};
use crate::core::StoreError;
use crate::util::serde::{
    BookingId, GymId, MemberId, MembershipId, ScheduleId, WaitlistEntryId,
};

/// Row locking requested for a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Plain snapshot read.
    Read,
    /// Lock the row until the transaction ends.
    Update,
}

/// Class catalog lookups.
#[async_trait]
pub trait CatalogTx: Send {
    /// Schedule joined with its class and confirmed-booking count.
    ///
    /// With [`LockMode::Update`] the schedule row stays locked until the
    /// transaction ends, serialising every reservation against it.
    async fn schedule_with_class(
        &mut self,
        schedule_id: ScheduleId,
        lock: LockMode,
    ) -> Result<Option<ScheduleSnapshot>, StoreError>;

    /// Scheduled occurrences of a gym's active classes starting in `[from, to]`,
    /// ordered by start time.
    async fn schedules_between(
        &mut self,
        gym_id: GymId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScheduleSnapshot>, StoreError>;
}

/// Membership ledger.
#[async_trait]
pub trait LedgerTx: Send {
    /// The member's membership with status `active`, if any.
    async fn active_membership(
        &mut self,
        member_id: MemberId,
        lock: LockMode,
    ) -> Result<Option<Membership>, StoreError>;

    /// Add `delta` credits (negative to debit). No-op on an unlimited ledger;
    /// fails with [`StoreError::Constraint`] if the balance would go negative.
    async fn adjust_credits(
        &mut self,
        membership_id: MembershipId,
        delta: i64,
    ) -> Result<(), StoreError>;
}

/// Booking rows.
#[async_trait]
pub trait BookingRows: Send {
    /// Booking by id.
    async fn booking(
        &mut self,
        booking_id: BookingId,
        lock: LockMode,
    ) -> Result<Option<Booking>, StoreError>;

    /// The confirmed booking for (member, schedule), if any.
    async fn confirmed_booking(
        &mut self,
        member_id: MemberId,
        schedule_id: ScheduleId,
    ) -> Result<Option<Booking>, StoreError>;

    /// Insert a new booking. A second confirmed booking for the same
    /// (member, schedule) fails with [`StoreError::UniqueViolation`].
    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), StoreError>;

    /// Persist status and cancellation fields of an existing booking.
    async fn update_booking(&mut self, booking: &Booking) -> Result<(), StoreError>;

    /// Confirmed bookings of a member for schedules starting after `after`,
    /// ordered by schedule start.
    async fn upcoming_bookings(
        &mut self,
        member_id: MemberId,
        after: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Booking>, StoreError>;
}

/// Waitlist rows.
#[async_trait]
pub trait WaitlistRows: Send {
    /// Entry by id.
    async fn waitlist_entry(
        &mut self,
        entry_id: WaitlistEntryId,
        lock: LockMode,
    ) -> Result<Option<WaitlistEntry>, StoreError>;

    /// Pending (waiting or notified) entries of a schedule, ordered by position.
    async fn pending_entries(
        &mut self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<WaitlistEntry>, StoreError>;

    /// Insert a new entry.
    async fn insert_waitlist_entry(&mut self, entry: &WaitlistEntry) -> Result<(), StoreError>;

    /// Persist position, status and notification fields of a pending entry.
    /// Fails with [`StoreError::Conflict`] if the stored entry has already
    /// left the queue.
    async fn update_waitlist_entry(&mut self, entry: &WaitlistEntry) -> Result<(), StoreError>;
}

/// One all-or-nothing unit of work against the booking store.
#[async_trait]
pub trait StoreTx: CatalogTx + LedgerTx + BookingRows + WaitlistRows {
    /// Make every write of this transaction visible.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard every write of this transaction.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Entry point for storage backends.
#[async_trait]
pub trait BookingStore: Send + Sync + 'static {
    /// Open a transaction. The caller's request timeout bounds the wait.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    /// Open a read-only transaction in which every read sees the same
    /// snapshot. Callers release it with [`StoreTx::rollback`].
    async fn begin_read(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        self.begin().await
    }
}

/// Compact pending positions of a schedule's waitlist back to `1..=n`,
/// preserving order.
pub(crate) async fn renumber_waitlist(
    tx: &mut dyn StoreTx,
    schedule_id: ScheduleId,
) -> Result<(), StoreError> {
    let pending = tx.pending_entries(schedule_id).await?;
    for (position, mut entry) in (1_u32..).zip(pending) {
        if entry.position != position {
            entry.position = position;
            tx.update_waitlist_entry(&entry).await?;
        }
    }
    Ok(())
}
