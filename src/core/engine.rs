//! Booking engine: eligibility, atomic reserve-and-debit, cancellation.
//!
//! Every check that guards a write is re-run inside the transaction that
//! performs the write, with the schedule row locked. Two concurrent
//! reservations for the last seat therefore serialise on that lock, and the
//! second one observes the first one's booking and fails with `ClassFull`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::events::{build_event, BookingEvent, EventSink};
use crate::core::model::{
    Actor, Booking, BookingSource, BookingStatus, Membership, ScheduleSnapshot, WaitlistEntry,
};
use crate::core::policy::{CancellationPolicy, WaitlistExpiry};
use crate::core::store::{BookingStore, LockMode, StoreTx};
use crate::core::waitlist::WaitlistManager;
use crate::core::{BookingError, StoreError};
use crate::util::clock::{Clock, SystemClock};
use crate::util::serde::{BookingId, GymId, MemberId, ScheduleId};

/// Failure of a single transaction attempt.
#[derive(Debug)]
pub(crate) enum TxError {
    /// Business refusal; never retried.
    Refused(BookingError),
    /// Storage failure; retried when it is a conflict.
    Store(StoreError),
}

impl From<BookingError> for TxError {
    fn from(err: BookingError) -> Self {
        Self::Refused(err)
    }
}

impl From<StoreError> for TxError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Bound on transaction-level retries after serialization conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base delay, multiplied by the attempt number.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        }
    }
}

/// Result of an eligibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    /// Whether a reservation would currently succeed.
    pub eligible: bool,
    /// First failing check, if any.
    pub reason: Option<BookingError>,
}

impl Eligibility {
    const fn eligible() -> Self {
        Self {
            eligible: true,
            reason: None,
        }
    }

    const fn refused(reason: BookingError) -> Self {
        Self {
            eligible: false,
            reason: Some(reason),
        }
    }
}

/// Result of a successful cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOutcome {
    /// The booking, now cancelled.
    pub booking: Booking,
    /// Waitlist entry promoted into the freed seat, if any.
    pub promoted: Option<WaitlistEntry>,
}

/// Everything a reservation needs once the checks have passed.
#[derive(Debug)]
pub(crate) struct Admission {
    pub(crate) snapshot: ScheduleSnapshot,
    pub(crate) membership: Membership,
}

/// The booking core. Cheap to share behind an `Arc`; holds no per-request state.
pub struct BookingEngine<S> {
    pub(crate) store: S,
    clock: Arc<dyn Clock>,
    cancellation: Arc<dyn CancellationPolicy>,
    pub(crate) waitlist_expiry: WaitlistExpiry,
    retry: RetryPolicy,
    events: Option<Arc<dyn EventSink>>,
}

impl<S> BookingEngine<S>
where
    S: BookingStore,
{
    /// Create an engine over `store` with explicit cancellation and waitlist
    /// expiry policies. Uses the system clock and no event sink.
    pub fn new(
        store: S,
        cancellation: Arc<dyn CancellationPolicy>,
        waitlist_expiry: WaitlistExpiry,
    ) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            cancellation,
            waitlist_expiry,
            retry: RetryPolicy::default(),
            events: None,
        }
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach an event sink for the notification layer.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Replace the conflict retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Waitlist operations sharing this engine's store, clock and sink.
    pub const fn waitlist(&self) -> WaitlistManager<'_, S> {
        WaitlistManager::new(self)
    }

    /// Decide whether `member_id` could book `schedule_id` right now.
    ///
    /// Read-only: every check reads the same snapshot. Business refusals
    /// come back as `Ok` with a reason; only storage failures are `Err`.
    ///
    /// # Errors
    ///
    /// [`BookingError::Unavailable`] when the store cannot be reached.
    pub async fn check_eligibility(
        &self,
        member_id: MemberId,
        schedule_id: ScheduleId,
    ) -> Result<Eligibility, BookingError> {
        let now = self.now();
        let mut tx = self.store.begin_read().await?;
        let outcome = Self::evaluate(&mut *tx, member_id, schedule_id, now, LockMode::Read).await;
        release(tx).await;

        match outcome {
            Ok(_) => Ok(Eligibility::eligible()),
            Err(TxError::Refused(reason)) => {
                tracing::debug!(%member_id, %schedule_id, reason = reason.code(), "not eligible");
                Ok(Eligibility::refused(reason))
            }
            Err(TxError::Store(err)) => Err(err.into()),
        }
    }

    /// Reserve a seat and debit the member's credits in one transaction.
    ///
    /// # Errors
    ///
    /// The first failing eligibility check, re-validated under the schedule
    /// lock, or [`BookingError::Unavailable`] on storage failure or after
    /// exhausting conflict retries.
    pub async fn reserve(
        &self,
        member_id: MemberId,
        schedule_id: ScheduleId,
        notes: Option<&str>,
    ) -> Result<Booking, BookingError> {
        let booking = self
            .with_retry("reserve", || self.try_reserve(member_id, schedule_id, notes))
            .await
            .inspect_err(|err| {
                tracing::debug!(%member_id, %schedule_id, reason = err.code(), "reservation refused");
            })?;

        tracing::info!(
            booking_id = %booking.id,
            %member_id,
            %schedule_id,
            credits = booking.credits_debited,
            "booking confirmed"
        );
        self.emit(BookingEvent::BookingConfirmed {
            booking_id: booking.id,
            member_id,
            schedule_id,
        });
        Ok(booking)
    }

    async fn try_reserve(
        &self,
        member_id: MemberId,
        schedule_id: ScheduleId,
        notes: Option<&str>,
    ) -> Result<Booking, TxError> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let result = Self::reserve_in(&mut *tx, member_id, schedule_id, notes, now).await;
        finish(tx, result).await
    }

    async fn reserve_in(
        tx: &mut dyn StoreTx,
        member_id: MemberId,
        schedule_id: ScheduleId,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Booking, TxError> {
        let admission = Self::evaluate(tx, member_id, schedule_id, now, LockMode::Update).await?;
        Self::admit(tx, &admission, member_id, notes, BookingSource::Direct, now).await
    }

    /// Cancel a confirmed booking, refund its credits, then offer the freed
    /// seat to the waitlist.
    ///
    /// The promotion runs as its own transaction after the cancellation has
    /// committed; if it fails the cancellation still stands and
    /// `promote_next` can be re-run.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`], [`BookingError::NotOwner`],
    /// [`BookingError::AlreadyCancelled`], [`BookingError::CutoffPassed`],
    /// or [`BookingError::Unavailable`].
    pub async fn cancel(
        &self,
        booking_id: BookingId,
        actor: Actor,
        reason: Option<&str>,
    ) -> Result<CancelOutcome, BookingError> {
        let booking = self
            .with_retry("cancel", || self.try_cancel(booking_id, actor, reason))
            .await?;

        tracing::info!(
            %booking_id,
            member_id = %booking.member_id,
            refunded = booking.credits_debited,
            "booking cancelled"
        );
        self.emit(BookingEvent::BookingCancelled { booking_id });

        let promoted = match self.waitlist().promote_next(booking.schedule_id).await {
            Ok(promoted) => promoted,
            Err(err) => {
                tracing::warn!(
                    schedule_id = %booking.schedule_id,
                    "waitlist promotion after cancellation failed: {err}"
                );
                None
            }
        };

        Ok(CancelOutcome { booking, promoted })
    }

    async fn try_cancel(
        &self,
        booking_id: BookingId,
        actor: Actor,
        reason: Option<&str>,
    ) -> Result<Booking, TxError> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let result = self
            .cancel_in(&mut *tx, booking_id, actor, reason, now)
            .await;
        finish(tx, result).await
    }

    async fn cancel_in(
        &self,
        tx: &mut dyn StoreTx,
        booking_id: BookingId,
        actor: Actor,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Booking, TxError> {
        let mut booking = tx
            .booking(booking_id, LockMode::Update)
            .await?
            .ok_or(BookingError::NotFound)?;
        if !actor.may_act_for(booking.member_id) {
            return Err(BookingError::NotOwner.into());
        }
        match booking.status {
            BookingStatus::Confirmed => {}
            BookingStatus::Cancelled => return Err(BookingError::AlreadyCancelled.into()),
            BookingStatus::Completed => return Err(BookingError::CutoffPassed.into()),
        }

        let snapshot = tx
            .schedule_with_class(booking.schedule_id, LockMode::Read)
            .await?
            .ok_or(BookingError::NotFound)?;
        if !self.cancellation.allows(&booking, &snapshot.schedule, now) {
            return Err(BookingError::CutoffPassed.into());
        }

        booking.status = BookingStatus::Cancelled;
        booking.cancelled_at = Some(now);
        booking.cancellation_reason = reason.map(str::to_owned);
        tx.update_booking(&booking).await?;

        if let Some(membership_id) = booking.membership_id.filter(|_| booking.credits_debited > 0) {
            tx.adjust_credits(membership_id, i64::from(booking.credits_debited))
                .await?;
        }
        Ok(booking)
    }

    /// The member's confirmed bookings for classes that have not started,
    /// soonest first.
    ///
    /// # Errors
    ///
    /// [`BookingError::Unavailable`] on storage failure.
    pub async fn upcoming_bookings(
        &self,
        member_id: MemberId,
        limit: usize,
    ) -> Result<Vec<Booking>, BookingError> {
        let now = self.now();
        let mut tx = self.store.begin_read().await?;
        let bookings = tx.upcoming_bookings(member_id, now, limit).await;
        release(tx).await;
        Ok(bookings?)
    }

    /// Bookable schedules of a gym starting within `[from, to]`, with live
    /// seat counts.
    ///
    /// # Errors
    ///
    /// [`BookingError::Unavailable`] on storage failure.
    pub async fn available_classes(
        &self,
        gym_id: GymId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScheduleSnapshot>, BookingError> {
        let mut tx = self.store.begin_read().await?;
        let schedules = tx.schedules_between(gym_id, from, to).await;
        release(tx).await;
        Ok(schedules?)
    }

    /// Run the eligibility checks in order against `tx`.
    pub(crate) async fn evaluate(
        tx: &mut dyn StoreTx,
        member_id: MemberId,
        schedule_id: ScheduleId,
        now: DateTime<Utc>,
        lock: LockMode,
    ) -> Result<Admission, TxError> {
        let snapshot = tx
            .schedule_with_class(schedule_id, lock)
            .await?
            .ok_or(BookingError::NotFound)?;
        if !snapshot.is_open() {
            return Err(BookingError::ScheduleClosed.into());
        }
        if !snapshot.starts_after(now) {
            return Err(BookingError::AlreadyStarted.into());
        }
        if tx.confirmed_booking(member_id, schedule_id).await?.is_some() {
            return Err(BookingError::DuplicateBooking.into());
        }
        let membership = tx
            .active_membership(member_id, lock)
            .await?
            .filter(|m| m.is_active_at(now))
            .ok_or(BookingError::NoActiveMembership)?;
        if snapshot.seats_left() == 0 {
            return Err(BookingError::ClassFull.into());
        }
        if !membership.can_cover(snapshot.class.credits_required) {
            return Err(BookingError::InsufficientCredits.into());
        }
        Ok(Admission {
            snapshot,
            membership,
        })
    }

    /// Insert the confirmed booking and debit the ledger.
    pub(crate) async fn admit(
        tx: &mut dyn StoreTx,
        admission: &Admission,
        member_id: MemberId,
        notes: Option<&str>,
        source: BookingSource,
        now: DateTime<Utc>,
    ) -> Result<Booking, TxError> {
        let membership = &admission.membership;
        let (membership_id, credits) = if membership.is_unlimited() {
            (None, 0)
        } else {
            (Some(membership.id), admission.snapshot.class.credits_required)
        };

        let booking = Booking {
            id: BookingId::new(),
            member_id,
            schedule_id: admission.snapshot.schedule.id,
            membership_id,
            status: BookingStatus::Confirmed,
            source,
            credits_debited: credits,
            notes: notes.map(str::to_owned),
            created_at: now,
            cancelled_at: None,
            cancellation_reason: None,
        };

        tx.insert_booking(&booking).await.map_err(|err| match err {
            StoreError::UniqueViolation(_) => TxError::Refused(BookingError::DuplicateBooking),
            other => TxError::Store(other),
        })?;
        if credits > 0 {
            tx.adjust_credits(membership.id, -i64::from(credits)).await?;
        }
        Ok(booking)
    }

    /// Run `attempt` until it succeeds, is refused, or conflicts too often.
    pub(crate) async fn with_retry<T, F, Fut>(
        &self,
        op: &'static str,
        mut attempt: F,
    ) -> Result<T, BookingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TxError>>,
    {
        let mut tries = 0_u32;
        loop {
            tries += 1;
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(TxError::Refused(err)) => return Err(err),
                Err(TxError::Store(StoreError::Conflict(msg)))
                    if tries < self.retry.max_attempts =>
                {
                    tracing::warn!(op, attempt = tries, "transaction conflict, retrying: {msg}");
                    tokio::time::sleep(self.retry.backoff * tries).await;
                }
                Err(TxError::Store(err)) => {
                    tracing::warn!(op, attempt = tries, "transaction failed: {err}");
                    return Err(err.into());
                }
            }
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn emit(&self, event: BookingEvent) {
        if let Some(sink) = &self.events {
            sink.publish(build_event(event, self.now()));
        }
    }
}

/// Commit on success, roll back on failure.
pub(crate) async fn finish<T>(
    tx: Box<dyn StoreTx>,
    result: Result<T, TxError>,
) -> Result<T, TxError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            release(tx).await;
            Err(err)
        }
    }
}

/// Roll back a transaction whose outcome no longer matters.
pub(crate) async fn release(tx: Box<dyn StoreTx>) {
    if let Err(err) = tx.rollback().await {
        tracing::error!("rollback failed: {err}");
    }
}
