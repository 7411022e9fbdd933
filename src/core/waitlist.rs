//! Per-schedule FIFO waitlists.
//!
//! Pending entries of a schedule always occupy positions `1..=n`; every
//! removal renumbers the entries behind it in the same transaction.
//! Every write to a waitlist first locks the schedule row, then the entry,
//! so positions are always read and renumbered under the schedule lock.
//! Promotion walks the queue head-first and skips (expires) entries whose
//! member can no longer book, so a stale entry never holds a seat back from
//! an eligible member further down.

use chrono::{DateTime, Utc};

use crate::core::engine::{finish, release, BookingEngine, TxError};
use crate::core::events::BookingEvent;
use crate::core::model::{
    Actor, Booking, BookingSource, WaitlistEntry, WaitlistStatus,
};
use crate::core::store::{renumber_waitlist, BookingStore, LockMode, StoreTx};
use crate::core::{BookingError, StoreError};
use crate::util::serde::{MemberId, ScheduleId, WaitlistEntryId};

/// Outcome of one promotion transaction.
enum PromotionStep {
    /// Head entry became a confirmed booking.
    Promoted {
        entry: WaitlistEntry,
        booking: Booking,
    },
    /// Head entry was expired; the queue moved up by one.
    Skipped(WaitlistEntry),
    /// Nothing to do: no free seat, schedule not bookable, or queue empty.
    Idle,
}

/// Waitlist operations, borrowed from a [`BookingEngine`].
pub struct WaitlistManager<'a, S> {
    engine: &'a BookingEngine<S>,
}

impl<'a, S> WaitlistManager<'a, S>
where
    S: BookingStore,
{
    pub(crate) const fn new(engine: &'a BookingEngine<S>) -> Self {
        Self { engine }
    }

    /// Queue `member_id` for a full schedule.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`], [`BookingError::ScheduleClosed`],
    /// [`BookingError::AlreadyStarted`], [`BookingError::DuplicateBooking`],
    /// [`BookingError::AlreadyWaitlisted`], [`BookingError::NotFull`], or
    /// [`BookingError::Unavailable`].
    pub async fn join(
        &self,
        member_id: MemberId,
        schedule_id: ScheduleId,
    ) -> Result<WaitlistEntry, BookingError> {
        let entry = self
            .engine
            .with_retry("waitlist.join", || self.try_join(member_id, schedule_id))
            .await?;

        tracing::info!(
            entry_id = %entry.id,
            %member_id,
            %schedule_id,
            position = entry.position,
            "joined waitlist"
        );
        self.engine.emit(BookingEvent::WaitlistJoined {
            entry_id: entry.id,
            member_id,
            schedule_id,
            position: entry.position,
        });
        Ok(entry)
    }

    async fn try_join(
        &self,
        member_id: MemberId,
        schedule_id: ScheduleId,
    ) -> Result<WaitlistEntry, TxError> {
        let now = self.engine.now();
        let mut tx = self.engine.store.begin().await?;
        let result = self.join_in(&mut *tx, member_id, schedule_id, now).await;
        finish(tx, result).await
    }

    async fn join_in(
        &self,
        tx: &mut dyn StoreTx,
        member_id: MemberId,
        schedule_id: ScheduleId,
        now: DateTime<Utc>,
    ) -> Result<WaitlistEntry, TxError> {
        let snapshot = tx
            .schedule_with_class(schedule_id, LockMode::Update)
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

        let pending = tx.pending_entries(schedule_id).await?;
        if pending.iter().any(|e| e.member_id == member_id) {
            return Err(BookingError::AlreadyWaitlisted.into());
        }
        if snapshot.seats_left() > 0 {
            return Err(BookingError::NotFull.into());
        }

        let entry = WaitlistEntry {
            id: WaitlistEntryId::new(),
            member_id,
            schedule_id,
            position: pending.last().map_or(1, |last| last.position + 1),
            joined_at: now,
            notified_at: None,
            expires_at: self.engine.waitlist_expiry.expires_at(now),
            status: WaitlistStatus::Waiting,
        };
        tx.insert_waitlist_entry(&entry).await?;
        Ok(entry)
    }

    /// Hand a freed seat to the first eligible waiting member.
    ///
    /// Entries at the head of the queue that have lapsed, or whose member
    /// fails a member-level check, are expired and skipped, each in its own
    /// transaction, until one promotion succeeds or the queue is exhausted.
    /// Calling this on a full schedule or an empty waitlist is a no-op.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown schedule, or
    /// [`BookingError::Unavailable`].
    pub async fn promote_next(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Option<WaitlistEntry>, BookingError> {
        loop {
            let step = self
                .engine
                .with_retry("waitlist.promote_next", || self.try_promote(schedule_id))
                .await?;

            match step {
                PromotionStep::Promoted { entry, booking } => {
                    tracing::info!(
                        entry_id = %entry.id,
                        booking_id = %booking.id,
                        member_id = %entry.member_id,
                        %schedule_id,
                        "waitlist entry promoted"
                    );
                    self.engine.emit(BookingEvent::BookingConfirmed {
                        booking_id: booking.id,
                        member_id: booking.member_id,
                        schedule_id,
                    });
                    self.engine.emit(BookingEvent::WaitlistPromoted {
                        entry_id: entry.id,
                        booking_id: booking.id,
                    });
                    return Ok(Some(entry));
                }
                PromotionStep::Skipped(entry) => {
                    tracing::info!(
                        entry_id = %entry.id,
                        member_id = %entry.member_id,
                        %schedule_id,
                        "waitlist entry skipped"
                    );
                    self.engine
                        .emit(BookingEvent::WaitlistExpired { entry_id: entry.id });
                }
                PromotionStep::Idle => return Ok(None),
            }
        }
    }

    async fn try_promote(&self, schedule_id: ScheduleId) -> Result<PromotionStep, TxError> {
        let now = self.engine.now();
        let mut tx = self.engine.store.begin().await?;
        let result = Self::promote_in(&mut *tx, schedule_id, now).await;
        finish(tx, result).await
    }

    async fn promote_in(
        tx: &mut dyn StoreTx,
        schedule_id: ScheduleId,
        now: DateTime<Utc>,
    ) -> Result<PromotionStep, TxError> {
        let snapshot = tx
            .schedule_with_class(schedule_id, LockMode::Update)
            .await?
            .ok_or(BookingError::NotFound)?;
        if !snapshot.is_open() || !snapshot.starts_after(now) || snapshot.seats_left() == 0 {
            return Ok(PromotionStep::Idle);
        }

        let Some(head_id) = tx
            .pending_entries(schedule_id)
            .await?
            .first()
            .map(|entry| entry.id)
        else {
            return Ok(PromotionStep::Idle);
        };
        let mut head = tx
            .waitlist_entry(head_id, LockMode::Update)
            .await?
            .filter(|entry| entry.status.is_pending())
            .ok_or_else(|| {
                StoreError::Conflict(format!("waitlist entry {head_id} left the queue"))
            })?;
        if head.is_expired_at(now) {
            let entry = retire(tx, head, WaitlistStatus::Expired).await?;
            return Ok(PromotionStep::Skipped(entry));
        }

        let member_id = head.member_id;
        match BookingEngine::<S>::evaluate(tx, member_id, schedule_id, now, LockMode::Update).await
        {
            Ok(admission) => {
                let booking = BookingEngine::<S>::admit(
                    tx,
                    &admission,
                    member_id,
                    None,
                    BookingSource::Waitlist,
                    now,
                )
                .await?;
                head.status = WaitlistStatus::Promoted;
                tx.update_waitlist_entry(&head).await?;
                renumber_waitlist(tx, schedule_id).await?;
                Ok(PromotionStep::Promoted {
                    entry: head,
                    booking,
                })
            }
            Err(TxError::Refused(reason)) if reason.is_member_level() => {
                tracing::debug!(
                    entry_id = %head.id,
                    %member_id,
                    reason = reason.code(),
                    "waiting member no longer eligible"
                );
                let entry = retire(tx, head, WaitlistStatus::Expired).await?;
                Ok(PromotionStep::Skipped(entry))
            }
            Err(TxError::Refused(_)) => Ok(PromotionStep::Idle),
            Err(err) => Err(err),
        }
    }

    /// Remove a pending entry at the member's request.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`], [`BookingError::NotOwner`],
    /// [`BookingError::NotWaiting`], or [`BookingError::Unavailable`].
    pub async fn withdraw(
        &self,
        entry_id: WaitlistEntryId,
        actor: Actor,
    ) -> Result<WaitlistEntry, BookingError> {
        let entry = self
            .engine
            .with_retry("waitlist.withdraw", || self.try_withdraw(entry_id, actor))
            .await?;
        tracing::info!(%entry_id, member_id = %entry.member_id, "left waitlist");
        Ok(entry)
    }

    async fn try_withdraw(
        &self,
        entry_id: WaitlistEntryId,
        actor: Actor,
    ) -> Result<WaitlistEntry, TxError> {
        let mut tx = self.engine.store.begin().await?;
        let result = Self::withdraw_in(&mut *tx, entry_id, actor).await;
        finish(tx, result).await
    }

    async fn withdraw_in(
        tx: &mut dyn StoreTx,
        entry_id: WaitlistEntryId,
        actor: Actor,
    ) -> Result<WaitlistEntry, TxError> {
        let entry = lock_entry(tx, entry_id).await?;
        if !actor.may_act_for(entry.member_id) {
            return Err(BookingError::NotOwner.into());
        }
        if !entry.status.is_pending() {
            return Err(BookingError::NotWaiting.into());
        }
        Ok(retire(tx, entry, WaitlistStatus::Withdrawn).await?)
    }

    /// Record that the member behind a pending entry has been notified.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`], [`BookingError::NotWaiting`], or
    /// [`BookingError::Unavailable`].
    pub async fn mark_notified(
        &self,
        entry_id: WaitlistEntryId,
    ) -> Result<WaitlistEntry, BookingError> {
        self.engine
            .with_retry("waitlist.mark_notified", || self.try_mark_notified(entry_id))
            .await
    }

    async fn try_mark_notified(&self, entry_id: WaitlistEntryId) -> Result<WaitlistEntry, TxError> {
        let now = self.engine.now();
        let mut tx = self.engine.store.begin().await?;
        let result = Self::mark_notified_in(&mut *tx, entry_id, now).await;
        finish(tx, result).await
    }

    async fn mark_notified_in(
        tx: &mut dyn StoreTx,
        entry_id: WaitlistEntryId,
        now: DateTime<Utc>,
    ) -> Result<WaitlistEntry, TxError> {
        let mut entry = lock_entry(tx, entry_id).await?;
        if !entry.status.is_pending() {
            return Err(BookingError::NotWaiting.into());
        }
        entry.status = WaitlistStatus::Notified;
        entry.notified_at = Some(now);
        tx.update_waitlist_entry(&entry).await?;
        Ok(entry)
    }

    /// Expire every pending entry of a schedule that has passed its expiry
    /// instant. Returns how many were expired.
    ///
    /// # Errors
    ///
    /// [`BookingError::Unavailable`] on storage failure.
    pub async fn prune_expired(&self, schedule_id: ScheduleId) -> Result<usize, BookingError> {
        let expired = self
            .engine
            .with_retry("waitlist.prune_expired", || self.try_prune(schedule_id))
            .await?;

        if !expired.is_empty() {
            tracing::info!(%schedule_id, count = expired.len(), "pruned expired waitlist entries");
        }
        for entry_id in &expired {
            self.engine
                .emit(BookingEvent::WaitlistExpired { entry_id: *entry_id });
        }
        Ok(expired.len())
    }

    async fn try_prune(&self, schedule_id: ScheduleId) -> Result<Vec<WaitlistEntryId>, TxError> {
        let now = self.engine.now();
        let mut tx = self.engine.store.begin().await?;
        let result = Self::prune_in(&mut *tx, schedule_id, now)
            .await
            .map_err(TxError::from);
        finish(tx, result).await
    }

    async fn prune_in(
        tx: &mut dyn StoreTx,
        schedule_id: ScheduleId,
        now: DateTime<Utc>,
    ) -> Result<Vec<WaitlistEntryId>, StoreError> {
        if tx
            .schedule_with_class(schedule_id, LockMode::Update)
            .await?
            .is_none()
        {
            return Ok(Vec::new());
        }
        let mut expired = Vec::new();
        for mut entry in tx.pending_entries(schedule_id).await? {
            if entry.is_expired_at(now) {
                entry.status = WaitlistStatus::Expired;
                tx.update_waitlist_entry(&entry).await?;
                expired.push(entry.id);
            }
        }
        if !expired.is_empty() {
            renumber_waitlist(tx, schedule_id).await?;
        }
        Ok(expired)
    }

    /// Pending entries of a schedule in queue order.
    ///
    /// # Errors
    ///
    /// [`BookingError::Unavailable`] on storage failure.
    pub async fn entries(&self, schedule_id: ScheduleId) -> Result<Vec<WaitlistEntry>, BookingError> {
        let mut tx = self.engine.store.begin_read().await?;
        let entries = tx.pending_entries(schedule_id).await;
        release(tx).await;
        Ok(entries?)
    }
}

/// Lock the schedule an entry belongs to, then the entry itself.
async fn lock_entry(
    tx: &mut dyn StoreTx,
    entry_id: WaitlistEntryId,
) -> Result<WaitlistEntry, TxError> {
    let schedule_id = tx
        .waitlist_entry(entry_id, LockMode::Read)
        .await?
        .ok_or(BookingError::NotFound)?
        .schedule_id;
    tx.schedule_with_class(schedule_id, LockMode::Update)
        .await?
        .ok_or(BookingError::NotFound)?;
    Ok(tx
        .waitlist_entry(entry_id, LockMode::Update)
        .await?
        .ok_or(BookingError::NotFound)?)
}

/// Move an entry to a terminal status and close the gap it leaves.
async fn retire(
    tx: &mut dyn StoreTx,
    mut entry: WaitlistEntry,
    status: WaitlistStatus,
) -> Result<WaitlistEntry, StoreError> {
    entry.status = status;
    tx.update_waitlist_entry(&entry).await?;
    renumber_waitlist(tx, entry.schedule_id).await?;
    Ok(entry)
}
