//! Entities manipulated by the booking core.
//!
//! Entities hold ids of the entities they relate to, never the entities
//! themselves; the storage contracts resolve ids inside a transaction.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::serde::{
    BookingId, ClassId, GymId, MemberId, MembershipId, ScheduleId, WaitlistEntryId,
};

macro_rules! status_strings {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Stable lowercase name, as persisted in storage.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!(concat!("unknown ", stringify!($ty), " `{}`"), other)),
                }
            }
        }
    };
}

/// Catalog entry for a class type. Never mutated by the booking core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDefinition {
    /// Class identifier.
    pub id: ClassId,
    /// Owning gym.
    pub gym_id: GymId,
    /// Display name.
    pub name: String,
    /// Default seat capacity for schedules of this class.
    pub capacity: u32,
    /// Credits debited per booking.
    pub credits_required: u32,
    /// Inactive classes are not bookable.
    pub is_active: bool,
}

/// Lifecycle of a scheduled class occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// Open for booking until it starts.
    Scheduled,
    /// Called off by staff.
    Cancelled,
    /// Took place.
    Completed,
}

status_strings!(ScheduleStatus {
    Scheduled => "scheduled",
    Cancelled => "cancelled",
    Completed => "completed",
});

/// One concrete, time-boxed occurrence of a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSchedule {
    /// Schedule identifier.
    pub id: ScheduleId,
    /// Class this occurrence belongs to.
    pub class_id: ClassId,
    /// Start instant.
    pub start_time: DateTime<Utc>,
    /// End instant.
    pub end_time: DateTime<Utc>,
    /// Capacity for this occurrence only, replacing the class default.
    pub capacity_override: Option<u32>,
    /// Price for this occurrence only, in cents.
    pub price_override_cents: Option<i64>,
    /// Lifecycle status.
    pub status: ScheduleStatus,
}

/// A schedule joined with its class and the live confirmed-booking count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    /// The schedule row.
    pub schedule: ClassSchedule,
    /// The class the schedule instantiates.
    pub class: ClassDefinition,
    /// Number of `Confirmed` bookings for the schedule.
    pub confirmed_count: u32,
}

impl ScheduleSnapshot {
    /// Override if set, else the class default.
    #[must_use]
    pub fn effective_capacity(&self) -> u32 {
        self.schedule
            .capacity_override
            .unwrap_or(self.class.capacity)
    }

    /// Free seats; zero when the schedule is full or overbooked by a capacity cut.
    #[must_use]
    pub fn seats_left(&self) -> u32 {
        self.effective_capacity().saturating_sub(self.confirmed_count)
    }

    /// Schedule is `Scheduled` and its class is active.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.schedule.status == ScheduleStatus::Scheduled && self.class.is_active
    }

    /// Start time strictly after `now`.
    #[must_use]
    pub fn starts_after(&self, now: DateTime<Utc>) -> bool {
        self.schedule.start_time > now
    }
}

/// Booking lifecycle. Nothing re-enters `Confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Seat held; counts against capacity.
    Confirmed,
    /// Released by member or staff.
    Cancelled,
    /// Attended; set by the attendance collaborator.
    Completed,
}

status_strings!(BookingStatus {
    Confirmed => "confirmed",
    Cancelled => "cancelled",
    Completed => "completed",
});

/// How a booking came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingSource {
    /// Booked by the member directly.
    Direct,
    /// Created by promoting a waitlist entry.
    Waitlist,
}

status_strings!(BookingSource {
    Direct => "direct",
    Waitlist => "waitlist",
});

/// A reservation fact. Soft status transitions only; never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking identifier.
    pub id: BookingId,
    /// Member holding the seat.
    pub member_id: MemberId,
    /// Schedule the seat belongs to.
    pub schedule_id: ScheduleId,
    /// Membership the credits were taken from; `None` when the ledger was unlimited.
    pub membership_id: Option<MembershipId>,
    /// Lifecycle status.
    pub status: BookingStatus,
    /// Direct booking or waitlist promotion.
    pub source: BookingSource,
    /// Credits taken from the ledger at reservation time.
    pub credits_debited: u32,
    /// Free-form note left by the member.
    pub notes: Option<String>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Cancellation instant.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Why the booking was cancelled.
    pub cancellation_reason: Option<String>,
}

/// Subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    /// In good standing.
    Active,
    /// Temporarily suspended.
    Paused,
    /// Ended by the member or gym.
    Cancelled,
    /// Ran past its end date.
    Expired,
}

status_strings!(MembershipStatus {
    Active => "active",
    Paused => "paused",
    Cancelled => "cancelled",
    Expired => "expired",
});

/// A member's subscription and class-credit ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Membership identifier.
    pub id: MembershipId,
    /// Owning member.
    pub member_id: MemberId,
    /// Subscription state.
    pub status: MembershipStatus,
    /// Remaining class credits; `None` means unlimited.
    pub class_credits_remaining: Option<u32>,
    /// Membership is frozen until this instant.
    pub frozen_until: Option<DateTime<Utc>>,
}

impl Membership {
    /// Active and not frozen at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == MembershipStatus::Active
            && self.frozen_until.is_none_or(|until| until <= now)
    }

    /// Whether the ledger can cover `credits`.
    #[must_use]
    pub fn can_cover(&self, credits: u32) -> bool {
        self.class_credits_remaining
            .is_none_or(|remaining| remaining >= credits)
    }

    /// Whether credits are tracked at all.
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.class_credits_remaining.is_none()
    }
}

/// Waitlist entry lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitlistStatus {
    /// Queued for a seat.
    Waiting,
    /// Queued, and the member has been told about their position.
    Notified,
    /// Skipped: lapsed, or the member was no longer eligible when reached.
    Expired,
    /// Turned into a confirmed booking.
    Promoted,
    /// Removed by the member.
    Withdrawn,
}

status_strings!(WaitlistStatus {
    Waiting => "waiting",
    Notified => "notified",
    Expired => "expired",
    Promoted => "promoted",
    Withdrawn => "withdrawn",
});

impl WaitlistStatus {
    /// Still holds a position in the queue.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Waiting | Self::Notified)
    }
}

/// A member's place in a schedule's waitlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    /// Entry identifier.
    pub id: WaitlistEntryId,
    /// Waiting member.
    pub member_id: MemberId,
    /// Schedule waited on.
    pub schedule_id: ScheduleId,
    /// 1-based position among pending entries of the schedule.
    pub position: u32,
    /// Join instant.
    pub joined_at: DateTime<Utc>,
    /// When the member was last notified.
    pub notified_at: Option<DateTime<Utc>>,
    /// Entry lapses at this instant.
    pub expires_at: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: WaitlistStatus,
}

impl WaitlistEntry {
    /// Lapsed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Party performing a cancellation or withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "member_id")]
pub enum Actor {
    /// The member acting on their own behalf.
    Member(MemberId),
    /// Gym staff; bypasses ownership checks.
    Staff,
}

impl Actor {
    /// Whether this actor may act on a record owned by `owner`.
    #[must_use]
    pub fn may_act_for(self, owner: MemberId) -> bool {
        match self {
            Self::Member(id) => id == owner,
            Self::Staff => true,
        }
    }
}
