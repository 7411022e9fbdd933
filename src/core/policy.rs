//! Time-window policies supplied by the embedding application.

use chrono::{DateTime, Duration, Utc};

use crate::core::model::{Booking, ClassSchedule};

/// Decides whether a confirmed booking may still be cancelled.
pub trait CancellationPolicy: Send + Sync {
    /// `true` if `booking` may be cancelled at `now`.
    fn allows(&self, booking: &Booking, schedule: &ClassSchedule, now: DateTime<Utc>) -> bool;
}

/// Cancellation allowed until `notice` before the class starts.
///
/// Without a notice period, cancellation is allowed up to the start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutoffWindow {
    notice: Option<Duration>,
}

impl CutoffWindow {
    /// Require `notice` between cancellation and class start.
    #[must_use]
    pub const fn with_notice(notice: Duration) -> Self {
        Self {
            notice: Some(notice),
        }
    }

    /// Allow cancellation any time before start.
    #[must_use]
    pub const fn until_start() -> Self {
        Self { notice: None }
    }

    /// Last instant at which cancellation is allowed.
    #[must_use]
    pub fn deadline(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        self.notice.map_or(start, |notice| start - notice)
    }
}

impl CancellationPolicy for CutoffWindow {
    fn allows(&self, _booking: &Booking, schedule: &ClassSchedule, now: DateTime<Utc>) -> bool {
        match self.notice {
            Some(_) => now <= self.deadline(schedule.start_time),
            None => now < schedule.start_time,
        }
    }
}

/// How long a waitlist entry stays pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitlistExpiry {
    ttl: Option<Duration>,
}

impl WaitlistExpiry {
    /// Entries lapse `ttl` after joining.
    #[must_use]
    pub const fn after(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }

    /// Entries never lapse on their own.
    #[must_use]
    pub const fn never() -> Self {
        Self { ttl: None }
    }

    /// Expiry instant for an entry joined at `joined_at`.
    #[must_use]
    pub fn expires_at(&self, joined_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.ttl.map(|ttl| joined_at + ttl)
    }
}
