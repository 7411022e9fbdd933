//! Error types for booking operations and storage backends.

use thiserror::Error;

/// Outcomes a booking operation can be refused with.
///
/// Every variant except [`BookingError::Unavailable`] is an expected,
/// caller-recoverable business outcome with a stable reason code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    /// Schedule, booking, or waitlist entry does not exist.
    #[error("not found")]
    NotFound,
    /// Schedule is not open for booking.
    #[error("class is not open for booking")]
    ScheduleClosed,
    /// Schedule start time has passed.
    #[error("class has already started")]
    AlreadyStarted,
    /// Member already holds a confirmed booking for the schedule.
    #[error("already booked")]
    DuplicateBooking,
    /// Member has no active membership.
    #[error("no active membership")]
    NoActiveMembership,
    /// No seats left.
    #[error("class is full")]
    ClassFull,
    /// Ledger cannot cover the class's credits.
    #[error("insufficient credits")]
    InsufficientCredits,
    /// Acting member does not own the record.
    #[error("not the owner")]
    NotOwner,
    /// Booking is no longer confirmed.
    #[error("booking already cancelled")]
    AlreadyCancelled,
    /// Cancellation window has closed.
    #[error("cancellation cutoff has passed")]
    CutoffPassed,
    /// Member already waits for the schedule.
    #[error("already on the waitlist")]
    AlreadyWaitlisted,
    /// Schedule has free seats; book directly instead.
    #[error("class is not full")]
    NotFull,
    /// Waitlist entry is not pending.
    #[error("waitlist entry is not waiting")]
    NotWaiting,
    /// Storage or transport failure; the caller may retry with backoff.
    #[error("booking store unavailable: {0}")]
    Unavailable(String),
}

impl BookingError {
    /// Stable reason code for the presentation layer.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::ScheduleClosed => "schedule_closed",
            Self::AlreadyStarted => "already_started",
            Self::DuplicateBooking => "duplicate_booking",
            Self::NoActiveMembership => "no_active_membership",
            Self::ClassFull => "class_full",
            Self::InsufficientCredits => "insufficient_credits",
            Self::NotOwner => "not_owner",
            Self::AlreadyCancelled => "already_cancelled",
            Self::CutoffPassed => "cutoff_passed",
            Self::AlreadyWaitlisted => "already_waitlisted",
            Self::NotFull => "not_full",
            Self::NotWaiting => "not_waiting",
            Self::Unavailable(_) => "unavailable",
        }
    }

    /// Only infrastructure failures are worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Refusals tied to the member rather than the schedule. A waitlist
    /// entry failing one of these is skipped during promotion.
    #[must_use]
    pub const fn is_member_level(&self) -> bool {
        matches!(
            self,
            Self::DuplicateBooking | Self::NoActiveMembership | Self::InsufficientCredits
        )
    }
}

/// Errors produced by storage backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Transaction lost a serialization race or deadlock; safe to rerun.
    #[error("transaction conflict: {0}")]
    Conflict(String),
    /// A uniqueness constraint rejected the write.
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    /// A data invariant rejected the write.
    #[error("constraint violated: {0}")]
    Constraint(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
