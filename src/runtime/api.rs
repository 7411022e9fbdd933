//! API-facing request/response models and handlers for the HTTP layer.
//!
//! Handlers wrap engine calls and turn refusals into [`ErrorBody`] values
//! carrying the stable reason code. Routing and authentication belong to
//! the embedding service.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{
    Actor, Booking, BookingEngine, BookingError, BookingStore, CancelOutcome, WaitlistEntry,
};
use crate::util::serde::{BookingId, MemberId, ScheduleId, WaitlistEntryId};

/// Reservation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveRequest {
    /// Booking member.
    pub member_id: MemberId,
    /// Schedule to book.
    pub schedule_id: ScheduleId,
    /// Optional member note.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Cancellation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    /// Booking to cancel.
    pub booking_id: BookingId,
    /// Who is cancelling.
    pub actor: Actor,
    /// Optional reason.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Member and schedule, for eligibility checks and waitlist joins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    /// Member.
    pub member_id: MemberId,
    /// Schedule.
    pub schedule_id: ScheduleId,
}

/// Waitlist withdrawal payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRequest {
    /// Entry to withdraw.
    pub entry_id: WaitlistEntryId,
    /// Who is withdrawing.
    pub actor: Actor,
}

/// Eligibility response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityResponse {
    /// Whether a reservation would currently succeed.
    pub eligible: bool,
    /// Reason code of the first failing check.
    pub reason: Option<String>,
}

/// Cancellation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    /// The cancelled booking.
    pub booking: Booking,
    /// Waitlist entry promoted into the freed seat.
    pub promoted: Option<WaitlistEntry>,
}

impl From<CancelOutcome> for CancelResponse {
    fn from(outcome: CancelOutcome) -> Self {
        Self {
            booking: outcome.booking,
            promoted: outcome.promoted,
        }
    }
}

/// Error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable reason code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Whether retrying later may succeed.
    pub retryable: bool,
}

impl From<BookingError> for ErrorBody {
    fn from(err: BookingError) -> Self {
        Self {
            code: err.code().to_owned(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
}

/// Check eligibility without side effects.
pub async fn check_eligibility<S: BookingStore>(
    engine: &BookingEngine<S>,
    req: ScheduleRequest,
) -> Result<EligibilityResponse, ErrorBody> {
    let eligibility = engine
        .check_eligibility(req.member_id, req.schedule_id)
        .await?;
    Ok(EligibilityResponse {
        eligible: eligibility.eligible,
        reason: eligibility.reason.map(|r| r.code().to_owned()),
    })
}

/// Reserve a seat.
pub async fn reserve<S: BookingStore>(
    engine: &BookingEngine<S>,
    req: ReserveRequest,
) -> Result<Booking, ErrorBody> {
    Ok(engine
        .reserve(req.member_id, req.schedule_id, req.notes.as_deref())
        .await?)
}

/// Cancel a booking.
pub async fn cancel<S: BookingStore>(
    engine: &BookingEngine<S>,
    req: CancelRequest,
) -> Result<CancelResponse, ErrorBody> {
    let outcome = engine
        .cancel(req.booking_id, req.actor, req.reason.as_deref())
        .await?;
    Ok(outcome.into())
}

/// Join a full schedule's waitlist.
pub async fn join_waitlist<S: BookingStore>(
    engine: &BookingEngine<S>,
    req: ScheduleRequest,
) -> Result<WaitlistEntry, ErrorBody> {
    Ok(engine
        .waitlist()
        .join(req.member_id, req.schedule_id)
        .await?)
}

/// Leave a waitlist.
pub async fn withdraw_from_waitlist<S: BookingStore>(
    engine: &BookingEngine<S>,
    req: WithdrawRequest,
) -> Result<WaitlistEntry, ErrorBody> {
    Ok(engine.waitlist().withdraw(req.entry_id, req.actor).await?)
}

/// Bound a handler by the request deadline. The handler future is dropped
/// on expiry, which rolls back any open transaction.
pub async fn with_deadline<T, F>(deadline: Duration, handler: F) -> Result<T, ErrorBody>
where
    F: Future<Output = Result<T, ErrorBody>>,
{
    tokio::time::timeout(deadline, handler)
        .await
        .unwrap_or_else(|_| {
            tracing::warn!(?deadline, "request deadline exceeded");
            Err(BookingError::Unavailable("request deadline exceeded".into()).into())
        })
}

/// Return a health payload.
#[must_use]
pub const fn health() -> Health {
    Health { ok: true }
}
