//! Tests for error types

use gym_booking::core::{BookingError, StoreError};

#[test]
fn test_class_full_error() {
    let err = BookingError::ClassFull;
    assert_eq!(format!("{}", err), "class is full");
    assert_eq!(err.code(), "class_full");
}

#[test]
fn test_reason_codes_are_stable() {
    let cases = [
        (BookingError::NotFound, "not_found"),
        (BookingError::ScheduleClosed, "schedule_closed"),
        (BookingError::AlreadyStarted, "already_started"),
        (BookingError::DuplicateBooking, "duplicate_booking"),
        (BookingError::NoActiveMembership, "no_active_membership"),
        (BookingError::InsufficientCredits, "insufficient_credits"),
        (BookingError::NotOwner, "not_owner"),
        (BookingError::AlreadyCancelled, "already_cancelled"),
        (BookingError::CutoffPassed, "cutoff_passed"),
        (BookingError::AlreadyWaitlisted, "already_waitlisted"),
        (BookingError::NotFull, "not_full"),
        (BookingError::NotWaiting, "not_waiting"),
    ];
    for (err, code) in cases {
        assert_eq!(err.code(), code);
        assert!(!err.is_retryable());
    }
}

#[test]
fn test_conflict_becomes_unavailable() {
    let err: BookingError = StoreError::Conflict("could not serialize access".to_string()).into();
    assert_eq!(err.code(), "unavailable");
    assert!(err.is_retryable());
    assert_eq!(
        format!("{}", err),
        "booking store unavailable: transaction conflict: could not serialize access"
    );
}

#[test]
fn test_backend_error() {
    let err = StoreError::Backend("connection failed".to_string());
    assert_eq!(format!("{}", err), "backend error: connection failed");
}
