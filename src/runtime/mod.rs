//! API surface for the embedding HTTP layer.

pub mod api;

pub use api::{
    cancel, check_eligibility, health, join_waitlist, reserve, with_deadline,
    withdraw_from_waitlist, ErrorBody,
};
