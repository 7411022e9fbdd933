//! # Gym Booking
//!
//! Class-booking core for a multi-tenant gym-management platform.
//!
//! The crate decides whether a member may reserve a seat in a scheduled
//! class, reserves the seat while debiting the member's class credits in one
//! transaction, cancels with refund, and keeps a FIFO waitlist per schedule
//! that is promoted automatically when a seat frees up.
//!
//! ## Guarantees
//!
//! - **Capacity**: confirmed bookings of a schedule never exceed its
//!   effective capacity, however many reservations race for the last seat.
//! - **One seat per member**: at most one confirmed booking per member and
//!   schedule.
//! - **Ledger consistency**: a booking and its credit debit commit together
//!   or not at all; credits never go negative.
//! - **Fair waitlists**: pending positions stay contiguous and promotion
//!   follows join order, skipping members who can no longer book.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gym_booking::core::{BookingEngine, CutoffWindow, WaitlistExpiry};
//! use gym_booking::infra::InMemoryStore;
//!
//! let engine = BookingEngine::new(
//!     InMemoryStore::new(),
//!     Arc::new(CutoffWindow::with_notice(chrono::Duration::hours(2))),
//!     WaitlistExpiry::never(),
//! );
//!
//! let booking = engine.reserve(member_id, schedule_id, None).await?;
//! let outcome = engine.cancel(booking.id, Actor::Member(member_id), None).await?;
//! ```
//!
//! Engines can also be assembled from [`config::BookingConfig`] with
//! [`builders::build_from_config`].

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Booking engine, waitlist manager, entities and storage contracts.
pub mod core;
/// Configuration models for the booking core and store backends.
pub mod config;
/// Builders to construct engines from configuration.
pub mod builders;
/// Infrastructure adapters for storage backends and event fan-out.
pub mod infra;
/// Request/response models and handlers for the HTTP layer.
pub mod runtime;
/// Shared utilities.
pub mod util;
