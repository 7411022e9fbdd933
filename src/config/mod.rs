//! Configuration models for the booking core and its store backend.

pub mod booking;

pub use booking::{BookingConfig, StoreBackendConfig};
