//! Infrastructure adapters: storage backends and event fan-out.

pub mod notifier;
pub mod store;

pub use notifier::BroadcastEventSink;
pub use store::{ConfiguredStore, InMemoryStore};
#[cfg(feature = "postgres")]
pub use store::PgBookingStore;
