//! Booking store backends.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use crate::core::store::{BookingStore, StoreTx};
use crate::core::StoreError;

pub use memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgBookingStore;

/// Backend selected at runtime from configuration.
#[derive(Clone)]
pub enum ConfiguredStore {
    /// Process-local store.
    InMemory(InMemoryStore),
    /// Postgres pool.
    #[cfg(feature = "postgres")]
    Postgres(PgBookingStore),
}

impl ConfiguredStore {
    /// Short backend name for logs.
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::InMemory(_) => "in_memory",
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => "postgres",
        }
    }
}

#[async_trait]
impl BookingStore for ConfiguredStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        match self {
            Self::InMemory(store) => store.begin().await,
            #[cfg(feature = "postgres")]
            Self::Postgres(store) => store.begin().await,
        }
    }

    async fn begin_read(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        match self {
            Self::InMemory(store) => store.begin_read().await,
            #[cfg(feature = "postgres")]
            Self::Postgres(store) => store.begin_read().await,
        }
    }
}
