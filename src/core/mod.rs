//! Booking core: entities, storage contracts, engine and waitlist.

pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod policy;
pub mod store;
pub mod waitlist;

pub use engine::{BookingEngine, CancelOutcome, Eligibility, RetryPolicy};
pub use error::{AppResult, BookingError, StoreError};
pub use events::{build_event, BookingEvent, EventEnvelope, EventSink, InMemoryEventSink};
pub use model::{
    Actor, Booking, BookingSource, BookingStatus, ClassDefinition, ClassSchedule, Membership,
    MembershipStatus, ScheduleSnapshot, ScheduleStatus, WaitlistEntry, WaitlistStatus,
};
pub use policy::{CancellationPolicy, CutoffWindow, WaitlistExpiry};
pub use store::{BookingRows, BookingStore, CatalogTx, LedgerTx, LockMode, StoreTx, WaitlistRows};
pub use waitlist::WaitlistManager;
