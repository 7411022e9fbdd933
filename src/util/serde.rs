//! Serializable identifier types shared across the booking core.
//!
//! Entities reference each other only through these ids; lookups go through
//! the storage contracts in [`crate::core::store`].

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Underlying UUID value.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Gym (tenant) identifier.
    GymId
);
id_type!(
    /// Member identifier.
    MemberId
);
id_type!(
    /// Class definition identifier.
    ClassId
);
id_type!(
    /// Scheduled class occurrence identifier.
    ScheduleId
);
id_type!(
    /// Booking identifier.
    BookingId
);
id_type!(
    /// Membership (subscription instance) identifier.
    MembershipId
);
id_type!(
    /// Waitlist entry identifier.
    WaitlistEntryId
);
