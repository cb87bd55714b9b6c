//! Racing records produced and consumed by the analysis core.
//!
//! Reference data (games, cars, tracks, landmarks) is read-only during
//! analysis. Sessions, laps and segments are mutated tick by tick; each of
//! them carries an explicit dirty flag that is raised by its mutators and
//! cleared by the registry once the repository has accepted a save.

mod lap;
mod reference;
mod segment;
mod session;

pub use lap::Lap;
pub use reference::{Car, CarClass, Driver, Game, Landmark, LandmarkKind, SessionType, Track};
pub use segment::Segment;
pub use session::{SessionKey, SessionRecord};

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! record_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(pub u64);

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

record_id!(
    /// Primary key of a [`Game`]
    GameId,
    /// Primary key of a [`CarClass`]
    CarClassId,
    /// Primary key of a [`Car`]
    CarId,
    /// Primary key of a [`Track`]
    TrackId,
    /// Primary key of a [`Driver`]
    DriverId,
    /// Primary key of a [`SessionType`]
    SessionTypeId,
    /// Primary key of a [`SessionRecord`]
    SessionId,
    /// Primary key of a [`Lap`]
    LapId,
    /// Primary key of a [`Landmark`]
    LandmarkId,
    /// Primary key of a [`Segment`]
    SegmentId,
);

/// Result of a get-or-create call: the record plus whether it was just created.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub record: T,
    pub created: bool,
}

impl<T> Fetched<T> {
    pub fn created(record: T) -> Self {
        Self { record, created: true }
    }

    pub fn existing(record: T) -> Self {
        Self { record, created: false }
    }
}
