//! Static reference data

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{CarClassId, CarId, DriverId, GameId, LandmarkId, SessionTypeId, TrackId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarClass {
    pub id: CarClassId,
    pub game: GameId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Car {
    pub id: CarId,
    pub game: GameId,
    pub name: String,
    pub car_class: Option<CarClassId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionType {
    pub id: SessionTypeId,
    pub name: String,
}

/// A track of one game. Its length grows to the longest lap seen on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub game: GameId,
    pub name: String,
    /// Length in meters
    pub length: u32,
    #[serde(skip)]
    dirty: bool,
}

impl Track {
    pub fn new(id: TrackId, game: GameId, name: impl Into<String>, length: u32) -> Self {
        Self { id, game, name: name.into(), length, dirty: false }
    }

    /// Raise the stored length if `length` exceeds it. Returns whether it changed.
    pub fn raise_length(&mut self, length: u32) -> bool {
        if length > self.length {
            self.length = length;
            self.dirty = true;
            return true;
        }
        false
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

/// Kind of a landmark. Only `Segment` landmarks partition the track for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LandmarkKind {
    Turn,
    Segment,
    #[default]
    Misc,
}

/// Named distance range on a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: LandmarkId,
    pub track: TrackId,
    pub name: String,
    pub kind: LandmarkKind,
    /// Start distance in meters
    pub start: f64,
    /// End distance in meters; smaller than `start` when the range wraps the finish line
    pub end: f64,
}

impl Landmark {
    /// Whether the range crosses the finish line.
    pub fn wraps(&self) -> bool {
        self.start > self.end
    }

    /// Inclusive containment, wrap-aware.
    pub fn contains(&self, distance: f64) -> bool {
        if self.wraps() {
            distance >= self.start || distance <= self.end
        } else {
            self.start <= distance && distance <= self.end
        }
    }
}

impl fmt::Display for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            LandmarkKind::Turn => "turn",
            LandmarkKind::Segment => "segment",
            LandmarkKind::Misc => "misc",
        };
        write!(f, "{} ({}) [{}-{}]", self.name, kind, self.start, self.end)
    }
}
