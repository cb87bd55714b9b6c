//! Session records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CarId, DriverId, GameId, SessionId, SessionTypeId, TrackId};

/// Natural key of a session. Unique across the repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub driver: DriverId,
    pub session_id: String,
    pub session_type: SessionTypeId,
    pub game: GameId,
}

/// Persisted session row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub key: SessionKey,
    pub track: Option<TrackId>,
    pub car: Option<CarId>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(skip)]
    dirty: bool,
}

impl SessionRecord {
    pub fn new(
        id: SessionId,
        key: SessionKey,
        track: Option<TrackId>,
        car: Option<CarId>,
        start: DateTime<Utc>,
    ) -> Self {
        Self { id, key, track, car, start, end: start, dirty: false }
    }

    /// Record activity at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if self.end != now {
            self.end = now;
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
