//! Lap records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{CarId, LapId, SessionId, TrackId};

/// One lap of a session.
///
/// `length` is the maximum distance observed while the lap was open and never
/// decreases. `time` and `valid` become authoritative once `completed` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lap {
    pub id: LapId,
    pub session: SessionId,
    pub number: i64,
    pub track: Option<TrackId>,
    pub car: Option<CarId>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Lap time in seconds
    pub time: f64,
    /// Maximum distance in meters
    pub length: f64,
    pub valid: bool,
    pub completed: bool,
    #[serde(skip)]
    dirty: bool,
}

impl Lap {
    pub fn new(
        id: LapId,
        session: SessionId,
        number: i64,
        track: Option<TrackId>,
        car: Option<CarId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            session,
            number,
            track,
            car,
            start: now,
            end: now,
            time: 0.0,
            length: 0.0,
            valid: false,
            completed: false,
            dirty: false,
        }
    }

    /// Grow `length` to `distance` if it is further than anything seen so far.
    pub fn extend_length(&mut self, distance: f64) {
        if distance > self.length {
            self.length = distance;
            self.dirty = true;
        }
    }

    pub fn set_valid(&mut self, valid: bool) {
        if self.valid != valid {
            self.valid = valid;
            self.dirty = true;
        }
    }

    pub fn set_time(&mut self, time: f64) {
        if self.time != time {
            self.time = time;
            self.dirty = true;
        }
    }

    pub fn set_end(&mut self, end: DateTime<Utc>) {
        if self.end != end {
            self.end = end;
            self.dirty = true;
        }
    }

    /// Finalize with the authoritative time and validity.
    pub fn finish(&mut self, time: f64, valid: bool) {
        self.set_time(time);
        self.set_valid(valid);
        self.mark_completed();
    }

    /// Mark completed at `end`.
    pub fn complete_at(&mut self, end: DateTime<Utc>) {
        self.set_end(end);
        self.mark_completed();
    }

    fn mark_completed(&mut self) {
        if !self.completed {
            self.completed = true;
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

impl fmt::Display for Lap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} - {} {:.3}s {:.0}m valid: {}",
            self.number,
            self.start.format("%H:%M:%S"),
            self.end.format("%H:%M:%S"),
            self.time,
            self.length,
            self.valid
        )
    }
}
