//! Persistence boundary.
//!
//! The analysis core only needs get-or-create and save operations on a keyed
//! store. [`Repository`] is that contract; the persistence engine behind it is
//! someone else's concern. Implementations must be safe to call from several
//! worker tasks at once: concurrent get-or-create calls with the same natural
//! key have to resolve to a single record.
//!
//! [`InMemoryRepository`] is a complete reference implementation used by the
//! tests, the benches and tick-log replays.

mod memory;

pub use memory::{InMemoryRepository, RepositoryStats};

use chrono::{DateTime, Utc};

use crate::Result;
use crate::model::{
    Car, CarClass, CarClassId, CarId, Driver, DriverId, Fetched, Game, GameId, Landmark, Lap,
    LapId, LandmarkId, Segment, SessionId, SessionKey, SessionRecord, SessionType, Track, TrackId,
};

/// Filter for session queries. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionFilter {
    pub driver: Option<DriverId>,
    pub game: Option<GameId>,
    pub track: Option<TrackId>,
    pub car: Option<CarId>,
    pub session_id: Option<String>,
}

impl SessionFilter {
    pub fn matches(&self, session: &SessionRecord) -> bool {
        self.driver.is_none_or(|d| session.key.driver == d)
            && self.game.is_none_or(|g| session.key.game == g)
            && self.track.is_none_or(|t| session.track == Some(t))
            && self.car.is_none_or(|c| session.car == Some(c))
            && self.session_id.as_ref().is_none_or(|id| &session.key.session_id == id)
    }
}

/// Filter for lap queries. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LapFilter {
    pub session: Option<SessionId>,
    pub track: Option<TrackId>,
    pub car: Option<CarId>,
    pub valid: Option<bool>,
    pub completed: Option<bool>,
}

impl LapFilter {
    pub fn matches(&self, lap: &Lap) -> bool {
        self.session.is_none_or(|s| lap.session == s)
            && self.track.is_none_or(|t| lap.track == Some(t))
            && self.car.is_none_or(|c| lap.car == Some(c))
            && self.valid.is_none_or(|v| lap.valid == v)
            && self.completed.is_none_or(|c| lap.completed == c)
    }
}

/// Keyed store for racing records.
pub trait Repository: Send + Sync {
    fn get_or_create_game(&self, name: &str) -> Result<Fetched<Game>>;

    fn get_or_create_car_class(&self, game: GameId, name: &str) -> Result<Fetched<CarClass>>;

    fn get_or_create_car(
        &self,
        game: GameId,
        name: &str,
        car_class: Option<CarClassId>,
    ) -> Result<Fetched<Car>>;

    fn get_or_create_track(&self, game: GameId, name: &str) -> Result<Fetched<Track>>;

    fn get_or_create_driver(&self, name: &str) -> Result<Fetched<Driver>>;

    fn get_or_create_session_type(&self, name: &str) -> Result<Fetched<SessionType>>;

    /// Get or create by natural key; `track`, `car` and `now` are only used on creation.
    fn get_or_create_session(
        &self,
        key: &SessionKey,
        track: Option<TrackId>,
        car: Option<CarId>,
        now: DateTime<Utc>,
    ) -> Result<Fetched<SessionRecord>>;

    /// Get or create the lap `number` of `session`; `now` seeds start and end on creation.
    fn get_or_create_lap(
        &self,
        session: SessionId,
        number: i64,
        track: Option<TrackId>,
        car: Option<CarId>,
        now: DateTime<Utc>,
    ) -> Result<Fetched<Lap>>;

    fn get_or_create_segment(&self, lap: LapId, landmark: LandmarkId) -> Result<Fetched<Segment>>;

    /// All landmarks of a track, any kind.
    fn landmarks(&self, track: TrackId) -> Result<Vec<Landmark>>;

    fn save_track(&self, track: &Track) -> Result<()>;

    fn save_session(&self, session: &SessionRecord) -> Result<()>;

    fn save_lap(&self, lap: &Lap) -> Result<()>;

    fn save_segment(&self, segment: &Segment) -> Result<()>;

    fn sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionRecord>>;

    fn laps(&self, filter: &LapFilter) -> Result<Vec<Lap>>;
}
