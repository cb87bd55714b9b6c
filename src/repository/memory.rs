//! In-memory repository

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::trace;

use super::{LapFilter, Repository, SessionFilter};
use crate::model::{
    Car, CarClass, CarClassId, CarId, Driver, DriverId, Fetched, Game, GameId, Landmark,
    LandmarkId, LandmarkKind, Lap, LapId, Segment, SegmentId, SessionId, SessionKey,
    SessionRecord, SessionType, SessionTypeId, Track, TrackId,
};
use crate::{PitcrewError, Result};

/// Write counters, for observing batching behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepositoryStats {
    pub sessions_created: u64,
    pub laps_created: u64,
    pub segments_created: u64,
    pub session_saves: u64,
    pub lap_saves: u64,
    pub segment_saves: u64,
    pub track_saves: u64,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: u64,
    games: HashMap<String, Game>,
    car_classes: HashMap<(GameId, String), CarClass>,
    cars: HashMap<(GameId, String, Option<CarClassId>), Car>,
    tracks: HashMap<TrackId, Track>,
    track_names: HashMap<(GameId, String), TrackId>,
    drivers: HashMap<String, Driver>,
    session_types: HashMap<String, SessionType>,
    sessions: HashMap<SessionId, SessionRecord>,
    session_keys: HashMap<SessionKey, SessionId>,
    laps: HashMap<LapId, Lap>,
    lap_keys: HashMap<(SessionId, i64), LapId>,
    landmarks: Vec<Landmark>,
    segments: HashMap<SegmentId, Segment>,
    segment_keys: HashMap<(LapId, LandmarkId), SegmentId>,
    stats: RepositoryStats,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Thread-safe repository keeping every record in memory.
///
/// One lock guards all tables, so get-or-create is atomic per call and two
/// workers racing on the same natural key always receive the same record.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    unavailable: Mutex<Option<String>>,
    fail_once: Mutex<Option<(String, String)>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `reason`, or recover with `None`.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *self.unavailable.lock() = reason.map(str::to_string);
    }

    /// Make the next call of `operation` (e.g. `"get or create lap"`) fail once.
    pub fn fail_once(&self, operation: &str, reason: &str) {
        *self.fail_once.lock() = Some((operation.to_string(), reason.to_string()));
    }

    fn check(&self, operation: &str) -> Result<()> {
        {
            let mut armed = self.fail_once.lock();
            if armed.as_ref().is_some_and(|(op, _)| op == operation) {
                if let Some((_, reason)) = armed.take() {
                    return Err(PitcrewError::repository(operation, reason));
                }
            }
        }
        match self.unavailable.lock().as_deref() {
            Some(reason) => Err(PitcrewError::repository(operation, reason)),
            None => Ok(()),
        }
    }

    /// Add a landmark to a known track.
    pub fn insert_landmark(
        &self,
        track: TrackId,
        name: impl Into<String>,
        kind: LandmarkKind,
        start: f64,
        end: f64,
    ) -> Result<Landmark> {
        self.check("insert landmark")?;
        let mut tables = self.tables.lock();
        if !tables.tracks.contains_key(&track) {
            return Err(PitcrewError::not_found("Track", track));
        }
        let id = LandmarkId(tables.next_id());
        let landmark = Landmark { id, track, name: name.into(), kind, start, end };
        tables.landmarks.push(landmark.clone());
        Ok(landmark)
    }

    pub fn stats(&self) -> RepositoryStats {
        self.tables.lock().stats
    }

    pub fn track(&self, id: TrackId) -> Option<Track> {
        self.tables.lock().tracks.get(&id).cloned()
    }

    pub fn lap(&self, id: LapId) -> Option<Lap> {
        self.tables.lock().laps.get(&id).cloned()
    }

    pub fn segment(&self, id: SegmentId) -> Option<Segment> {
        self.tables.lock().segments.get(&id).cloned()
    }

    /// Segments of a lap, ordered by landmark start distance.
    pub fn segments_for_lap(&self, lap: LapId) -> Vec<Segment> {
        let tables = self.tables.lock();
        let start_of = |landmark: LandmarkId| {
            tables.landmarks.iter().find(|l| l.id == landmark).map_or(f64::MAX, |l| l.start)
        };
        let mut segments: Vec<Segment> =
            tables.segments.values().filter(|s| s.lap == lap).cloned().collect();
        segments.sort_by(|a, b| start_of(a.landmark).total_cmp(&start_of(b.landmark)));
        segments
    }

    pub fn segment_count(&self) -> usize {
        self.tables.lock().segments.len()
    }

    pub fn session_count(&self) -> usize {
        self.tables.lock().sessions.len()
    }
}

fn get_or_insert<K, V>(
    map: &mut HashMap<K, V>,
    key: K,
    create: impl FnOnce() -> V,
) -> Fetched<V>
where
    K: std::hash::Hash + Eq,
    V: Clone,
{
    match map.get(&key) {
        Some(existing) => Fetched::existing(existing.clone()),
        None => {
            let record = create();
            map.insert(key, record.clone());
            Fetched::created(record)
        }
    }
}

impl Repository for InMemoryRepository {
    fn get_or_create_game(&self, name: &str) -> Result<Fetched<Game>> {
        self.check("get or create game")?;
        let mut tables = self.tables.lock();
        let id = GameId(tables.next_id());
        Ok(get_or_insert(&mut tables.games, name.to_string(), || Game { id, name: name.to_string() }))
    }

    fn get_or_create_car_class(&self, game: GameId, name: &str) -> Result<Fetched<CarClass>> {
        self.check("get or create car class")?;
        let mut tables = self.tables.lock();
        let id = CarClassId(tables.next_id());
        Ok(get_or_insert(&mut tables.car_classes, (game, name.to_string()), || CarClass {
            id,
            game,
            name: name.to_string(),
        }))
    }

    fn get_or_create_car(
        &self,
        game: GameId,
        name: &str,
        car_class: Option<CarClassId>,
    ) -> Result<Fetched<Car>> {
        self.check("get or create car")?;
        let mut tables = self.tables.lock();
        let id = CarId(tables.next_id());
        Ok(get_or_insert(&mut tables.cars, (game, name.to_string(), car_class), || Car {
            id,
            game,
            name: name.to_string(),
            car_class,
        }))
    }

    fn get_or_create_track(&self, game: GameId, name: &str) -> Result<Fetched<Track>> {
        self.check("get or create track")?;
        let mut tables = self.tables.lock();
        if let Some(track) = tables
            .track_names
            .get(&(game, name.to_string()))
            .and_then(|id| tables.tracks.get(id))
        {
            return Ok(Fetched::existing(track.clone()));
        }
        let id = TrackId(tables.next_id());
        let track = Track::new(id, game, name, 0);
        tables.track_names.insert((game, name.to_string()), id);
        tables.tracks.insert(id, track.clone());
        Ok(Fetched::created(track))
    }

    fn get_or_create_driver(&self, name: &str) -> Result<Fetched<Driver>> {
        self.check("get or create driver")?;
        let mut tables = self.tables.lock();
        let id = DriverId(tables.next_id());
        Ok(get_or_insert(&mut tables.drivers, name.to_string(), || Driver {
            id,
            name: name.to_string(),
        }))
    }

    fn get_or_create_session_type(&self, name: &str) -> Result<Fetched<SessionType>> {
        self.check("get or create session type")?;
        let mut tables = self.tables.lock();
        let id = SessionTypeId(tables.next_id());
        Ok(get_or_insert(&mut tables.session_types, name.to_string(), || SessionType {
            id,
            name: name.to_string(),
        }))
    }

    fn get_or_create_session(
        &self,
        key: &SessionKey,
        track: Option<TrackId>,
        car: Option<CarId>,
        now: DateTime<Utc>,
    ) -> Result<Fetched<SessionRecord>> {
        self.check("get or create session")?;
        let mut tables = self.tables.lock();
        if let Some(session) =
            tables.session_keys.get(key).and_then(|id| tables.sessions.get(id))
        {
            return Ok(Fetched::existing(session.clone()));
        }
        let id = SessionId(tables.next_id());
        let session = SessionRecord::new(id, key.clone(), track, car, now);
        tables.session_keys.insert(key.clone(), id);
        tables.sessions.insert(id, session.clone());
        tables.stats.sessions_created += 1;
        Ok(Fetched::created(session))
    }

    fn get_or_create_lap(
        &self,
        session: SessionId,
        number: i64,
        track: Option<TrackId>,
        car: Option<CarId>,
        now: DateTime<Utc>,
    ) -> Result<Fetched<Lap>> {
        self.check("get or create lap")?;
        let mut tables = self.tables.lock();
        if !tables.sessions.contains_key(&session) {
            return Err(PitcrewError::not_found("Session", session));
        }
        if let Some(lap) = tables.lap_keys.get(&(session, number)).and_then(|id| tables.laps.get(id))
        {
            return Ok(Fetched::existing(lap.clone()));
        }
        let id = LapId(tables.next_id());
        let lap = Lap::new(id, session, number, track, car, now);
        tables.lap_keys.insert((session, number), id);
        tables.laps.insert(id, lap.clone());
        tables.stats.laps_created += 1;
        Ok(Fetched::created(lap))
    }

    fn get_or_create_segment(&self, lap: LapId, landmark: LandmarkId) -> Result<Fetched<Segment>> {
        self.check("get or create segment")?;
        let mut tables = self.tables.lock();
        if !tables.laps.contains_key(&lap) {
            return Err(PitcrewError::not_found("Lap", lap));
        }
        if let Some(segment) =
            tables.segment_keys.get(&(lap, landmark)).and_then(|id| tables.segments.get(id))
        {
            return Ok(Fetched::existing(segment.clone()));
        }
        let id = SegmentId(tables.next_id());
        let segment = Segment::new(id, lap, landmark);
        tables.segment_keys.insert((lap, landmark), id);
        tables.segments.insert(id, segment.clone());
        tables.stats.segments_created += 1;
        Ok(Fetched::created(segment))
    }

    fn landmarks(&self, track: TrackId) -> Result<Vec<Landmark>> {
        self.check("list landmarks")?;
        let tables = self.tables.lock();
        Ok(tables.landmarks.iter().filter(|l| l.track == track).cloned().collect())
    }

    fn save_track(&self, track: &Track) -> Result<()> {
        self.check("save track")?;
        let mut tables = self.tables.lock();
        let slot = tables.tracks.get_mut(&track.id).ok_or_else(|| PitcrewError::not_found("Track", track.id))?;
        *slot = track.clone();
        slot.mark_clean();
        tables.stats.track_saves += 1;
        trace!(track = %track.name, length = track.length, "Saved track");
        Ok(())
    }

    fn save_session(&self, session: &SessionRecord) -> Result<()> {
        self.check("save session")?;
        let mut tables = self.tables.lock();
        let slot = tables
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| PitcrewError::not_found("Session", session.id))?;
        *slot = session.clone();
        slot.mark_clean();
        tables.stats.session_saves += 1;
        Ok(())
    }

    fn save_lap(&self, lap: &Lap) -> Result<()> {
        self.check("save lap")?;
        let mut tables = self.tables.lock();
        let slot = tables.laps.get_mut(&lap.id).ok_or_else(|| PitcrewError::not_found("Lap", lap.id))?;
        *slot = lap.clone();
        slot.mark_clean();
        tables.stats.lap_saves += 1;
        Ok(())
    }

    fn save_segment(&self, segment: &Segment) -> Result<()> {
        self.check("save segment")?;
        let mut tables = self.tables.lock();
        let slot = tables
            .segments
            .get_mut(&segment.id)
            .ok_or_else(|| PitcrewError::not_found("Segment", segment.id))?;
        *slot = segment.clone();
        slot.mark_clean();
        tables.stats.segment_saves += 1;
        Ok(())
    }

    fn sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionRecord>> {
        self.check("query sessions")?;
        let tables = self.tables.lock();
        let mut sessions: Vec<SessionRecord> =
            tables.sessions.values().filter(|s| filter.matches(s)).cloned().collect();
        sessions.sort_by_key(|s| s.start);
        Ok(sessions)
    }

    fn laps(&self, filter: &LapFilter) -> Result<Vec<Lap>> {
        self.check("query laps")?;
        let tables = self.tables.lock();
        let mut laps: Vec<Lap> = tables.laps.values().filter(|l| filter.matches(l)).cloned().collect();
        laps.sort_by_key(|l| (l.session, l.number));
        Ok(laps)
    }
}
