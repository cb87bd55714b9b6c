//! Per-session state machine.
//!
//! A [`Session`] receives every tick of one topic. Each tick goes through two
//! stages:
//!
//! 1. **Lap analysis**: the session's [`LapStrategy`] decides whether a lap
//!    starts, grows or ends. The strategy is picked once from the game name.
//! 2. **Segment analysis**: while a lap is open on a track with landmarks,
//!    the [`SegmentTracker`] follows the car through the landmarks and feeds
//!    the segment analyzer.
//!
//! Laps and segments are created through the repository as soon as they are
//! detected; all other changes stay in memory until
//! [`Session::save_analysis`] is called by the registry's flush.

mod laps;
mod rally;
mod segments;
mod standard;

pub use laps::LapBook;
pub use rally::RallyLaps;
pub use segments::SegmentTracker;
pub use standard::StandardLaps;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::Result;
use crate::config::{AnalysisConfig, PitcrewConfig};
use crate::landmarks::{LandmarkCatalog, LandmarkIndex};
use crate::model::{Lap, Segment, SessionKey, SessionRecord, Track};
use crate::repository::Repository;
use crate::types::{Presence, Telemetry, Topic, channels};
use laps::LapFactory;

/// Persisted name of the lap strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyTag {
    Rbr,
    Standard,
}

impl fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyTag::Rbr => f.write_str("rbr"),
            StrategyTag::Standard => f.write_str("standard"),
        }
    }
}

/// Lap-boundary detection, fixed for the lifetime of a session.
#[derive(Debug, Clone)]
pub enum LapStrategy {
    Standard(StandardLaps),
    Rally(RallyLaps),
}

impl LapStrategy {
    pub fn for_game(game: &str, config: &AnalysisConfig) -> Self {
        if config.is_rally(game) {
            LapStrategy::Rally(RallyLaps::new(config.rally_completion_ticks))
        } else {
            LapStrategy::Standard(StandardLaps::new(config.cross_threshold(game)))
        }
    }

    pub fn tag(&self) -> StrategyTag {
        match self {
            LapStrategy::Standard(_) => StrategyTag::Standard,
            LapStrategy::Rally(_) => StrategyTag::Rbr,
        }
    }
}

/// What lap analysis made of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Outcome {
    /// A required channel was missing or null
    Invalid(Presence<()>),
    Unchanged,
    LapOpened,
}

/// Live analysis state of one session.
#[derive(Debug)]
pub struct Session {
    record: SessionRecord,
    topic: Topic,
    track: Option<Track>,
    strategy: LapStrategy,
    laps: LapBook,
    segments: SegmentTracker,
    landmarks: Option<Arc<LandmarkIndex>>,
    telemetry_valid: bool,
    invalid_transitions: u64,
}

impl Session {
    pub fn new(
        record: SessionRecord,
        topic: Topic,
        track: Option<Track>,
        landmarks: Option<Arc<LandmarkIndex>>,
        config: &PitcrewConfig,
    ) -> Self {
        let strategy = LapStrategy::for_game(&topic.game, &config.analysis);
        Self {
            record,
            topic,
            track,
            strategy,
            laps: LapBook::default(),
            segments: SegmentTracker::new(config.analyzer),
            landmarks,
            telemetry_valid: true,
            invalid_transitions: 0,
        }
    }

    /// Resolve every record a session refers to and build its analysis state.
    ///
    /// `telemetry` is the first tick of the topic; its `CarClass` channel, if
    /// set, classifies the car.
    pub fn create(
        topic: Topic,
        telemetry: &Telemetry,
        now: DateTime<Utc>,
        repository: &dyn Repository,
        catalog: &LandmarkCatalog,
        config: &PitcrewConfig,
    ) -> Result<Self> {
        let game = repository.get_or_create_game(&topic.game)?;
        if game.created {
            info!(game = %topic.game, "Created new game");
        }
        let game = game.record;

        let car_class = match telemetry.text(channels::CAR_CLASS).filter(|c| !c.is_empty()) {
            Some(name) => {
                let fetched = repository.get_or_create_car_class(game.id, name)?;
                if fetched.created {
                    debug!(car_class = name, "Created new car class");
                }
                Some(fetched.record.id)
            }
            None => None,
        };

        let car = if topic.car.is_empty() {
            None
        } else {
            let fetched = repository.get_or_create_car(game.id, &topic.car, car_class)?;
            if fetched.created {
                debug!(car = %topic.car, "Created new car");
            }
            Some(fetched.record)
        };

        let track = if topic.track.is_empty() {
            None
        } else {
            let fetched = repository.get_or_create_track(game.id, &topic.track)?;
            let mut track = fetched.record;
            if fetched.created {
                track.raise_length(config.registry.new_track_length);
                repository.save_track(&track)?;
                track.mark_clean();
                debug!(track = %topic.track, length = track.length, "Created new track");
            }
            Some(track)
        };

        let driver = repository.get_or_create_driver(&topic.driver)?.record;
        let session_type = repository.get_or_create_session_type(&topic.session_type)?.record;

        let key = SessionKey {
            driver: driver.id,
            session_id: topic.session_id.clone(),
            session_type: session_type.id,
            game: game.id,
        };
        let fetched = repository.get_or_create_session(
            &key,
            track.as_ref().map(|t| t.id),
            car.as_ref().map(|c| c.id),
            now,
        )?;
        if fetched.created {
            debug!(topic = %topic, session = %fetched.record.id, "Created new session");
        } else {
            debug!(topic = %topic, session = %fetched.record.id, "Found existing session");
        }

        let landmarks = match &track {
            Some(track) => Some(catalog.index(track.id, repository)?),
            None => None,
        };

        Ok(Self::new(fetched.record, topic, track, landmarks, config))
    }

    /// Process one tick: record activity, analyse laps, then segments.
    ///
    /// A tick whose lap analysis fails is not fed to the segments: the lap it
    /// belongs to is unknown (a crossing whose new lap could not be created
    /// would otherwise land in the old lap).
    pub fn signal(
        &mut self,
        telemetry: &Telemetry,
        now: DateTime<Utc>,
        repository: &dyn Repository,
    ) -> Result<()> {
        self.record.touch(now);
        self.analyze(telemetry, now, repository)?;
        self.analyze_segment(telemetry, now, repository)
    }

    fn analyze(
        &mut self,
        telemetry: &Telemetry,
        now: DateTime<Utc>,
        repository: &dyn Repository,
    ) -> Result<()> {
        let factory = LapFactory {
            repository,
            session: self.record.id,
            track: self.record.track,
            car: self.record.car,
        };
        let outcome = match &mut self.strategy {
            LapStrategy::Standard(standard) => {
                standard.analyze(telemetry, now, &mut self.laps, &factory)
            }
            LapStrategy::Rally(rally) => rally.analyze(telemetry, now, &mut self.laps, &factory),
        }?;

        match outcome {
            Outcome::Invalid(reason) => {
                if self.telemetry_valid {
                    self.telemetry_valid = false;
                    self.invalid_transitions += 1;
                    debug!(
                        topic = %self.topic,
                        channel = reason.channel().unwrap_or_default(),
                        null = matches!(reason, Presence::Null(_)),
                        "Telemetry invalid for lap analysis"
                    );
                }
                return Ok(());
            }
            Outcome::Unchanged | Outcome::LapOpened => {
                if !self.telemetry_valid {
                    self.telemetry_valid = true;
                    debug!(topic = %self.topic, "Telemetry valid again");
                }
            }
        }

        if outcome == Outcome::LapOpened {
            let closed = self.segments.close(repository);
            let saved = self.laps.save_previous(repository);
            closed.and(saved)?;
        }
        Ok(())
    }

    fn analyze_segment(
        &mut self,
        telemetry: &Telemetry,
        now: DateTime<Utc>,
        repository: &dyn Repository,
    ) -> Result<()> {
        let (Some(lap), Some(index)) = (self.laps.current(), self.landmarks.as_deref()) else {
            return Ok(());
        };
        if self.track.is_none() {
            return Ok(());
        }
        let lap = lap.id;
        self.segments.update(telemetry, now, lap, index, repository)
    }

    /// Save every dirty record of the session.
    ///
    /// All saves are attempted even if one fails; the first error is returned
    /// and the failed records stay dirty for the next flush.
    pub fn save_analysis(&mut self, repository: &dyn Repository) -> Result<()> {
        let session = if self.record.is_dirty() {
            repository.save_session(&self.record).map(|()| self.record.mark_clean())
        } else {
            Ok(())
        };
        let laps = self.laps.save(repository);
        let segments = self.segments.snapshot(repository);
        let track = self.raise_track_length(repository);

        [session, laps, segments, track].into_iter().collect()
    }

    /// Grow the stored track length to the longest lap driven on it.
    fn raise_track_length(&mut self, repository: &dyn Repository) -> Result<()> {
        let Some(track) = &self.track else {
            return Ok(());
        };
        let longest = self.laps.longest();
        if !longest.is_finite() || longest <= f64::from(track.length) {
            return Ok(());
        }

        // other sessions on the same track may have raised it already
        let mut current = repository.get_or_create_track(track.game, &track.name)?.record;
        let length = longest.round() as u32;
        if current.raise_length(length) {
            repository.save_track(&current)?;
            current.mark_clean();
            info!(track = %current.name, length, "Raised track length");
        }
        self.track = Some(current);
        Ok(())
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn track(&self) -> Option<&Track> {
        self.track.as_ref()
    }

    pub fn strategy(&self) -> StrategyTag {
        self.strategy.tag()
    }

    pub fn current_lap(&self) -> Option<&Lap> {
        self.laps.current()
    }

    pub fn previous_lap(&self) -> Option<&Lap> {
        self.laps.previous()
    }

    pub fn active_segment(&self) -> Option<&Segment> {
        self.segments.active()
    }

    pub fn telemetry_valid(&self) -> bool {
        self.telemetry_valid
    }

    /// Number of times telemetry turned unusable for lap analysis; each one is
    /// logged once.
    pub fn invalid_transitions(&self) -> u64 {
        self.invalid_transitions
    }

    /// Time of the last tick, used for idle eviction.
    pub fn last_seen(&self) -> DateTime<Utc> {
        self.record.end
    }

    /// Whether anything would be written by [`Session::save_analysis`].
    pub fn has_unsaved(&self) -> bool {
        self.record.is_dirty() || self.laps.has_unsaved() || self.segments.has_unsaved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use crate::test_utils::{
        IRACING_TOPIC, RALLY_TOPIC, lap_telemetry, rally_telemetry, seed_track, timestamp,
    };
    use proptest::prelude::*;

    fn open(repo: &InMemoryRepository, topic: &str) -> Session {
        let catalog = LandmarkCatalog::new();
        let topic: Topic = topic.parse().unwrap();
        Session::create(topic, &Telemetry::new(), timestamp(0), repo, &catalog, &PitcrewConfig::default())
            .unwrap()
    }

    fn feed(session: &mut Session, repo: &InMemoryRepository, ticks: &[Telemetry]) {
        for (i, telemetry) in ticks.iter().enumerate() {
            session.signal(telemetry, timestamp(i as i64 * 16), repo).unwrap();
        }
    }

    #[test]
    fn strategy_follows_game() {
        let repo = InMemoryRepository::new();
        assert_eq!(open(&repo, IRACING_TOPIC).strategy(), StrategyTag::Standard);
        assert_eq!(open(&repo, RALLY_TOPIC).strategy(), StrategyTag::Rbr);
        assert_eq!(serde_json::to_string(&StrategyTag::Rbr).unwrap(), "\"rbr\"");
    }

    #[test]
    fn create_gives_new_tracks_a_default_length() {
        let repo = InMemoryRepository::new();
        let session = open(&repo, IRACING_TOPIC);
        assert_eq!(session.track().map(|t| t.length), Some(10));
        assert!(session.record().car.is_some());
    }

    #[test]
    fn create_classifies_car_from_first_tick() {
        let repo = InMemoryRepository::new();
        let catalog = LandmarkCatalog::new();
        let topic: Topic = IRACING_TOPIC.parse().unwrap();
        let telemetry = Telemetry::new().with(channels::CAR_CLASS, "GT3");
        Session::create(topic, &telemetry, timestamp(0), &repo, &catalog, &PitcrewConfig::default())
            .unwrap();

        let game = repo.get_or_create_game("iRacing").unwrap().record;
        assert!(!repo.get_or_create_car_class(game.id, "GT3").unwrap().created);
    }

    #[test]
    fn crossing_the_line_opens_the_next_lap() {
        let repo = InMemoryRepository::new();
        let mut session = open(&repo, IRACING_TOPIC);

        feed(
            &mut session,
            &repo,
            &[
                lap_telemetry(0.0, 1, 0.0),
                lap_telemetry(50.0, 1, 1.0),
                lap_telemetry(95.0, 1, 2.0),
                lap_telemetry(98.0, 1, 3.0),
            ],
        );
        assert_eq!(session.current_lap().map(|l| l.number), Some(1));

        session.signal(&lap_telemetry(5.0, 2, 0.1), timestamp(1000), &repo).unwrap();
        let current = session.current_lap().unwrap();
        assert_eq!(current.number, 2);
        assert_eq!(current.length, 5.0);
        let previous = session.previous_lap().unwrap();
        assert_eq!(previous.number, 1);
        assert_eq!(previous.length, 98.0);
        assert_eq!(previous.end, timestamp(1000));

        session.signal(&lap_telemetry(10.0, 2, 0.2), timestamp(1016), &repo).unwrap();
        assert_eq!(session.current_lap().map(|l| l.number), Some(2));
    }

    #[test]
    fn crossing_without_lap_increase_keeps_the_lap() {
        let repo = InMemoryRepository::new();
        let mut session = open(&repo, IRACING_TOPIC);
        feed(
            &mut session,
            &repo,
            &[lap_telemetry(0.0, 1, 0.0), lap_telemetry(60.0, 1, 1.0), lap_telemetry(20.0, 1, 2.0)],
        );
        assert_eq!(session.current_lap().map(|l| l.number), Some(1));
        assert!(session.previous_lap().is_none());
    }

    #[test]
    fn far_from_the_line_no_lap_opens() {
        let repo = InMemoryRepository::new();
        let mut session = open(&repo, IRACING_TOPIC);
        feed(&mut session, &repo, &[lap_telemetry(1500.0, 3, 40.0), lap_telemetry(1600.0, 3, 41.0)]);
        assert!(session.current_lap().is_none());
    }

    #[test]
    fn lap_time_previous_closes_the_previous_lap() {
        let repo = InMemoryRepository::new();
        let mut session = open(&repo, IRACING_TOPIC);
        feed(
            &mut session,
            &repo,
            &[lap_telemetry(0.0, 1, 0.0), lap_telemetry(3900.0, 1, 88.0), lap_telemetry(2.0, 2, 0.1)],
        );
        assert!(!session.previous_lap().unwrap().completed);

        let closing = lap_telemetry(20.0, 2, 0.5)
            .with(channels::LAP_TIME_PREVIOUS, 88.123)
            .with(channels::PREVIOUS_LAP_WAS_VALID, false);
        session.signal(&closing, timestamp(5000), &repo).unwrap();

        let previous = session.previous_lap().unwrap();
        assert!(previous.completed);
        assert_eq!(previous.time, 88.123);
        assert!(!previous.valid);
        assert!(!session.current_lap().unwrap().completed);
    }

    #[test]
    fn invalid_telemetry_keeps_state() {
        let repo = InMemoryRepository::new();
        let mut session = open(&repo, IRACING_TOPIC);
        feed(&mut session, &repo, &[lap_telemetry(0.0, 1, 0.0), lap_telemetry(300.0, 1, 5.0)]);

        let mut broken = lap_telemetry(9000.0, 1, 6.0);
        broken.insert(channels::CURRENT_LAP_IS_VALID, Option::<bool>::None);
        session.signal(&broken, timestamp(2000), &repo).unwrap();

        assert!(!session.telemetry_valid());
        assert_eq!(session.current_lap().unwrap().length, 300.0);
        assert_eq!(session.last_seen(), timestamp(2000));

        session.signal(&lap_telemetry(310.0, 1, 6.1), timestamp(2016), &repo).unwrap();
        assert!(session.telemetry_valid());
        assert_eq!(session.current_lap().unwrap().length, 310.0);
    }

    #[test]
    fn invalid_telemetry_is_reported_once_per_transition() {
        let repo = InMemoryRepository::new();
        let mut session = open(&repo, IRACING_TOPIC);
        let broken = Telemetry::new().with(channels::DISTANCE_ROUND_TRACK, 10.0);

        session.signal(&lap_telemetry(0.0, 1, 0.0), timestamp(0), &repo).unwrap();
        for i in 1..=5 {
            session.signal(&broken, timestamp(i * 16), &repo).unwrap();
        }
        assert_eq!(session.invalid_transitions(), 1);

        session.signal(&lap_telemetry(20.0, 1, 0.2), timestamp(100), &repo).unwrap();
        session.signal(&broken, timestamp(116), &repo).unwrap();
        session.signal(&broken, timestamp(132), &repo).unwrap();
        assert_eq!(session.invalid_transitions(), 2);
    }

    #[test]
    fn cross_threshold_is_per_game() {
        let repo = InMemoryRepository::new();
        let mut config = PitcrewConfig::default();
        config.analysis.cross_thresholds.insert("iRacing".to_string(), 10.0);
        let topic: Topic = IRACING_TOPIC.parse().unwrap();
        let catalog = LandmarkCatalog::new();
        let mut session =
            Session::create(topic, &Telemetry::new(), timestamp(0), &repo, &catalog, &config).unwrap();
        assert!(matches!(
            &session.strategy,
            LapStrategy::Standard(standard) if standard.cross_threshold() == 10.0
        ));

        feed(&mut session, &repo, &[lap_telemetry(0.0, 1, 0.0), lap_telemetry(3990.0, 1, 80.0)]);
        session.signal(&lap_telemetry(50.0, 2, 0.5), timestamp(9000), &repo).unwrap();
        assert_eq!(session.current_lap().map(|l| l.number), Some(1));

        session.signal(&lap_telemetry(5.0, 2, 0.6), timestamp(9016), &repo).unwrap();
        assert_eq!(session.current_lap().map(|l| l.number), Some(2));

        // the default threshold of 100 takes the first tick past the line
        let mut wide = open(&repo, "b4mad/bob/2002/iRacing/monza/gt3/Practice");
        feed(&mut wide, &repo, &[lap_telemetry(0.0, 1, 0.0), lap_telemetry(3990.0, 1, 80.0)]);
        wide.signal(&lap_telemetry(50.0, 2, 0.5), timestamp(9000), &repo).unwrap();
        assert_eq!(wide.current_lap().map(|l| l.number), Some(2));
    }

    #[test]
    fn rally_stage_completes_when_clock_freezes() {
        let repo = InMemoryRepository::new();
        let mut session = open(&repo, RALLY_TOPIC);

        session.signal(&rally_telemetry(0.0, 0.0), timestamp(0), &repo).unwrap();
        let lap = session.current_lap().unwrap();
        assert!(lap.valid);
        assert!(!lap.completed);

        // ten frozen ticks are not enough
        for i in 1..=10 {
            session.signal(&rally_telemetry(i as f64, 0.0), timestamp(i * 16), &repo).unwrap();
        }
        assert!(!session.current_lap().unwrap().completed);

        session.signal(&rally_telemetry(11.0, 0.0), timestamp(176), &repo).unwrap();
        let lap = session.current_lap().unwrap();
        assert!(lap.completed);
        assert_eq!(lap.end, timestamp(176));
        assert_eq!(lap.length, 11.0);
    }

    #[test]
    fn rally_stage_runs_while_clock_advances() {
        let repo = InMemoryRepository::new();
        let mut session = open(&repo, RALLY_TOPIC);
        for i in 0..100 {
            let t = i as f64 * 0.016;
            session.signal(&rally_telemetry(i as f64 * 2.0, t), timestamp(i * 16), &repo).unwrap();
        }
        let lap = session.current_lap().unwrap();
        assert!(!lap.completed);
        assert_eq!(lap.time, 99.0 * 0.016);
        assert_eq!(lap.length, 198.0);
        assert!(session.previous_lap().is_none());
    }

    #[test]
    fn rally_needs_lap_time() {
        let repo = InMemoryRepository::new();
        let mut session = open(&repo, RALLY_TOPIC);
        let telemetry = Telemetry::new()
            .with(channels::DISTANCE_ROUND_TRACK, 10.0)
            .with(channels::CURRENT_LAP, 1);
        session.signal(&telemetry, timestamp(0), &repo).unwrap();
        assert!(!session.telemetry_valid());
        assert!(session.current_lap().is_none());
    }

    #[test]
    fn adjacent_landmarks_close_the_first_segment_once() {
        let repo = InMemoryRepository::new();
        seed_track(&repo, "iRacing", "spa", &[0.0, 100.0, 200.0]);
        let mut session = open(&repo, IRACING_TOPIC);

        let ticks: Vec<Telemetry> =
            (1..=19).map(|i| lap_telemetry(i as f64 * 10.0, 1, i as f64 * 0.1)).collect();
        feed(&mut session, &repo, &ticks);

        let stats = repo.stats();
        assert_eq!(stats.segments_created, 2);
        assert_eq!(stats.segment_saves, 1);
        assert_eq!(session.active_segment().map(|s| s.lap), session.current_lap().map(|l| l.id));
    }

    #[test]
    fn new_lap_closes_segment_against_its_own_lap() {
        let repo = InMemoryRepository::new();
        seed_track(&repo, "iRacing", "spa", &[0.0, 2000.0, 4000.0]);
        let mut session = open(&repo, IRACING_TOPIC);

        feed(
            &mut session,
            &repo,
            &[lap_telemetry(0.0, 1, 0.0), lap_telemetry(3000.0, 1, 60.0), lap_telemetry(3990.0, 1, 80.0)],
        );
        let first_lap = session.current_lap().unwrap().id;

        session.signal(&lap_telemetry(4.0, 2, 0.1), timestamp(9000), &repo).unwrap();
        let second_lap = session.current_lap().unwrap().id;
        assert_ne!(first_lap, second_lap);
        assert_eq!(session.active_segment().map(|s| s.lap), Some(second_lap));

        let saved = repo.segments_for_lap(first_lap);
        assert_eq!(saved.len(), 2);
        assert!(saved.iter().all(|s| s.coasting_time.is_some()));
    }

    #[test]
    fn failed_lap_creation_leaves_segments_on_the_old_lap() {
        let repo = InMemoryRepository::new();
        seed_track(&repo, "iRacing", "spa", &[0.0, 2000.0, 4000.0]);
        let mut session = open(&repo, IRACING_TOPIC);

        feed(
            &mut session,
            &repo,
            &[
                lap_telemetry(10.0, 1, 0.0),
                lap_telemetry(1000.0, 1, 20.0),
                lap_telemetry(3000.0, 1, 60.0),
                lap_telemetry(3990.0, 1, 80.0),
            ],
        );
        let first_lap = session.current_lap().unwrap().id;
        let last_segment = session.active_segment().map(|s| s.id);

        repo.fail_once("get or create lap", "deadlock");
        let err = session.signal(&lap_telemetry(4.0, 2, 0.1), timestamp(9000), &repo).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(session.current_lap().map(|l| l.id), Some(first_lap));
        assert_eq!(session.active_segment().map(|s| s.id), last_segment);

        // the next tick is still a crossing and opens the lap
        session.signal(&lap_telemetry(8.0, 2, 0.2), timestamp(9016), &repo).unwrap();
        let second_lap = session.current_lap().unwrap();
        assert_eq!(second_lap.number, 2);
        assert_eq!(session.active_segment().map(|s| s.lap), Some(second_lap.id));

        let saved = repo.segments_for_lap(first_lap);
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].apex, Some(1000));
        assert_eq!(saved[1].apex, Some(300_000));
    }

    #[test]
    fn ticks_outside_landmarks_keep_the_active_segment() {
        let repo = InMemoryRepository::new();
        let game = repo.get_or_create_game("iRacing").unwrap().record;
        let track = repo.get_or_create_track(game.id, "spa").unwrap().record;
        repo.insert_landmark(track.id, "T1", crate::model::LandmarkKind::Segment, 0.0, 50.0)
            .unwrap();
        let mut session = open(&repo, IRACING_TOPIC);

        feed(
            &mut session,
            &repo,
            &[lap_telemetry(10.0, 1, 0.0), lap_telemetry(40.0, 1, 1.0), lap_telemetry(70.0, 1, 2.0)],
        );
        assert!(session.active_segment().is_some());
        assert_eq!(repo.stats().segment_saves, 0);
    }

    #[test]
    fn save_analysis_writes_dirty_records_and_raises_track_length() {
        let repo = InMemoryRepository::new();
        let mut session = open(&repo, IRACING_TOPIC);
        feed(
            &mut session,
            &repo,
            &[lap_telemetry(0.0, 1, 0.0), lap_telemetry(2500.0, 1, 50.0), lap_telemetry(4011.6, 1, 90.0)],
        );
        assert!(session.has_unsaved());

        session.save_analysis(&repo).unwrap();
        assert!(!session.has_unsaved());

        let track = session.track().unwrap();
        assert_eq!(track.length, 4012);
        assert_eq!(repo.track(track.id).unwrap().length, 4012);
        let stats = repo.stats();
        assert_eq!(stats.session_saves, 1);
        assert_eq!(stats.lap_saves, 1);

        // nothing changed since: nothing is written
        session.save_analysis(&repo).unwrap();
        assert_eq!(repo.stats().lap_saves, 1);
    }

    #[test]
    fn save_analysis_reports_repository_failures() {
        let repo = InMemoryRepository::new();
        let mut session = open(&repo, IRACING_TOPIC);
        feed(&mut session, &repo, &[lap_telemetry(0.0, 1, 0.0), lap_telemetry(80.0, 1, 2.0)]);

        repo.set_unavailable(Some("disk full"));
        let err = session.save_analysis(&repo).unwrap_err();
        assert!(err.is_retryable());
        assert!(session.has_unsaved());

        repo.set_unavailable(None);
        session.save_analysis(&repo).unwrap();
        assert!(!session.has_unsaved());
    }

    proptest! {
        #[test]
        fn prop_lap_length_tracks_maximum_distance(
            distances in prop::collection::vec(0.0f64..5000.0, 1..200)
        ) {
            let repo = InMemoryRepository::new();
            let mut session = open(&repo, IRACING_TOPIC);
            session.signal(&lap_telemetry(0.0, 1, 0.0), timestamp(0), &repo).unwrap();

            let mut last_length = 0.0;
            for (i, distance) in distances.iter().enumerate() {
                let telemetry = lap_telemetry(*distance, 1, i as f64);
                session.signal(&telemetry, timestamp(i as i64 * 16 + 16), &repo).unwrap();
                let length = session.current_lap().unwrap().length;
                prop_assert!(length >= last_length);
                last_length = length;
            }
            let max = distances.iter().copied().fold(0.0, f64::max);
            prop_assert_eq!(last_length, max);
        }
    }
}
