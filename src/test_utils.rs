//! Test utilities for building synthetic telemetry
//!
//! Helpers shared by unit tests, integration tests and benches: fixed
//! timestamps, tick builders for both lap strategies, and repository seeding.

#![cfg(any(test, feature = "benchmark"))]

use chrono::{DateTime, TimeDelta, Utc};

use crate::model::{LandmarkKind, SessionKey, SessionRecord, Track};
use crate::repository::{InMemoryRepository, Repository};
use crate::types::{Telemetry, Tick, channels};

/// Circuit topic used across tests.
pub const IRACING_TOPIC: &str = "b4mad/alice/1001/iRacing/spa/gt3/Race";

/// Rally topic used across tests.
pub const RALLY_TOPIC: &str = "b4mad/bob/7/Richard Burns Rally/Harwood Forest/Lancer/Stage";

/// Length of the synthetic braking zones pattern, in meters.
pub const PATTERN_LENGTH: f64 = 500.0;

/// Fixed point in time, offset by `millis`.
pub fn timestamp(millis: i64) -> DateTime<Utc> {
    let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    base + TimeDelta::milliseconds(millis)
}

/// Complete standard-variant tick at full throttle.
pub fn lap_telemetry(distance: f64, lap: i64, lap_time: f64) -> Telemetry {
    Telemetry::new()
        .with(channels::DISTANCE_ROUND_TRACK, distance)
        .with(channels::CURRENT_LAP, lap)
        .with(channels::CURRENT_LAP_TIME, lap_time)
        .with(channels::LAP_TIME_PREVIOUS, 0.0)
        .with(channels::CURRENT_LAP_IS_VALID, true)
        .with(channels::PREVIOUS_LAP_WAS_VALID, true)
        .with(channels::THROTTLE, 1.0)
        .with(channels::BRAKE, 0.0)
        .with(channels::SPEED_MS, 60.0)
        .with(channels::GEAR, 5)
}

/// Rally tick on the single stage lap.
pub fn rally_telemetry(distance: f64, lap_time: f64) -> Telemetry {
    Telemetry::new()
        .with(channels::DISTANCE_ROUND_TRACK, distance)
        .with(channels::CURRENT_LAP, 1)
        .with(channels::CURRENT_LAP_TIME, lap_time)
}

/// Standard tick with a corner every [`PATTERN_LENGTH`] meters: full throttle
/// for the first 60%, coasting up to 70%, then braking to the corner speed.
pub fn cornering_telemetry(distance: f64, lap: i64, lap_time: f64) -> Telemetry {
    let phase = (distance % PATTERN_LENGTH) / PATTERN_LENGTH;
    let (throttle, brake, speed, gear) = if phase < 0.6 {
        (1.0, 0.0, 60.0, 5)
    } else if phase < 0.7 {
        (0.0, 0.0, 50.0, 5)
    } else {
        (0.0, 0.8, 50.0 - (phase - 0.7) * 100.0, 3)
    };
    lap_telemetry(distance, lap, lap_time)
        .with(channels::THROTTLE, throttle)
        .with(channels::BRAKE, brake)
        .with(channels::SPEED_MS, speed)
        .with(channels::GEAR, gear)
}

/// One lap of `ticks` evenly spaced samples from 0 to `length` meters at 60 Hz.
pub fn linear_lap(topic: &str, ticks: usize, length: f64) -> Vec<Tick> {
    let last = ticks.saturating_sub(1).max(1) as f64;
    (0..ticks)
        .map(|i| {
            let distance = length * i as f64 / last;
            let lap_time = i as f64 / 60.0;
            let millis = (i as i64 * 1000) / 60;
            Tick::new(topic, cornering_telemetry(distance, 1, lap_time), timestamp(millis))
        })
        .collect()
}

/// Create `game`/`track` with one segment landmark between each pair of
/// consecutive `boundaries`.
pub fn seed_track(repo: &InMemoryRepository, game: &str, track: &str, boundaries: &[f64]) -> Track {
    let game = repo.get_or_create_game(game).expect("seed game").record;
    let track = repo.get_or_create_track(game.id, track).expect("seed track").record;
    for (i, pair) in boundaries.windows(2).enumerate() {
        let name = format!("Segment {}", i + 1);
        repo.insert_landmark(track.id, name, LandmarkKind::Segment, pair[0], pair[1])
            .expect("seed landmark");
    }
    track
}

/// Create the session record behind [`IRACING_TOPIC`].
pub fn registered_session(repo: &InMemoryRepository) -> SessionRecord {
    let game = repo.get_or_create_game("iRacing").unwrap().record;
    let driver = repo.get_or_create_driver("alice").unwrap().record;
    let session_type = repo.get_or_create_session_type("Race").unwrap().record;
    let key = SessionKey {
        driver: driver.id,
        session_id: "1001".to_string(),
        session_type: session_type.id,
        game: game.id,
    };
    repo.get_or_create_session(&key, None, None, timestamp(0)).unwrap().record
}
