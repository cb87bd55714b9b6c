//! Shared builders for integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeDelta, Utc};
use pitcrew::model::{LandmarkKind, Track};
use pitcrew::repository::{InMemoryRepository, Repository};
use pitcrew::types::channels;
use pitcrew::{Telemetry, Tick};

pub const TOPIC: &str = "b4mad/alice/1001/iRacing/spa/gt3/Race";
pub const RALLY_TOPIC: &str = "b4mad/bob/7/Richard Burns Rally/Harwood Forest/Lancer/Stage";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn at(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap() + TimeDelta::milliseconds(millis)
}

/// Tick with every channel the standard lap strategy needs, plus pedals that
/// brake into a corner at the end of every 500 m.
pub fn telemetry(distance: f64, lap: i64, lap_time: f64, lap_time_previous: f64) -> Telemetry {
    let phase = (distance % 500.0) / 500.0;
    let (throttle, brake, speed) = match phase {
        p if p < 0.6 => (1.0, 0.0, 60.0),
        p if p < 0.7 => (0.0, 0.0, 50.0),
        p => (0.0, 0.8, 50.0 - (p - 0.7) * 100.0),
    };
    Telemetry::new()
        .with(channels::DISTANCE_ROUND_TRACK, distance)
        .with(channels::CURRENT_LAP, lap)
        .with(channels::CURRENT_LAP_TIME, lap_time)
        .with(channels::LAP_TIME_PREVIOUS, lap_time_previous)
        .with(channels::CURRENT_LAP_IS_VALID, true)
        .with(channels::PREVIOUS_LAP_WAS_VALID, true)
        .with(channels::THROTTLE, throttle)
        .with(channels::BRAKE, brake)
        .with(channels::SPEED_MS, speed)
        .with(channels::GEAR, 4)
}

/// `ticks` samples of lap `lap`, evenly spread over `length` meters at 60 Hz,
/// starting `offset_ms` after [`at`]`(0)`.
pub fn lap_ticks(
    topic: &str,
    lap: i64,
    ticks: usize,
    length: f64,
    offset_ms: i64,
    lap_time_previous: f64,
) -> Vec<Tick> {
    let last = (ticks.max(2) - 1) as f64;
    (0..ticks)
        .map(|i| {
            let distance = length * i as f64 / last;
            let lap_time = i as f64 / 60.0;
            let millis = offset_ms + (i as i64 * 1000) / 60;
            Tick::new(topic, telemetry(distance, lap, lap_time, lap_time_previous), at(millis))
        })
        .collect()
}

/// Create the track with a segment landmark every `step` meters up to `length`.
pub fn seed_track(repo: &InMemoryRepository, game: &str, track: &str, step: f64, length: f64) -> Track {
    let game = repo.get_or_create_game(game).unwrap().record;
    let track = repo.get_or_create_track(game.id, track).unwrap().record;
    let mut start = 0.0;
    let mut n = 1;
    while start < length {
        let end = (start + step).min(length);
        repo.insert_landmark(track.id, format!("S{n}"), LandmarkKind::Segment, start, end).unwrap();
        start = end;
        n += 1;
    }
    track
}
