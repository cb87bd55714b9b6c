//! Per-segment feature extractor
//!
//! A [`SegmentAnalyzer`] is bound to one `(lap, landmark)` pair and sees only
//! the ticks whose distance falls inside that landmark. It keeps running
//! accumulators instead of buffering the window, so memory stays constant no
//! matter how long the car spends in the segment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AnalyzerConfig;
use crate::types::{Telemetry, Value, channels};

/// Features extracted from one segment window.
///
/// Distances are in centimeters, durations in centiseconds, speeds in m/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    pub coasting_time: u32,
    pub braking_point: Option<u32>,
    pub lift_off_point: Option<u32>,
    pub apex: Option<u32>,
    pub launch_wheel_slip_time: Option<u32>,
    pub entry_speed: Option<u16>,
    pub corner_speed: Option<u16>,
    pub exit_speed: Option<u16>,
    pub gear: Option<u8>,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    lap_time: Option<f64>,
    time: DateTime<Utc>,
    throttle: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Apex {
    distance: f64,
    speed: f64,
    gear: Option<i64>,
}

/// Streaming extractor for braking point, lift-off point, apex, coasting time
/// and launch wheel slip.
#[derive(Debug, Clone)]
pub struct SegmentAnalyzer {
    config: AnalyzerConfig,
    launch: bool,
    previous: Option<Sample>,
    samples: u64,
    coasting_secs: f64,
    wheel_slip_secs: f64,
    braking_point: f64,
    lift_off_point: f64,
    apex: Option<Apex>,
    entry_speed: Option<f64>,
    exit_speed: Option<f64>,
}

impl SegmentAnalyzer {
    /// Create an analyzer. `launch` marks the first segment of a lap, the only
    /// one where wheel slip is attributed to the launch.
    pub fn new(config: AnalyzerConfig, launch: bool) -> Self {
        Self {
            config,
            launch,
            previous: None,
            samples: 0,
            coasting_secs: 0.0,
            wheel_slip_secs: 0.0,
            braking_point: 0.0,
            lift_off_point: 0.0,
            apex: None,
            entry_speed: None,
            exit_speed: None,
        }
    }

    /// Number of ticks observed.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Feed one tick. Ticks without a distance are ignored.
    pub fn observe(&mut self, telemetry: &Telemetry, now: DateTime<Utc>) {
        let Some(distance) = telemetry.number(channels::DISTANCE_ROUND_TRACK) else {
            return;
        };
        let throttle = telemetry.number(channels::THROTTLE);
        let brake = telemetry.number(channels::BRAKE);
        let speed = telemetry.number(channels::SPEED_MS);
        let gear = telemetry.integer(channels::GEAR);
        let lap_time = telemetry.number(channels::CURRENT_LAP_TIME);

        let dt = self.previous.map_or(0.0, |prev| self.elapsed(&prev, lap_time, now));

        let threshold = self.config.coasting_threshold;
        if matches!((throttle, brake), (Some(t), Some(b)) if t < threshold && b < threshold) {
            self.coasting_secs += dt;
        }

        if self.braking_point <= 0.0 && brake.is_some_and(|b| b > self.config.brake_threshold) {
            self.braking_point = distance;
        }

        if self.lift_off_point <= 0.0 {
            let lift = self.config.lift_off_threshold;
            let previous_throttle = self.previous.and_then(|p| p.throttle);
            if matches!((previous_throttle, throttle), (Some(p), Some(t)) if p >= lift && t < lift) {
                self.lift_off_point = distance;
            }
        }

        if let Some(speed) = speed {
            self.entry_speed.get_or_insert(speed);
            self.exit_speed = Some(speed);
            if self.apex.is_none_or(|apex| speed < apex.speed) {
                self.apex = Some(Apex { distance, speed, gear });
            }
        }

        if self.launch
            && self.is_slipping(telemetry)
            && speed.is_some_and(|s| s < self.config.launch_speed_limit)
        {
            self.wheel_slip_secs += dt;
        }

        self.previous = Some(Sample { lap_time, time: now, throttle });
        self.samples += 1;
    }

    /// Compute features from everything observed so far.
    ///
    /// Does not consume the analyzer: the registry snapshots an active segment
    /// on every flush and keeps feeding it afterwards.
    pub fn finalize(&self) -> Features {
        Features {
            coasting_time: hundredths(self.coasting_secs).unwrap_or(0),
            braking_point: hundredths(self.braking_point),
            lift_off_point: hundredths(self.lift_off_point),
            apex: self.apex.and_then(|apex| hundredths(apex.distance)),
            launch_wheel_slip_time: if self.launch {
                hundredths(self.wheel_slip_secs)
            } else {
                None
            },
            entry_speed: self.entry_speed.and_then(whole_speed),
            corner_speed: self.apex.and_then(|apex| whole_speed(apex.speed)),
            exit_speed: self.exit_speed.and_then(whole_speed),
            gear: self.apex.and_then(|apex| apex.gear).and_then(|g| u8::try_from(g).ok()),
        }
    }

    /// Seconds between the previous sample and this one.
    ///
    /// Prefers the game's lap clock, falls back to tick timestamps, and drops
    /// gaps (pauses, reconnects) longer than the configured maximum.
    fn elapsed(&self, previous: &Sample, lap_time: Option<f64>, now: DateTime<Utc>) -> f64 {
        let max = self.config.max_tick_gap_secs;
        let in_range = |d: &f64| *d > 0.0 && *d <= max;

        let from_lap_clock = match (previous.lap_time, lap_time) {
            (Some(before), Some(after)) => Some(after - before).filter(in_range),
            _ => None,
        };

        from_lap_clock
            .or_else(|| {
                (now - previous.time)
                    .num_microseconds()
                    .map(|us| us as f64 / 1_000_000.0)
                    .filter(in_range)
            })
            .unwrap_or(0.0)
    }

    fn is_slipping(&self, telemetry: &Telemetry) -> bool {
        match telemetry.get(channels::WHEEL_SLIP) {
            Some(Value::Bool(slipping)) => *slipping,
            Some(value) => value.as_f64().is_some_and(|v| v.abs() > self.config.wheel_slip_threshold),
            None => false,
        }
    }
}

/// Scale to hundredths; zero, negative and non-finite values were not observed.
fn hundredths(value: f64) -> Option<u32> {
    (value.is_finite() && value > 0.0).then(|| (value * 100.0) as u32)
}

fn whole_speed(speed: f64) -> Option<u16> {
    (speed.is_finite() && speed >= 0.0).then(|| speed.round() as u16)
}
