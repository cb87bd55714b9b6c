//! Single-stage rally analysis
//!
//! A rally stage is one lap with no finish-line crossing. The end of the
//! stage shows up as the stage clock freezing while the car keeps rolling.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::laps::{LapBook, LapFactory};
use super::Outcome;
use crate::Result;
use crate::types::{Presence, Telemetry, channels};

#[derive(Debug, Clone, Copy)]
struct Reading {
    distance: f64,
    lap: i64,
    lap_time: f64,
}

impl Reading {
    fn read(telemetry: &Telemetry) -> std::result::Result<Self, Presence<()>> {
        Ok(Self {
            distance: telemetry.require_number(channels::DISTANCE_ROUND_TRACK).into_valid()?,
            lap: telemetry.require_integer(channels::CURRENT_LAP).into_valid()?,
            lap_time: telemetry.require_number(channels::CURRENT_LAP_TIME).into_valid()?,
        })
    }
}

/// Stage detector for rally games.
#[derive(Debug, Clone)]
pub struct RallyLaps {
    completion_ticks: u32,
    previous_time: Option<f64>,
    previous_distance: Option<f64>,
    stale_time_ticks: u32,
    advancing_distance_ticks: u32,
}

impl RallyLaps {
    /// `completion_ticks` is the number of consecutive frozen-clock ticks that
    /// must be exceeded before the stage counts as finished.
    pub fn new(completion_ticks: u32) -> Self {
        Self {
            completion_ticks,
            previous_time: None,
            previous_distance: None,
            stale_time_ticks: 0,
            advancing_distance_ticks: 0,
        }
    }

    pub(crate) fn analyze(
        &mut self,
        telemetry: &Telemetry,
        now: DateTime<Utc>,
        laps: &mut LapBook,
        factory: &LapFactory<'_>,
    ) -> Result<Outcome> {
        let reading = match Reading::read(telemetry) {
            Ok(reading) => reading,
            Err(reason) => return Ok(Outcome::Invalid(reason)),
        };

        let mut outcome = Outcome::Unchanged;
        if laps.current().is_none() {
            let mut lap = factory.open(reading.lap, now)?;
            lap.set_valid(true);
            debug!(lap = reading.lap, "Started stage");
            laps.rotate(lap, now);
            *self = Self::new(self.completion_ticks);
            outcome = Outcome::LapOpened;
        }

        if self.previous_time == Some(reading.lap_time) {
            self.stale_time_ticks = self.stale_time_ticks.saturating_add(1);
        } else {
            self.stale_time_ticks = 0;
        }
        if self.previous_distance.is_some_and(|d| d < reading.distance) {
            self.advancing_distance_ticks = self.advancing_distance_ticks.saturating_add(1);
        } else {
            self.advancing_distance_ticks = 0;
        }

        if let Some(lap) = laps.current_mut() {
            lap.extend_length(reading.distance);
            lap.set_time(reading.lap_time);

            if self.stale_time_ticks > self.completion_ticks
                && self.advancing_distance_ticks > self.completion_ticks
            {
                if !lap.completed {
                    info!(lap = lap.number, time = lap.time, length = lap.length, "Stage completed");
                }
                lap.complete_at(now);
            }
        }

        self.previous_time = Some(reading.lap_time);
        self.previous_distance = Some(reading.distance);
        Ok(outcome)
    }
}
