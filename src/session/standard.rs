//! Multi-lap circuit analysis
//!
//! A lap starts when the car crosses the finish line: the distance drops
//! below the previous tick's distance and is within the crossing threshold of
//! the line. The game reports the final time of a lap only after the next lap
//! has started, through `LapTimePrevious`, so closing a lap is a separate step
//! that targets the previous lap.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::laps::{LapBook, LapFactory};
use super::Outcome;
use crate::Result;
use crate::types::{Presence, Telemetry, channels};

#[derive(Debug, Clone, Copy)]
struct Reading {
    distance: f64,
    lap: i64,
    lap_time_previous: f64,
    lap_is_valid: bool,
    previous_lap_was_valid: bool,
}

impl Reading {
    fn read(telemetry: &Telemetry) -> std::result::Result<Self, Presence<()>> {
        let distance = telemetry.require_number(channels::DISTANCE_ROUND_TRACK).into_valid()?;
        let lap = telemetry.require_integer(channels::CURRENT_LAP).into_valid()?;
        telemetry.require_number(channels::CURRENT_LAP_TIME).into_valid()?;
        Ok(Self {
            distance,
            lap,
            lap_time_previous: telemetry
                .require_number(channels::LAP_TIME_PREVIOUS)
                .into_valid()?,
            lap_is_valid: telemetry.require_flag(channels::CURRENT_LAP_IS_VALID).into_valid()?,
            previous_lap_was_valid: telemetry
                .require_flag(channels::PREVIOUS_LAP_WAS_VALID)
                .into_valid()?,
        })
    }
}

/// Lap-boundary detector for circuit racing games.
#[derive(Debug, Clone)]
pub struct StandardLaps {
    cross_threshold: f64,
    previous_distance: f64,
    lap_time_previous: Option<f64>,
}

impl StandardLaps {
    pub fn new(cross_threshold: f64) -> Self {
        // No distance seen yet: the first tick near the line counts as a crossing.
        Self { cross_threshold, previous_distance: f64::INFINITY, lap_time_previous: None }
    }

    pub fn cross_threshold(&self) -> f64 {
        self.cross_threshold
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

        let crossed =
            reading.distance < self.previous_distance && reading.distance < self.cross_threshold;
        let behind = laps.current().is_none_or(|lap| lap.number < reading.lap);

        let mut outcome = Outcome::Unchanged;
        if crossed && behind {
            // state is only committed once the lap exists, so a failed open
            // is retried on the next tick
            let lap = factory.open(reading.lap, now)?;
            debug!(
                lap = reading.lap,
                distance = reading.distance,
                previous_distance = self.previous_distance,
                "Crossed finish line"
            );
            laps.rotate(lap, now);
            outcome = Outcome::LapOpened;
        }

        if let Some(lap) = laps.current_mut() {
            lap.extend_length(reading.distance);
            lap.set_valid(reading.lap_is_valid);
        }

        if self.lap_time_previous != Some(reading.lap_time_previous) {
            if let Some(previous) = laps.previous_mut() {
                previous.finish(reading.lap_time_previous, reading.previous_lap_was_valid);
                debug!(
                    lap = previous.number,
                    time = reading.lap_time_previous,
                    valid = reading.previous_lap_was_valid,
                    "Closed lap"
                );
            }
        }

        self.previous_distance = reading.distance;
        self.lap_time_previous = Some(reading.lap_time_previous);
        Ok(outcome)
    }
}
