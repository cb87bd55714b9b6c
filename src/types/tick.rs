//! Tick type for the stream-based architecture

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Telemetry;

/// One timestamped telemetry sample.
///
/// This is the fundamental data unit that flows through the system. Sessions,
/// laps and segments are all derived from a sequence of ticks, and every
/// timeout in the core is computed from `time`, never from the wall clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Routing key, `prefix/driver/session/game/track/car/type`
    pub topic: String,

    /// Channel values
    pub telemetry: Telemetry,

    /// Sample timestamp
    pub time: DateTime<Utc>,
}

impl Tick {
    /// Create a new tick
    pub fn new(topic: impl Into<String>, telemetry: Telemetry, time: DateTime<Utc>) -> Self {
        Self { topic: topic.into(), telemetry, time }
    }
}
