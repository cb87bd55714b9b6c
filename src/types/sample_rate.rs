//! Declared telemetry sample rate

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rate at which a telemetry bridge publishes ticks.
///
/// The registry never reads the wall clock, so anything expressed as a
/// duration (flush cadence) is converted to a tick count through the declared
/// rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleRate(u32);

impl SampleRate {
    /// SimHub and most sim bridges publish at 60 Hz.
    pub const DEFAULT: SampleRate = SampleRate(60);

    /// Create a sample rate; zero is clamped to 1 Hz.
    pub fn new(hz: u32) -> Self {
        Self(hz.max(1))
    }

    /// Rate in Hz.
    pub fn hz(self) -> u32 {
        self.0
    }

    /// Nominal spacing between two ticks.
    pub fn tick_interval(self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.0))
    }

    /// Number of ticks covering `window`, at least one.
    pub fn ticks_in(self, window: Duration) -> u64 {
        let ticks = (window.as_secs_f64() * f64::from(self.0)).round() as u64;
        ticks.max(1)
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}
