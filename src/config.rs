//! Runtime configuration.
//!
//! Every value has a default, so an empty document (or [`PitcrewConfig::default`])
//! is a working configuration. Durations are expressed in seconds.
//!
//! ```rust
//! use pitcrew::PitcrewConfig;
//!
//! let config = PitcrewConfig::from_yaml_str(
//!     r#"
//! registry:
//!   flush_interval_secs: 30
//! analysis:
//!   cross_thresholds:
//!     iRacing: 10
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.registry.flush_interval_ticks(), 1800);
//! assert_eq!(config.analysis.cross_threshold("iRacing"), 10.0);
//! assert_eq!(config.analysis.cross_threshold("Assetto Corsa Competizione"), 100.0);
//! ```

use anyhow::Context;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::types::SampleRate;
use crate::{PitcrewError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitcrewConfig {
    pub registry: RegistryConfig,
    pub analysis: AnalysisConfig,
    pub analyzer: AnalyzerConfig,
}

impl PitcrewConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml).map_err(|e| PitcrewError::Config {
            reason: format!("YAML parsing failed: {}", e),
            source: Some(Box::new(e)),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        Self::from_yaml_str(&yaml)
    }

    /// Reject values the core cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.registry.sample_rate_hz == 0 {
            return Err(PitcrewError::config("registry.sample_rate_hz must be positive"));
        }
        if self.registry.max_session_age_secs == 0 {
            return Err(PitcrewError::config("registry.max_session_age_secs must be positive"));
        }
        if self.analysis.default_cross_threshold <= 0.0 {
            return Err(PitcrewError::config("analysis.default_cross_threshold must be positive"));
        }
        if let Some((game, _)) = self.analysis.cross_thresholds.iter().find(|(_, t)| **t <= 0.0) {
            return Err(PitcrewError::config(format!(
                "analysis.cross_thresholds.{} must be positive",
                game
            )));
        }
        let analyzer = &self.analyzer;
        for (name, value) in [
            ("coasting_threshold", analyzer.coasting_threshold),
            ("brake_threshold", analyzer.brake_threshold),
            ("lift_off_threshold", analyzer.lift_off_threshold),
            ("wheel_slip_threshold", analyzer.wheel_slip_threshold),
            ("launch_speed_limit", analyzer.launch_speed_limit),
            ("max_tick_gap_secs", analyzer.max_tick_gap_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PitcrewError::config(format!(
                    "analyzer.{} must be a non-negative number",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// What to do with the first tick of a topic whose session type is the
/// announcement marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnouncementPolicy {
    /// Drop the tick without creating a session
    #[default]
    Ignore,
    /// Treat the marker like any other session type
    Create,
}

/// Session registry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Declared publishing rate of the telemetry bridge
    pub sample_rate_hz: u32,
    /// Flush cadence, converted to ticks through the sample rate
    pub flush_interval_secs: u64,
    /// Sessions idle longer than this are flushed and evicted
    pub max_session_age_secs: u64,
    pub announcement_policy: AnnouncementPolicy,
    /// Session type used by bridges to announce a new session
    pub announcement_marker: String,
    /// Length given to tracks seen for the first time, in meters
    pub new_track_length: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: SampleRate::DEFAULT.hz(),
            flush_interval_secs: 60,
            max_session_age_secs: 60 * 60,
            announcement_policy: AnnouncementPolicy::Ignore,
            announcement_marker: "NewSession".to_string(),
            new_track_length: 10,
        }
    }
}

impl RegistryConfig {
    pub fn sample_rate(&self) -> SampleRate {
        SampleRate::new(self.sample_rate_hz)
    }

    /// Number of routed ticks between two batched flushes.
    pub fn flush_interval_ticks(&self) -> u64 {
        self.sample_rate().ticks_in(Duration::from_secs(self.flush_interval_secs))
    }

    /// Idle age after which a session is evicted.
    pub fn max_session_age(&self) -> TimeDelta {
        let secs = i64::try_from(self.max_session_age_secs).unwrap_or(i64::MAX);
        TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX)
    }

    /// Whether `session_type` is the announcement marker and must be skipped.
    pub fn ignores_session_type(&self, session_type: &str) -> bool {
        self.announcement_policy == AnnouncementPolicy::Ignore
            && session_type == self.announcement_marker
    }
}

/// Lap-boundary detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Games analysed as a single continuous stage
    pub rally_games: Vec<String>,
    /// Finish-line crossing threshold in meters for games without an override
    pub default_cross_threshold: f64,
    /// Per-game crossing thresholds
    pub cross_thresholds: HashMap<String, f64>,
    /// Consecutive stale-time and advancing-distance ticks that end a stage
    pub rally_completion_ticks: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rally_games: vec!["Richard Burns Rally".to_string()],
            default_cross_threshold: 100.0,
            cross_thresholds: HashMap::new(),
            rally_completion_ticks: 10,
        }
    }
}

impl AnalysisConfig {
    pub fn is_rally(&self, game: &str) -> bool {
        self.rally_games.iter().any(|g| g == game)
    }

    pub fn cross_threshold(&self, game: &str) -> f64 {
        self.cross_thresholds.get(game).copied().unwrap_or(self.default_cross_threshold)
    }
}

/// Segment feature extraction thresholds. Pedal values are in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Both pedals below this count as coasting
    pub coasting_threshold: f64,
    /// Brake above this marks the braking point
    pub brake_threshold: f64,
    /// Throttle dropping from at-or-above to below this marks the lift-off point
    pub lift_off_threshold: f64,
    /// Numeric wheel-slip magnitude above this counts as slipping
    pub wheel_slip_threshold: f64,
    /// Launch wheel slip is only counted below this speed, m/s
    pub launch_speed_limit: f64,
    /// Gaps between ticks longer than this are not accumulated, seconds
    pub max_tick_gap_secs: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            coasting_threshold: 0.05,
            brake_threshold: 0.1,
            lift_off_threshold: 0.95,
            wheel_slip_threshold: 0.1,
            launch_speed_limit: 30.0,
            max_tick_gap_secs: 1.0,
        }
    }
}
