//! Replay provider for recorded tick logs
//!
//! A tick log holds one JSON object per line:
//!
//! ```text
//! {"topic": "b4mad/alice/1001/iRacing/spa/gt3/Race", "time": 1700000000000, "telemetry": {"DistanceRoundTrack": 12.5}}
//! ```
//!
//! `time` is in unix milliseconds. Blank lines are skipped, and so are lines
//! that do not decode, after a warning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::provider::TickSource;
use crate::types::{Telemetry, Tick};
use crate::{PitcrewError, Result};

/// Wire form of one tick log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub topic: String,
    /// Unix milliseconds
    pub time: i64,
    pub telemetry: Telemetry,
}

impl TickRecord {
    /// Decode one line; `line` is the 1-based line number used in errors.
    pub fn decode(line: usize, text: &str) -> Result<Tick> {
        let record: TickRecord = serde_json::from_str(text)
            .map_err(|e| PitcrewError::tick_log(line, e.to_string()))?;
        let time = DateTime::from_timestamp_millis(record.time).ok_or_else(|| {
            PitcrewError::tick_log(line, format!("timestamp {} out of range", record.time))
        })?;
        Ok(Tick::new(record.topic, record.telemetry, time))
    }

    /// Encode a tick as one line, without the trailing newline.
    pub fn encode(tick: &Tick) -> Result<String> {
        let record = TickRecord {
            topic: tick.topic.clone(),
            time: tick.time.timestamp_millis(),
            telemetry: tick.telemetry.clone(),
        };
        serde_json::to_string(&record).map_err(|e| PitcrewError::tick_log(0, e.to_string()))
    }
}

/// Replay provider that reads from tick logs
#[derive(Debug)]
pub struct ReplayProvider {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line: usize,

    /// Playback speed multiplier; `None` replays as fast as possible
    speed: Option<f64>,
    last_time: Option<DateTime<Utc>>,

    ticks: u64,
    skipped: u64,
}

impl ReplayProvider {
    /// Open a tick log
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file =
            File::open(&path).await.map_err(|e| PitcrewError::io_error(path.clone(), e))?;
        info!(path = %path.display(), "Opened tick log");

        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            line: 0,
            speed: None,
            last_time: None,
            ticks: 0,
            skipped: 0,
        })
    }

    /// Pace playback on tick timestamps, `speed` times faster than recorded.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed.clamp(0.1, 100.0)); // Clamp to reasonable range
        debug!(speed = ?self.speed, "Playback speed set");
        self
    }

    /// Ticks returned so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Malformed lines skipped so far
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    async fn pace(&mut self, time: DateTime<Utc>) {
        let Some(speed) = self.speed else {
            return;
        };
        if let Some(last) = self.last_time.replace(time) {
            let gap = (time - last).to_std().unwrap_or_default();
            if !gap.is_zero() {
                tokio::time::sleep(Duration::from_secs_f64(gap.as_secs_f64() / speed)).await;
            }
        }
    }
}

#[async_trait::async_trait]
impl TickSource for ReplayProvider {
    async fn next_tick(&mut self) -> Result<Option<Tick>> {
        loop {
            let next = self
                .lines
                .next_line()
                .await
                .map_err(|e| PitcrewError::io_error(self.path.clone(), e))?;
            let Some(text) = next else {
                info!(
                    path = %self.path.display(),
                    ticks = self.ticks,
                    skipped = self.skipped,
                    "Reached end of tick log"
                );
                return Ok(None);
            };
            self.line += 1;

            if text.trim().is_empty() {
                continue;
            }

            match TickRecord::decode(self.line, &text) {
                Ok(tick) => {
                    self.pace(tick.time).await;
                    self.ticks += 1;
                    trace!(line = self.line, topic = %tick.topic, "Replaying tick");
                    return Ok(Some(tick));
                }
                Err(e) => {
                    self.skipped += 1;
                    warn!(path = %self.path.display(), error = %e, "Skipping malformed tick");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{IRACING_TOPIC, lap_telemetry, timestamp};
    use crate::types::channels;

    fn temp_log(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("pitcrew-{}-{}.jsonl", name, std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn decode_reads_millisecond_timestamps() {
        let tick = TickRecord::decode(
            1,
            r#"{"topic": "a/b/c/d/e/f/g", "time": 1700000000123, "telemetry": {"SpeedMs": 41.5}}"#,
        )
        .unwrap();
        assert_eq!(tick.time.timestamp_millis(), 1_700_000_000_123);
        assert_eq!(tick.telemetry.number(channels::SPEED_MS), Some(41.5));
    }

    #[test]
    fn decode_reports_line_numbers() {
        let err = TickRecord::decode(42, "{not json").unwrap_err();
        assert!(matches!(err, PitcrewError::TickLog { line: 42, .. }));

        let err = TickRecord::decode(7, r#"{"topic": "t", "time": 1}"#).unwrap_err();
        assert!(err.to_string().contains("line 7"));
    }

    #[test]
    fn encoded_lines_decode_to_the_same_tick() {
        let tick = Tick::new(IRACING_TOPIC, lap_telemetry(120.5, 2, 3.25), timestamp(250));
        let line = TickRecord::encode(&tick).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(TickRecord::decode(1, &line).unwrap(), tick);
    }

    #[tokio::test]
    async fn replays_valid_lines_and_skips_the_rest() {
        let good = |ms: i64| {
            TickRecord::encode(&Tick::new(IRACING_TOPIC, lap_telemetry(1.0, 1, 0.0), timestamp(ms)))
                .unwrap()
        };
        let contents = format!("{}\n\n{{broken\n{}\n", good(0), good(16));
        let path = temp_log("skip", &contents);

        let mut provider = ReplayProvider::open(&path).await.unwrap();
        let mut times = Vec::new();
        while let Some(tick) = provider.next_tick().await.unwrap() {
            times.push(tick.time);
        }
        std::fs::remove_file(&path).ok();

        assert_eq!(times, vec![timestamp(0), timestamp(16)]);
        assert_eq!(provider.ticks(), 2);
        assert_eq!(provider.skipped(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let result = ReplayProvider::open("/nonexistent/ticks.jsonl").await;
        match result {
            Err(PitcrewError::Io { path, .. }) => assert!(path.ends_with("ticks.jsonl")),
            Err(other) => panic!("Expected Io error, got {other:?}"),
            Ok(_) => panic!("Expected Io error"),
        }
    }
}
