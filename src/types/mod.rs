//! Core types for telemetry data representation.
//!
//! This module provides the data units that flow into the analysis core:
//! - [`Tick`] is one timestamped sample routed by topic
//! - [`Telemetry`] is the flat channel map carried by a tick
//! - [`Value`] is the loosely typed value of one channel
//! - [`Topic`] is the parsed seven-field routing key
//! - [`SampleRate`] converts durations into tick counts
//!
//! ## Usage Example
//!
//! ```rust
//! use pitcrew::types::{channels, Telemetry, Topic, Presence};
//!
//! let topic: Topic = "b4mad/alice/1001/iRacing/spa/gt3/Race".parse().unwrap();
//! assert_eq!(topic.track, "spa");
//!
//! let telemetry = Telemetry::new()
//!     .with(channels::DISTANCE_ROUND_TRACK, 1234.5)
//!     .with(channels::CURRENT_LAP, 2)
//!     .with(channels::LAP_TIME_PREVIOUS, Option::<f64>::None);
//!
//! assert_eq!(telemetry.number(channels::DISTANCE_ROUND_TRACK), Some(1234.5));
//! assert!(matches!(telemetry.require_number(channels::LAP_TIME_PREVIOUS), Presence::Null(_)));
//! assert!(matches!(telemetry.require_number(channels::CURRENT_LAP_TIME), Presence::Missing(_)));
//! ```

pub mod channels;
mod sample_rate;
mod telemetry;
mod tick;
mod topic;
mod value;

pub use sample_rate::SampleRate;
pub use telemetry::{Presence, Telemetry};
pub use tick::Tick;
pub use topic::{TOPIC_FIELDS, Topic};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_numeric_values_read_back(value in any::<f64>().prop_filter("not NaN", |v| !v.is_nan())) {
            let telemetry = Telemetry::new().with("SpeedMs", value);
            prop_assert_eq!(telemetry.number("SpeedMs"), Some(value));
            prop_assert!(matches!(telemetry.require_number("SpeedMs"), Presence::Valid(_)));
        }

        #[test]
        fn prop_integers_coerce_to_numbers(value in any::<i32>()) {
            let telemetry = Telemetry::new().with("CurrentLap", value);
            prop_assert_eq!(telemetry.integer("CurrentLap"), Some(i64::from(value)));
            prop_assert_eq!(telemetry.number("CurrentLap"), Some(f64::from(value)));
        }
    }

    #[test]
    fn payload_json_accepts_mixed_values() {
        let json = r#"{"DistanceRoundTrack": 12.5, "CurrentLap": 3, "CurrentLapIsValid": true,
                       "CarClass": "GT3", "LapTimePrevious": null}"#;
        let telemetry: Telemetry = serde_json::from_str(json).unwrap();

        assert_eq!(telemetry.number(channels::DISTANCE_ROUND_TRACK), Some(12.5));
        assert_eq!(telemetry.integer(channels::CURRENT_LAP), Some(3));
        assert_eq!(telemetry.flag(channels::CURRENT_LAP_IS_VALID), Some(true));
        assert_eq!(telemetry.text(channels::CAR_CLASS), Some("GT3"));
        assert_eq!(telemetry.get(channels::LAP_TIME_PREVIOUS), Some(&Value::Null));
    }

    #[test]
    fn text_in_numeric_channel_counts_as_missing() {
        let telemetry = Telemetry::new().with(channels::CURRENT_LAP_TIME, "n/a");
        assert_eq!(
            telemetry.require_number(channels::CURRENT_LAP_TIME),
            Presence::Missing(channels::CURRENT_LAP_TIME)
        );
    }

    #[test]
    fn whole_floats_are_integers() {
        assert_eq!(Value::Float(4.0).as_i64(), Some(4));
        assert_eq!(Value::Float(4.5).as_i64(), None);
        assert_eq!(Value::Bool(true).as_f64(), Some(1.0));
        assert_eq!(Value::Float(0.0).as_bool(), Some(false));
        assert_eq!(Value::Float(f64::NAN).as_f64(), None);
    }
}
