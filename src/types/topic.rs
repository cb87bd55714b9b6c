//! Topic keys

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::PitcrewError;

/// Number of slash-delimited fields in a topic.
pub const TOPIC_FIELDS: usize = 7;

/// Parsed routing key identifying one telemetry stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub prefix: String,
    pub driver: String,
    pub session_id: String,
    pub game: String,
    pub track: String,
    pub car: String,
    pub session_type: String,
}

impl FromStr for Topic {
    type Err = PitcrewError;

    fn from_str(topic: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = topic.split('/').collect();
        let [prefix, driver, session_id, game, track, car, session_type] = parts.as_slice() else {
            return Err(PitcrewError::malformed_topic(topic, parts.len()));
        };

        Ok(Self {
            prefix: prefix.to_string(),
            driver: driver.to_string(),
            session_id: session_id.to_string(),
            game: game.to_string(),
            track: track.to_string(),
            car: car.to_string(),
            session_type: session_type.to_string(),
        })
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}/{}/{}",
            self.prefix,
            self.driver,
            self.session_id,
            self.game,
            self.track,
            self.car,
            self.session_type
        )
    }
}
