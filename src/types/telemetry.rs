//! Telemetry payload: a flat mapping of channel name to value

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Value;

/// Lookup result for a channel that lap analysis depends on.
///
/// Distinguishes a channel the payload never carried from one that was sent
/// as an explicit null, so that the invalid-telemetry log can say which.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Presence<T> {
    /// Channel present with a usable value
    Valid(T),
    /// Channel absent from the payload (or not convertible)
    Missing(&'static str),
    /// Channel sent as null
    Null(&'static str),
}

impl<T> Presence<T> {
    /// Returns the channel name responsible for an invalid reading.
    pub fn channel(&self) -> Option<&'static str> {
        match self {
            Presence::Valid(_) => None,
            Presence::Missing(name) | Presence::Null(name) => Some(name),
        }
    }

    /// Split into the valid payload or the reason it is unusable, for `?`.
    pub fn into_valid(self) -> Result<T, Presence<()>> {
        match self {
            Presence::Valid(v) => Ok(v),
            Presence::Missing(name) => Err(Presence::Missing(name)),
            Presence::Null(name) => Err(Presence::Null(name)),
        }
    }
}

/// Telemetry channels carried by one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Telemetry {
    channels: HashMap<String, Value>,
}

impl Telemetry {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a channel value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.channels.insert(name.into(), value.into());
    }

    /// Raw channel value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.channels.get(name)
    }

    /// Numeric channel value; null, text and missing channels are `None`.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    /// Integer channel value.
    pub fn integer(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Boolean channel value.
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// String channel value.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Checked numeric read of a required channel.
    pub fn require_number(&self, name: &'static str) -> Presence<f64> {
        self.require(name, Value::as_f64)
    }

    /// Checked integer read of a required channel.
    pub fn require_integer(&self, name: &'static str) -> Presence<i64> {
        self.require(name, Value::as_i64)
    }

    /// Checked boolean read of a required channel.
    pub fn require_flag(&self, name: &'static str) -> Presence<bool> {
        self.require(name, Value::as_bool)
    }

    fn require<T>(&self, name: &'static str, read: impl Fn(&Value) -> Option<T>) -> Presence<T> {
        match self.get(name) {
            None => Presence::Missing(name),
            Some(Value::Null) => Presence::Null(name),
            Some(value) => read(value).map_or(Presence::Missing(name), Presence::Valid),
        }
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the payload carries no channels.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Iterate over all channels.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.channels.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Telemetry {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { channels: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}
