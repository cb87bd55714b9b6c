//! Telemetry channel names
//!
//! Channel keys as published by the SimHub-style telemetry bridge. Lap
//! analysis requires the `DistanceRoundTrack`, `CurrentLap` and
//! `CurrentLapTime` channels; the standard (circuit) variant additionally
//! needs the previous-lap channels.

// Lap tracking
pub const DISTANCE_ROUND_TRACK: &str = "DistanceRoundTrack";
pub const CURRENT_LAP: &str = "CurrentLap";
pub const CURRENT_LAP_TIME: &str = "CurrentLapTime";
pub const LAP_TIME_PREVIOUS: &str = "LapTimePrevious";
pub const CURRENT_LAP_IS_VALID: &str = "CurrentLapIsValid";
pub const PREVIOUS_LAP_WAS_VALID: &str = "PreviousLapWasValid";

// Driver inputs and vehicle state
pub const THROTTLE: &str = "Throttle";
pub const BRAKE: &str = "Brake";
pub const SPEED_MS: &str = "SpeedMs";
pub const GEAR: &str = "Gear";
pub const WHEEL_SLIP: &str = "WheelSlip";

// Session metadata carried on the payload
pub const CAR_CLASS: &str = "CarClass";
