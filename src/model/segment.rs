//! Segment records

use serde::{Deserialize, Serialize};

use super::{LandmarkId, LapId, SegmentId};
use crate::analysis::Features;

/// Analysis record for one `(lap, landmark)` pair.
///
/// Distances are stored in centimeters, durations in centiseconds and speeds
/// in meters per second. A `None` feature was never observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub lap: LapId,
    pub landmark: LandmarkId,

    pub braking_point: Option<u32>,
    pub lift_off_point: Option<u32>,
    pub apex: Option<u32>,

    pub entry_speed: Option<u16>,
    pub corner_speed: Option<u16>,
    pub exit_speed: Option<u16>,
    pub gear: Option<u8>,

    pub coasting_time: Option<u32>,
    pub launch_wheel_slip_time: Option<u32>,

    #[serde(skip)]
    dirty: bool,
}

impl Segment {
    pub fn new(id: SegmentId, lap: LapId, landmark: LandmarkId) -> Self {
        Self {
            id,
            lap,
            landmark,
            braking_point: None,
            lift_off_point: None,
            apex: None,
            entry_speed: None,
            corner_speed: None,
            exit_speed: None,
            gear: None,
            coasting_time: None,
            launch_wheel_slip_time: None,
            dirty: false,
        }
    }

    /// Copy extracted features into the record.
    ///
    /// Coasting time is always written; every other feature only when it was
    /// observed, so a re-visited segment keeps earlier observations.
    pub fn apply(&mut self, features: &Features) {
        fn assign<T: PartialEq + Copy>(slot: &mut Option<T>, value: Option<T>, dirty: &mut bool) {
            if let Some(value) = value {
                if *slot != Some(value) {
                    *slot = Some(value);
                    *dirty = true;
                }
            }
        }

        let dirty = &mut self.dirty;
        assign(&mut self.coasting_time, Some(features.coasting_time), dirty);
        assign(&mut self.braking_point, features.braking_point, dirty);
        assign(&mut self.lift_off_point, features.lift_off_point, dirty);
        assign(&mut self.apex, features.apex, dirty);
        assign(&mut self.launch_wheel_slip_time, features.launch_wheel_slip_time, dirty);
        assign(&mut self.entry_speed, features.entry_speed, dirty);
        assign(&mut self.corner_speed, features.corner_speed, dirty);
        assign(&mut self.exit_speed, features.exit_speed, dirty);
        assign(&mut self.gear, features.gear, dirty);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
