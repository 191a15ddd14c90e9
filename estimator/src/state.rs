use glam::DVec4;
use serde::{Deserialize, Serialize};

use crate::dialect::{Axis, Dialect, PositioningMode, Units};

/// Per-axis configuration and live position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisState {
    pub position: f64,
    pub max_feedrate: f64,
    pub max_acceleration: f64,
    pub max_jerk: f64,
}

impl Default for AxisState {
    fn default() -> Self {
        AxisState {
            position: 0.0,
            max_feedrate: 0.0,
            max_acceleration: 0.0,
            max_jerk: 0.0,
        }
    }
}

impl AxisState {
    fn with_defaults(max_feedrate: f64, max_acceleration: f64, max_jerk: f64) -> Self {
        AxisState {
            position: 0.0,
            max_feedrate,
            max_acceleration,
            max_jerk,
        }
    }
}

/// A snapshot of the feedrate decomposition at the moment a block was emitted.
/// Two of these (current, previous) are all the junction-analysis logic needs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Feedrates {
    /// Scalar nominal feedrate, mm/s.
    pub feedrate: f64,
    /// Signed per-axis component of `feedrate`, mm/s.
    pub axis_feedrate: DVec4,
    /// `axis_feedrate`, component-wise absolute value.
    pub abs_axis_feedrate: DVec4,
    /// The highest speed this block could enter/exit using jerk alone.
    pub safe_feedrate: f64,
}

/// Everything the dispatcher and planner read or mutate: dialect, units,
/// positioning mode, per-axis limits/position, and the global scalars.
///
/// This is also the shape used for configuration: [`crate::estimator::Estimator::from_state`]
/// accepts one loaded from a config file, and `dump-config` in the CLI prints
/// one back out as JSON.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct State {
    pub dialect: Dialect,
    pub units: Units,
    pub positioning: PositioningMode,
    pub axis: [AxisState; 4],
    /// Global nominal feedrate, mm/s (set by the `F` word).
    pub feedrate: f64,
    /// Global acceleration, mm/s^2.
    pub acceleration: f64,
    /// Accumulated time for dwells, homing, and heater waits, in seconds.
    pub additional_time: f64,
    /// Floor applied to a block's scalar feedrate, mm/s. 0 disables it.
    pub minimum_feedrate: f64,
    /// Placeholder added to `additional_time` for `M109`-style waits.
    pub heater_wait_time: f64,
    /// Placeholder added to `additional_time` for `G28`.
    pub homing_time: f64,
}

impl Default for State {
    fn default() -> Self {
        State {
            dialect: Dialect::Marlin,
            units: Units::Millimeters,
            positioning: PositioningMode::Absolute,
            axis: [
                AxisState::with_defaults(500.0, 9000.0, 10.0),
                AxisState::with_defaults(500.0, 9000.0, 10.0),
                AxisState::with_defaults(12.0, 500.0, 0.4),
                AxisState::with_defaults(120.0, 10000.0, 2.5),
            ],
            feedrate: 0.0,
            acceleration: 1500.0,
            additional_time: 0.0,
            minimum_feedrate: 0.0,
            heater_wait_time: 0.0,
            homing_time: 0.0,
        }
    }
}

impl State {
    pub fn axis(&self, axis: Axis) -> &AxisState {
        &self.axis[axis.index()]
    }

    pub fn axis_mut(&mut self, axis: Axis) -> &mut AxisState {
        &mut self.axis[axis.index()]
    }

    pub fn position(&self) -> DVec4 {
        DVec4::new(
            self.axis[0].position,
            self.axis[1].position,
            self.axis[2].position,
            self.axis[3].position,
        )
    }

    pub fn set_position(&mut self, pos: DVec4) {
        let pos = pos.to_array();
        for axis in Axis::ALL {
            self.axis_mut(axis).position = pos[axis.index()];
        }
    }

}
