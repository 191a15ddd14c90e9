use serde::{Deserialize, Serialize};

/// The four axes the planner tracks. `E` is the extruder; it has no spatial
/// meaning but is planned exactly like a linear axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
    E,
}

impl Axis {
    pub const ALL: [Axis; 4] = [Axis::X, Axis::Y, Axis::Z, Axis::E];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
            Axis::E => 3,
        }
    }
}

/// Firmware dialect tag. Affects only the unit convention used by `M203`
/// (see [`Dialect::m203_is_mm_per_minute`]); the planner math itself is
/// identical across dialects.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Unknown,
    #[default]
    Marlin,
    Repetier,
    Smoothieware,
    RepRapFirmware,
    Teacup,
}

impl Dialect {
    /// RepRapFirmware's `M203` takes mm/min; every other dialect here takes mm/s.
    pub fn m203_is_mm_per_minute(self) -> bool {
        matches!(self, Dialect::RepRapFirmware)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Millimeters,
    Inches,
}

impl Units {
    /// Factor to multiply an incoming coordinate by before storing it in mm.
    pub fn to_mm_factor(self) -> f64 {
        match self {
            Units::Millimeters => 1.0,
            Units::Inches => 25.4,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositioningMode {
    #[default]
    Absolute,
    Relative,
}
