//! Compass deviation correction.
//!
//! Deviation is modelled with a first harmonic fitted per installation:
//! `deviation = A0 - A1 · sin(heading - phase)`, all in degrees.

use serde::{Deserialize, Serialize};

use crate::angle::wrap_360;

/// First-harmonic deviation model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MagneticDeviation {
    pub a0_deg: f32,
    pub a1_deg: f32,
    pub phase_deg: f32,
}

impl MagneticDeviation {
    pub const fn new(a0_deg: f32, a1_deg: f32, phase_deg: f32) -> Self {
        Self {
            a0_deg,
            a1_deg,
            phase_deg,
        }
    }

    /// Deviation in degrees at the given raw heading.
    pub fn deviation_deg(&self, heading_deg: f32) -> f32 {
        self.a0_deg - self.a1_deg * (heading_deg - self.phase_deg).to_radians().sin()
    }

    /// Raw heading plus deviation, wrapped into `[0, 360)`.
    pub fn correct(&self, heading_deg: f32) -> f32 {
        wrap_360(heading_deg + self.deviation_deg(heading_deg))
    }
}
