//! Apparent wind angle decoder for the three-photodiode masthead unit.
//!
//! A light source on the wind vane rotates past three photodiodes mounted
//! 120° apart. Normalised against the mean of the three channels, each
//! reading is the sine of the vane angle with a fixed phase offset:
//!
//! ```text
//! red   = -cos(θ)
//! green = -sin(θ - 30°)
//! blue  =  sin(θ + 30°)
//! ```
//!
//! Each channel's arc sine has two branches. The decoder first picks a
//! coarse 120° zone from the channel signs, then uses that estimate to select
//! the right branch for every channel, and finally blends the three angles,
//! trusting channels that sit in the linear middle of the arc sine over
//! channels near their peaks (where the ADC is also observed to clip).

use std::f32::consts::{FRAC_PI_2, FRAC_PI_3, FRAC_PI_6, PI, TAU};

use crate::angle::wrap_two_pi;
use crate::event::PhotodiodeSample;

/// Minimum mean amplitude for a sample to be considered a real reading.
pub const DEFAULT_MIN_AMPLITUDE: f32 = 100.0;

type Branch = fn(f32) -> f32;

/// Branch selection per 60° sub-zone: (red, green, blue).
const SUB_ZONES: [(Branch, Branch, Branch); 6] = [
    (red_0_180, green_300_120, blue_240_060),   // [0, 60)
    (red_0_180, green_300_120, blue_060_240),   // [60, 120)
    (red_0_180, green_120_300, blue_060_240),   // [120, 180)
    (red_180_360, green_120_300, blue_060_240), // [180, 240)
    (red_180_360, green_120_300, blue_240_060), // [240, 300)
    (red_180_360, green_300_120, blue_240_060), // [300, 360)
];

/// Stateless photodiode triplet decoder.
#[derive(Debug, Clone, Copy)]
pub struct AwaDecoder {
    min_amplitude: f32,
}

impl Default for AwaDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_AMPLITUDE)
    }
}

impl AwaDecoder {
    pub fn new(min_amplitude: f32) -> Self {
        Self { min_amplitude }
    }

    /// Decode a raw sample into an angle in `[0, 2π)` radians.
    ///
    /// Returns `None` when the mean amplitude is below the configured
    /// minimum, which happens when the sensor is unplugged or dark.
    pub fn decode(&self, sample: PhotodiodeSample) -> Option<f32> {
        let amplitude =
            (f32::from(sample.red) + f32::from(sample.green) + f32::from(sample.blue)) / 3.0;
        if !(amplitude >= self.min_amplitude) {
            return None;
        }

        let r = normalize(sample.red, amplitude);
        let g = normalize(sample.green, amplitude);
        let b = normalize(sample.blue, amplitude);

        let coarse = if g < 0.0 && b >= 0.0 {
            red_0_180(r)
        } else if b < 0.0 && r >= 0.0 {
            green_120_300(g)
        } else {
            blue_240_060(b)
        };

        let zone = ((coarse / FRAC_PI_3) as usize).min(SUB_ZONES.len() - 1);
        let (red, green, blue) = SUB_ZONES[zone];

        Some(blend(
            (blue(b), weight(b)),
            (green(g), weight(g)),
            (red(r), weight(r)),
        ))
    }
}

/// Deviation from the mean amplitude, clamped to the arc sine domain.
fn normalize(adc: i16, amplitude: f32) -> f32 {
    (f32::from(adc) / amplitude - 1.0).clamp(-1.0, 1.0)
}

/// Highest near zero, floor of 1 so the weights never sum to zero.
fn weight(v: f32) -> f32 {
    ((1.0 - v.abs()) * 10.0).max(1.0)
}

/// Weighted mean of the per-channel estimates with the 0/2π seam resolved
/// by unwrapping green next to blue and red next to green.
fn blend(blue: (f32, f32), green: (f32, f32), red: (f32, f32)) -> f32 {
    let (angle_b, w_b) = blue;
    let (mut angle_g, w_g) = green;
    let (mut angle_r, w_r) = red;

    if angle_g - angle_b > PI {
        angle_g -= TAU;
    } else if angle_b - angle_g > PI {
        angle_g += TAU;
    }

    if angle_r - angle_g > PI {
        angle_r -= TAU;
    } else if angle_g - angle_r > PI {
        angle_r += TAU;
    }

    wrap_two_pi((w_b * angle_b + w_g * angle_g + w_r * angle_r) / (w_b + w_g + w_r))
}

fn red_0_180(x: f32) -> f32 {
    wrap_two_pi(x.asin() + FRAC_PI_2)
}

fn red_180_360(x: f32) -> f32 {
    wrap_two_pi(-x.asin() - FRAC_PI_2)
}

fn green_120_300(x: f32) -> f32 {
    wrap_two_pi(x.asin() - 5.0 * FRAC_PI_6)
}

fn green_300_120(x: f32) -> f32 {
    wrap_two_pi(-x.asin() + FRAC_PI_6)
}

fn blue_060_240(x: f32) -> f32 {
    wrap_two_pi(-x.asin() + 5.0 * FRAC_PI_6)
}

fn blue_240_060(x: f32) -> f32 {
    wrap_two_pi(x.asin() - FRAC_PI_6)
}
