//! True wind from apparent wind and boat speed.
//!
//! With apparent speed `A`, apparent angle `β` (clockwise from the bow) and
//! boat speed `V`, the law of cosines gives
//!
//! ```text
//! W² = A² + V² - 2·A·V·cos(β)
//! α  = acos((A·cos(β) - V) / W)
//! ```
//!
//! `acos` only yields starboard angles, so the result is mirrored to port
//! when the apparent wind is on the port side.

use std::f32::consts::{PI, TAU};

use thiserror::Error;

use crate::angle::wrap_two_pi;

/// Below this `W²` the true wind is indistinguishable from the boat's own
/// motion and the apparent values are returned unchanged.
pub const MIN_TRUE_SPEED_SQUARED: f32 = 1.0;

/// Rounding slack allowed on the arc-cosine argument before it is rejected.
const RATIO_TOLERANCE: f32 = 1e-4;

/// Wind speed and angle. Angle in radians, `[0, 2π)`, speed in the caller's units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wind {
    pub speed: f32,
    pub angle: f32,
}

/// Reasons the solver refuses its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TrueWindError {
    #[error("True wind speed squared is negative: {0}")]
    NegativeSpeedSquared(f32),

    #[error("Arc-cosine argument out of range: {0}")]
    RatioOutOfRange(f32),

    #[error("Non-finite input")]
    NonFinite,
}

/// Solve the wind triangle. Speeds must share a unit.
pub fn compute_true_wind(apparent: Wind, boat_speed: f32) -> Result<Wind, TrueWindError> {
    if !(apparent.speed.is_finite() && apparent.angle.is_finite() && boat_speed.is_finite()) {
        return Err(TrueWindError::NonFinite);
    }

    let a = apparent.speed;
    let beta = wrap_two_pi(apparent.angle);
    let v = boat_speed;

    let w2 = a * a + v * v - 2.0 * a * v * beta.cos();
    if w2 < 0.0 {
        return Err(TrueWindError::NegativeSpeedSquared(w2));
    }
    if w2 < MIN_TRUE_SPEED_SQUARED {
        return Ok(Wind { speed: a, angle: beta });
    }

    let w = w2.sqrt();
    let ratio = (a * beta.cos() - v) / w;
    if ratio.abs() > 1.0 + RATIO_TOLERANCE {
        return Err(TrueWindError::RatioOutOfRange(ratio));
    }

    let mut alpha = ratio.clamp(-1.0, 1.0).acos();
    if beta > PI {
        alpha = TAU - alpha;
    }

    Ok(Wind {
        speed: w,
        angle: wrap_two_pi(alpha),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Inverse relation: apparent wind is true wind plus the headwind the
    /// boat makes by moving forward.
    fn reconstruct_apparent(truth: Wind, boat_speed: f32) -> Wind {
        let x = truth.speed * truth.angle.cos() + boat_speed;
        let y = truth.speed * truth.angle.sin();
        Wind {
            speed: (x * x + y * y).sqrt(),
            angle: wrap_two_pi(y.atan2(x)),
        }
    }

    #[test]
    fn test_round_trip_starboard() {
        let apparent = Wind {
            speed: 12.0,
            angle: 45f32.to_radians(),
        };
        let truth = compute_true_wind(apparent, 5.0).unwrap();
        assert!(truth.speed < apparent.speed);
        assert!(truth.angle > apparent.angle, "true wind must be further aft");

        let back = reconstruct_apparent(truth, 5.0);
        assert!((back.speed - apparent.speed).abs() < 1e-3, "speed {}", back.speed);
        assert!((back.angle - apparent.angle).abs() < 1e-3, "angle {}", back.angle);
    }

    #[test]
    fn test_round_trip_port() {
        let apparent = Wind {
            speed: 12.0,
            angle: 315f32.to_radians(),
        };
        let truth = compute_true_wind(apparent, 5.0).unwrap();
        assert!(truth.angle > PI, "must stay on port tack: {}", truth.angle);

        let back = reconstruct_apparent(truth, 5.0);
        assert!((back.speed - apparent.speed).abs() < 1e-3);
        assert!((back.angle - apparent.angle).abs() < 1e-3);
    }

    #[test]
    fn test_known_values() {
        let truth = compute_true_wind(
            Wind {
                speed: 12.0,
                angle: 45f32.to_radians(),
            },
            5.0,
        )
        .unwrap();
        assert!((truth.speed - 9.1733).abs() < 1e-3, "speed {}", truth.speed);
        assert!((truth.angle.to_degrees() - 67.67).abs() < 0.05, "angle {}", truth.angle.to_degrees());
    }

    #[test]
    fn test_stationary_boat() {
        let apparent = Wind {
            speed: 8.0,
            angle: 2.0,
        };
        let truth = compute_true_wind(apparent, 0.0).unwrap();
        assert!((truth.speed - 8.0).abs() < 1e-5);
        assert!((truth.angle - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_degenerate_returns_apparent() {
        // Motoring at 6 kn in still air: apparent is 6 kn on the nose
        let apparent = Wind {
            speed: 6.0,
            angle: 0.0,
        };
        let truth = compute_true_wind(apparent, 6.2).unwrap();
        assert_eq!(truth, apparent);
    }

    #[test]
    fn test_head_to_wind_is_not_rejected_by_rounding() {
        let truth = compute_true_wind(
            Wind {
                speed: 12.0,
                angle: 0.0,
            },
            5.0,
        )
        .unwrap();
        assert!((truth.speed - 7.0).abs() < 1e-4);
        assert!(truth.angle < 1e-2 || truth.angle > TAU - 1e-2);
    }

    #[test]
    fn test_non_finite_fails_cleanly() {
        let apparent = Wind {
            speed: f32::NAN,
            angle: 0.0,
        };
        assert_eq!(compute_true_wind(apparent, 5.0), Err(TrueWindError::NonFinite));
    }
}
