//! Angle wrapping helpers shared by the filters and encoders.

use std::f32::consts::{PI, TAU};

/// Wrap an angle in radians into `(-π, π]`.
pub fn wrap_pi(angle: f32) -> f32 {
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}

/// Wrap an angle in radians into `[0, 2π)`.
pub fn wrap_two_pi(angle: f32) -> f32 {
    let a = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if a >= TAU {
        0.0
    } else {
        a
    }
}

/// Wrap an angle in degrees into `[0, 360)`.
pub fn wrap_360(degrees: f32) -> f32 {
    let d = degrees.rem_euclid(360.0);
    if d >= 360.0 {
        0.0
    } else {
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_pi() {
        assert!((wrap_pi(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-6);
        assert!((wrap_pi(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-6);
        assert!((wrap_pi(PI) - PI).abs() < 1e-6);
        assert!((wrap_pi(0.25) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_wrap_two_pi() {
        assert!((wrap_two_pi(-0.1) - (TAU - 0.1)).abs() < 1e-5);
        assert!((wrap_two_pi(TAU + 0.1) - 0.1).abs() < 1e-5);
        assert!(wrap_two_pi(-1e-9) < TAU);
    }

    #[test]
    fn test_wrap_360() {
        assert_eq!(wrap_360(-10.0), 350.0);
        assert_eq!(wrap_360(370.0), 10.0);
        assert_eq!(wrap_360(0.0), 0.0);
    }
}
