//! First-order low-pass filter for linear and circular quantities.
//!
//! The smoothing factor is derived from a cutoff frequency and the time
//! elapsed since the previous sample:
//!
//! ```text
//! tc    = 1 / (2π · fc)
//! alpha = dt / (dt + tc)
//! y     = y + alpha · (x - y)
//! ```
//!
//! For angles the innovation `x - y` is wrapped into `(-π, π]` first and the
//! output is normalised into `[0, 2π)`, so a signal hovering around north
//! does not get dragged through south.

use std::f32::consts::TAU;

use crate::angle::{wrap_pi, wrap_two_pi};

/// Exponential smoothing filter with a cutoff frequency.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    time_constant: f32,
    state: Option<f32>,
}

impl LowPassFilter {
    /// Create a filter with the given cutoff frequency in Hz.
    ///
    /// A non-positive cutoff disables smoothing: every sample passes through.
    pub fn new(cutoff_hz: f32) -> Self {
        let time_constant = if cutoff_hz > 0.0 {
            1.0 / (TAU * cutoff_hz)
        } else {
            0.0
        };
        Self {
            time_constant,
            state: None,
        }
    }

    /// Current filtered value, `None` until the first sample.
    pub fn value(&self) -> Option<f32> {
        self.state
    }

    /// Forget the filter state; the next sample re-initialises it.
    pub fn reset(&mut self) {
        self.state = None;
    }

    fn alpha(&self, dt_sec: f32) -> f32 {
        if dt_sec <= 0.0 {
            return 0.0;
        }
        dt_sec / (dt_sec + self.time_constant)
    }

    /// Filter a linear quantity.
    pub fn filter(&mut self, sample: f32, dt_sec: f32) -> f32 {
        let next = match self.state {
            None => sample,
            Some(prev) => prev + self.alpha(dt_sec) * (sample - prev),
        };
        self.state = Some(next);
        next
    }

    /// Filter an angle in radians. The result is in `[0, 2π)`.
    pub fn filter_angle(&mut self, sample: f32, dt_sec: f32) -> f32 {
        let next = match self.state {
            None => wrap_two_pi(sample),
            Some(prev) => {
                let delta = wrap_pi(sample - prev);
                wrap_two_pi(prev + self.alpha(dt_sec) * delta)
            }
        };
        self.state = Some(next);
        next
    }
}
