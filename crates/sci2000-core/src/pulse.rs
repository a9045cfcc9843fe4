//! Pulse timing and pulse-frequency to speed conversion.
//!
//! Anemometer cups and paddle wheels produce a pulse train whose frequency
//! is proportional to speed. The capture side only differences timestamps;
//! frequency, filtering and unit conversion happen in the counting worker
//! and the engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// With no pulses for this long the sensor is reported as stopped. Kept
/// below the speed signals' staleness timeout so the zero reading lands
/// before the last speed goes stale.
pub const PULSE_RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

const KNOTS_TO_MPS: f32 = 1852.0 / 3600.0;

/// Knots to metres per second.
pub fn knots_to_mps(knots: f32) -> f32 {
    knots * KNOTS_TO_MPS
}

/// Interrupt-side timestamp differencing.
///
/// Keeps only the previous capture time; `on_edge` does no allocation and no
/// floating point so it is safe to call from a capture interrupt.
#[derive(Debug, Clone, Default)]
pub struct InterPulseTimer {
    last_capture_us: Option<u64>,
}

impl InterPulseTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a capture and return microseconds since the previous one.
    ///
    /// The first capture only arms the timer.
    pub fn on_edge(&mut self, now_us: u64) -> Option<u64> {
        let elapsed = self.last_capture_us.map(|last| now_us.wrapping_sub(last));
        self.last_capture_us = Some(now_us);
        elapsed.filter(|&e| e > 0)
    }
}

/// Frequency in Hz for `pulses` pulses observed over `elapsed_us`.
pub fn pulse_frequency_hz(pulses: u32, elapsed_us: u64) -> f32 {
    if elapsed_us == 0 {
        return 0.0;
    }
    (f64::from(pulses) * 1_000_000.0 / elapsed_us as f64) as f32
}

/// Affine pulse-frequency to speed calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseSpeedConverter {
    /// Knots per Hz.
    pub knots_per_hz: f32,
    /// Knots added once the sensor is turning.
    pub offset_knots: f32,
    /// Frequencies below this are a stationary sensor.
    pub min_hz: f32,
}

impl PulseSpeedConverter {
    /// Cup anemometer: 1 Hz = 2.25 mph.
    pub const ANEMOMETER: Self = Self {
        knots_per_hz: 1.955,
        offset_knots: 0.0,
        min_hz: 0.1,
    };

    /// Paddle wheel: 4.8 Hz per knot.
    pub const PADDLE_WHEEL: Self = Self {
        knots_per_hz: 1.0 / 4.8,
        offset_knots: 0.0,
        min_hz: 0.5,
    };

    /// Speed in knots. A stationary sensor reads exactly zero.
    pub fn speed_knots(&self, hz: f32) -> f32 {
        if !(hz >= self.min_hz) {
            return 0.0;
        }
        (self.knots_per_hz * hz + self.offset_knots).max(0.0)
    }
}
