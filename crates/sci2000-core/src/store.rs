//! Fusion store: the latest value of every fused quantity.
//!
//! Each quantity lives in a [`SignalRecord`] holding the last value, the
//! validity flag of the event that set it, and when it was last validly
//! updated. A record is only effectively valid while it is younger than its
//! signal's timeout; the value itself is kept when it goes stale so it can
//! still be inspected.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::event::{AttitudeReading, Event, EventPayload, GnssFix, PulseChannel};

/// Typical timeout for continuously polled sensors.
pub const DEFAULT_SIGNAL_TIMEOUT: Duration = Duration::from_secs(10);

/// A value read through the staleness rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Current<T> {
    pub value: T,
    pub valid: bool,
}

impl<T> Current<T> {
    /// The value if it is effectively valid.
    pub fn get(self) -> Option<T> {
        if self.valid {
            Some(self.value)
        } else {
            None
        }
    }
}

/// Last value, validity and update time of one quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRecord<T> {
    value: T,
    valid: bool,
    last_update: Option<Instant>,
}

impl<T: Copy> SignalRecord<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: initial,
            valid: false,
            last_update: None,
        }
    }

    /// Overwrite the record. The timestamp only moves on valid updates.
    pub fn update(&mut self, value: T, valid: bool, now: Instant) {
        self.value = value;
        self.valid = valid;
        if valid {
            self.last_update = Some(now);
        }
    }

    /// Value and effective validity at `now`.
    pub fn current(&self, now: Instant, timeout: Duration) -> Current<T> {
        let fresh = self
            .last_update
            .is_some_and(|t| now.saturating_duration_since(t) < timeout);
        Current {
            value: self.value,
            valid: self.valid && fresh,
        }
    }

    /// Last stored value regardless of validity.
    pub fn value(&self) -> T {
        self.value
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }
}

/// Per-signal staleness timeouts in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignalTimeouts {
    pub attitude_ms: u64,
    pub gnss_ms: u64,
    pub wind_angle_ms: u64,
    pub wind_speed_ms: u64,
    pub water_speed_ms: u64,
}

impl Default for SignalTimeouts {
    fn default() -> Self {
        let ms = DEFAULT_SIGNAL_TIMEOUT.as_millis() as u64;
        Self {
            attitude_ms: ms,
            gnss_ms: ms,
            wind_angle_ms: ms,
            wind_speed_ms: ms,
            water_speed_ms: ms,
        }
    }
}

/// Latest fused state of every sensor the node knows about.
///
/// Owned and mutated only by the publication engine.
#[derive(Debug, Clone)]
pub struct FusionStore {
    timeouts: SignalTimeouts,
    attitude: SignalRecord<AttitudeReading>,
    gnss: SignalRecord<GnssFix>,
    wind_angle: SignalRecord<f32>,
    wind_speed_hz: SignalRecord<f32>,
    water_speed_hz: SignalRecord<f32>,
}

impl Default for FusionStore {
    fn default() -> Self {
        Self::new(SignalTimeouts::default())
    }
}

impl FusionStore {
    pub fn new(timeouts: SignalTimeouts) -> Self {
        Self {
            timeouts,
            attitude: SignalRecord::new(AttitudeReading::default()),
            gnss: SignalRecord::new(GnssFix::default()),
            wind_angle: SignalRecord::new(0.0),
            wind_speed_hz: SignalRecord::new(0.0),
            water_speed_hz: SignalRecord::new(0.0),
        }
    }

    /// Apply an event to the record it feeds.
    ///
    /// Returns `false` for payloads that are not stored as-is: photodiode
    /// samples must be decoded first (see [`FusionStore::set_wind_angle`]) and
    /// bus availability drives the link indicator instead.
    pub fn update(&mut self, event: &Event, now: Instant) -> bool {
        match &event.payload {
            EventPayload::Attitude(reading) => self.attitude.update(*reading, event.valid, now),
            EventPayload::Gnss(fix) => self.gnss.update(*fix, event.valid, now),
            EventPayload::PulseFrequency {
                channel: PulseChannel::ApparentWindSpeed,
                hz,
            } => self.wind_speed_hz.update(*hz, event.valid, now),
            EventPayload::PulseFrequency {
                channel: PulseChannel::SpeedOverWater,
                hz,
            } => self.water_speed_hz.update(*hz, event.valid, now),
            _ => return false,
        }
        true
    }

    /// Store a decoded apparent wind angle in radians.
    pub fn set_wind_angle(&mut self, angle_rad: f32, valid: bool, now: Instant) {
        self.wind_angle.update(angle_rad, valid, now);
    }

    pub fn attitude(&self, now: Instant) -> Current<AttitudeReading> {
        self.attitude
            .current(now, Duration::from_millis(self.timeouts.attitude_ms))
    }

    pub fn gnss(&self, now: Instant) -> Current<GnssFix> {
        self.gnss.current(now, Duration::from_millis(self.timeouts.gnss_ms))
    }

    /// Apparent wind angle in radians, uncalibrated.
    pub fn wind_angle(&self, now: Instant) -> Current<f32> {
        self.wind_angle
            .current(now, Duration::from_millis(self.timeouts.wind_angle_ms))
    }

    /// Anemometer pulse frequency in Hz.
    pub fn wind_speed_hz(&self, now: Instant) -> Current<f32> {
        self.wind_speed_hz
            .current(now, Duration::from_millis(self.timeouts.wind_speed_ms))
    }

    /// Paddle-wheel pulse frequency in Hz.
    pub fn water_speed_hz(&self, now: Instant) -> Current<f32> {
        self.water_speed_hz
            .current(now, Duration::from_millis(self.timeouts.water_speed_ms))
    }

    /// Self-calibration state of the IMU from the last attitude event.
    pub fn imu_status_byte(&self) -> u8 {
        self.attitude.value().calibration.status_byte()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ImuCalibrationState, PhotodiodeSample};
    use pretty_assertions::assert_eq;

    fn reading(heading: f32) -> AttitudeReading {
        AttitudeReading {
            heading_deg: heading,
            pitch_deg: 1.0,
            roll_deg: -2.0,
            calibration: ImuCalibrationState::default(),
        }
    }

    #[test]
    fn test_record_starts_invalid() {
        let record = SignalRecord::new(0.0f32);
        let now = Instant::now();
        assert!(!record.current(now, DEFAULT_SIGNAL_TIMEOUT).valid);
    }

    #[test]
    fn test_staleness_keeps_last_value() {
        let mut store = FusionStore::default();
        let t0 = Instant::now();
        store.update(&Event::attitude(true, reading(123.0)), t0);

        let fresh = store.attitude(t0 + Duration::from_secs(9));
        assert!(fresh.valid);
        assert_eq!(fresh.value.heading_deg, 123.0);

        let stale = store.attitude(t0 + Duration::from_secs(10));
        assert!(!stale.valid);
        assert_eq!(stale.value.heading_deg, 123.0);
        assert_eq!(stale.get(), None);
    }

    #[test]
    fn test_every_signal_goes_stale() {
        let mut store = FusionStore::default();
        let t0 = Instant::now();
        store.update(&Event::attitude(true, reading(10.0)), t0);
        store.update(&Event::gnss(true, GnssFix::default()), t0);
        store.update(&Event::pulse(true, PulseChannel::ApparentWindSpeed, 3.0), t0);
        store.update(&Event::pulse(true, PulseChannel::SpeedOverWater, 7.0), t0);
        store.set_wind_angle(1.0, true, t0);

        let later = t0 + Duration::from_millis(10_001);
        assert!(!store.attitude(later).valid);
        assert!(!store.gnss(later).valid);
        assert!(!store.wind_speed_hz(later).valid);
        assert!(!store.water_speed_hz(later).valid);
        assert!(!store.wind_angle(later).valid);
        assert_eq!(store.wind_speed_hz(later).value, 3.0);
        assert_eq!(store.water_speed_hz(later).value, 7.0);
        assert_eq!(store.wind_angle(later).value, 1.0);
    }

    #[test]
    fn test_invalid_update_does_not_refresh() {
        let mut store = FusionStore::default();
        let t0 = Instant::now();
        store.update(&Event::pulse(true, PulseChannel::SpeedOverWater, 5.0), t0);

        let t1 = t0 + Duration::from_secs(1);
        store.update(&Event::pulse(false, PulseChannel::SpeedOverWater, 0.0), t1);
        assert!(!store.water_speed_hz(t1).valid);

        let t2 = t0 + Duration::from_secs(2);
        store.update(&Event::pulse(true, PulseChannel::SpeedOverWater, 6.0), t2);
        assert_eq!(store.water_speed_hz(t2).get(), Some(6.0));
    }

    #[test]
    fn test_custom_timeout() {
        let timeouts = SignalTimeouts {
            gnss_ms: 2_000,
            ..SignalTimeouts::default()
        };
        let mut store = FusionStore::new(timeouts);
        let t0 = Instant::now();
        store.update(&Event::gnss(true, GnssFix::default()), t0);
        assert!(store.gnss(t0 + Duration::from_millis(1_999)).valid);
        assert!(!store.gnss(t0 + Duration::from_millis(2_000)).valid);
    }

    #[test]
    fn test_unstored_payloads_are_ignored() {
        let mut store = FusionStore::default();
        let now = Instant::now();
        assert!(!store.update(&Event::bus_availability(true), now));
        assert!(!store.update(&Event::photodiode(true, PhotodiodeSample::default()), now));
    }
}
