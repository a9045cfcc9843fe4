//! Sensor events delivered to the publication engine.
//!
//! Sensor workers never touch fusion state directly. Everything they learn
//! is wrapped in an [`Event`] and pushed into the engine's channel.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A sensor event: a validity flag and a source-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub valid: bool,
    pub payload: EventPayload,
}

/// Source-specific event data.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EventPayload {
    /// Heading, pitch and roll from the inertial unit.
    Attitude(AttitudeReading),
    /// Position/time/course/speed fix from the GNSS receiver.
    Gnss(GnssFix),
    /// Frequency measured by a pulse-counting worker.
    PulseFrequency { channel: PulseChannel, hz: f32 },
    /// Raw photodiode triplet from the masthead unit.
    Photodiode(PhotodiodeSample),
    /// CAN driver reports the bus came up or went down.
    BusAvailability { available: bool },
}

/// Which producer an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    Attitude,
    Gnss,
    ApparentWindSpeed,
    SpeedOverWater,
    ApparentWindAngle,
    Bus,
}

impl Event {
    pub fn attitude(valid: bool, reading: AttitudeReading) -> Self {
        Self {
            valid,
            payload: EventPayload::Attitude(reading),
        }
    }

    pub fn gnss(valid: bool, fix: GnssFix) -> Self {
        Self {
            valid,
            payload: EventPayload::Gnss(fix),
        }
    }

    pub fn pulse(valid: bool, channel: PulseChannel, hz: f32) -> Self {
        Self {
            valid,
            payload: EventPayload::PulseFrequency { channel, hz },
        }
    }

    pub fn photodiode(valid: bool, sample: PhotodiodeSample) -> Self {
        Self {
            valid,
            payload: EventPayload::Photodiode(sample),
        }
    }

    pub fn bus_availability(available: bool) -> Self {
        Self {
            valid: true,
            payload: EventPayload::BusAvailability { available },
        }
    }

    /// The producer of this event.
    pub fn source(&self) -> EventSource {
        match &self.payload {
            EventPayload::Attitude(_) => EventSource::Attitude,
            EventPayload::Gnss(_) => EventSource::Gnss,
            EventPayload::PulseFrequency {
                channel: PulseChannel::ApparentWindSpeed,
                ..
            } => EventSource::ApparentWindSpeed,
            EventPayload::PulseFrequency {
                channel: PulseChannel::SpeedOverWater,
                ..
            } => EventSource::SpeedOverWater,
            EventPayload::Photodiode(_) => EventSource::ApparentWindAngle,
            EventPayload::BusAvailability { .. } => EventSource::Bus,
        }
    }
}

/// Attitude solution in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AttitudeReading {
    pub heading_deg: f32,
    pub pitch_deg: f32,
    pub roll_deg: f32,
    pub calibration: ImuCalibrationState,
}

/// Self-calibration levels reported by the IMU, each 0 (none) to 3 (full).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImuCalibrationState {
    pub system: u8,
    pub gyro: u8,
    pub accel: u8,
    pub mag: u8,
}

impl ImuCalibrationState {
    /// Pack into a single status byte, two bits per sensor.
    pub fn status_byte(&self) -> u8 {
        (self.system & 0x03) << 6 | (self.gyro & 0x03) << 4 | (self.accel & 0x03) << 2 | (self.mag & 0x03)
    }

    pub fn from_status_byte(b: u8) -> Self {
        Self {
            system: (b >> 6) & 0x03,
            gyro: (b >> 4) & 0x03,
            accel: (b >> 2) & 0x03,
            mag: b & 0x03,
        }
    }
}

/// GNSS fix in engineering units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GnssFix {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    /// Course over ground, true, radians.
    pub cog_rad: Option<f32>,
    /// Speed over ground, m/s.
    pub sog_mps: Option<f32>,
    pub utc: Option<NaiveDateTime>,
}

/// Pulse-counter channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PulseChannel {
    ApparentWindSpeed,
    SpeedOverWater,
}

/// Raw ADC counts of the three wind-angle photodiodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhotodiodeSample {
    pub red: i16,
    pub green: i16,
    pub blue: i16,
}
