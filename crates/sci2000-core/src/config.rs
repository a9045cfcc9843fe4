//! Node configuration.
//!
//! One JSON document describes what a node publishes and how it converts
//! raw sensor data. Every field has a default so a partial document (or
//! none at all) yields a working wind + speed + attitude node.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::awa::DEFAULT_MIN_AMPLITUDE;
use crate::calibration::CommandPolicy;
use crate::deviation::MagneticDeviation;
use crate::pulse::{PulseSpeedConverter, PULSE_RECEIVE_TIMEOUT};
use crate::schedule::{MessageGroup, ScheduleConfig};
use crate::store::SignalTimeouts;

/// Manufacturer code registered for the node family.
pub const SCI_MANUFACTURER_CODE: u16 = 2020;

/// NMEA 2000 industry group: Marine.
pub const MARINE_INDUSTRY_CODE: u8 = 4;

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeConfig {
    pub identity: IdentityConfig,
    pub groups: GroupsConfig,
    pub schedules: ScheduleConfig,
    pub timeouts: SignalTimeouts,
    pub wind: WindConfig,
    pub water: WaterConfig,
    /// Compass deviation model; `None` publishes raw heading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deviation: Option<MagneticDeviation>,
    pub command_policy: CommandPolicy,
    pub pulse_counter: PulseCounterConfig,
}

impl NodeConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.manufacturer_code > 0x7FF {
            return Err(ConfigError::InvalidValue {
                field: "identity.manufacturerCode",
                reason: format!("{} does not fit in 11 bits", self.identity.manufacturer_code),
            });
        }
        if self.identity.industry_code > 0x07 {
            return Err(ConfigError::InvalidValue {
                field: "identity.industryCode",
                reason: format!("{} does not fit in 3 bits", self.identity.industry_code),
            });
        }
        for group in self.groups.enabled() {
            if self.schedules.spec(group).period_ms == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "schedules",
                    reason: format!("{} period must be positive", group),
                });
            }
        }
        if self.pulse_counter.pulses_per_capture == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pulseCounter.pulsesPerCapture",
                reason: "must be positive".to_string(),
            });
        }
        let speed_timeout_ms = self.timeouts.wind_speed_ms.min(self.timeouts.water_speed_ms);
        if self.pulse_counter.receive_timeout_ms >= speed_timeout_ms {
            return Err(ConfigError::InvalidValue {
                field: "pulseCounter.receiveTimeoutMs",
                reason: format!(
                    "{} ms must be below the speed signal timeout of {} ms",
                    self.pulse_counter.receive_timeout_ms, speed_timeout_ms
                ),
            });
        }
        Ok(())
    }
}

/// Identity used for proprietary PGN gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityConfig {
    pub manufacturer_code: u16,
    pub industry_code: u8,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            manufacturer_code: SCI_MANUFACTURER_CODE,
            industry_code: MARINE_INDUSTRY_CODE,
        }
    }
}

/// Which message groups this node publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupsConfig {
    pub heading: bool,
    pub attitude: bool,
    pub wind: bool,
    pub water_speed: bool,
    pub gnss: bool,
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            heading: true,
            attitude: true,
            wind: true,
            water_speed: true,
            gnss: false,
        }
    }
}

impl GroupsConfig {
    pub fn enabled(&self) -> Vec<MessageGroup> {
        [
            (self.heading, MessageGroup::Heading),
            (self.attitude, MessageGroup::Attitude),
            (self.wind, MessageGroup::Wind),
            (self.water_speed, MessageGroup::WaterSpeed),
            (self.gnss, MessageGroup::Gnss),
        ]
        .into_iter()
        .filter_map(|(on, group)| on.then_some(group))
        .collect()
    }
}

/// Masthead unit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindConfig {
    /// Cutoff of the wind angle low-pass filter.
    pub awa_cutoff_hz: f32,
    /// Photodiode samples with a lower mean are treated as no sensor.
    pub min_amplitude: f32,
    pub speed: PulseSpeedConverter,
    /// Also publish true wind when boat speed is known.
    pub publish_true_wind: bool,
}

impl Default for WindConfig {
    fn default() -> Self {
        Self {
            awa_cutoff_hz: 1.0,
            min_amplitude: DEFAULT_MIN_AMPLITUDE,
            speed: PulseSpeedConverter::ANEMOMETER,
            publish_true_wind: true,
        }
    }
}

/// Paddle-wheel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaterConfig {
    pub speed: PulseSpeedConverter,
}

impl Default for WaterConfig {
    fn default() -> Self {
        Self {
            speed: PulseSpeedConverter::PADDLE_WHEEL,
        }
    }
}

/// Pulse-counting worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PulseCounterConfig {
    /// Pulses between two captures (hardware prescaler).
    pub pulses_per_capture: u32,
    /// Silence after which the sensor is reported stopped.
    pub receive_timeout_ms: u64,
    /// Cutoff of the frequency low-pass filter.
    pub cutoff_hz: f32,
}

impl Default for PulseCounterConfig {
    fn default() -> Self {
        Self {
            pulses_per_capture: 1,
            receive_timeout_ms: PULSE_RECEIVE_TIMEOUT.as_millis() as u64,
            cutoff_hz: 1.0,
        }
    }
}
