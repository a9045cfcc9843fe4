//! Calibration values and their persistent storage.
//!
//! Calibration corrections are stored as signed 16-bit fixed point values
//! under short keys in a key-value store supplied by the platform:
//! - Linux: a JSON file
//! - Firmware: NVS (non-volatile storage)
//!
//! [`CalibrationStore`] wraps the platform storage with an in-memory cache.
//! The cache is filled once at start-up and every write is followed by a
//! read-back of the same key, so the cache always reflects what storage
//! actually holds. Storage failures are never fatal: the affected axis falls
//! back to its compiled-in default.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Command value meaning "restore the default" under [`CommandPolicy::Sentinel`].
pub const RESTORE_DEFAULT: u16 = 0xFFFE;

/// Command value meaning "leave unchanged" under [`CommandPolicy::Sentinel`].
pub const LEAVE_UNCHANGED: u16 = 0xFFFF;

/// Factor value for 100.00 %.
pub const UNITY_FACTOR: i16 = 10_000;

/// Errors from the platform key-value storage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    /// The key has never been written.
    #[error("Calibration key not found: {0}")]
    NotFound(String),

    /// Failed to read a value.
    #[error("Read error: {0}")]
    Read(String),

    /// Failed to write a value.
    #[error("Write error: {0}")]
    Write(String),

    /// Failed to commit pending writes.
    #[error("Commit error: {0}")]
    Commit(String),
}

/// Platform key-value storage for calibration values.
///
/// All methods are synchronous; calibration writes are rare and happen
/// inside the engine loop.
pub trait CalibrationStorage: Send {
    /// Read the value stored under `key`.
    fn read(&self, key: &str) -> Result<i16, StorageError>;

    /// Stage a value under `key`. Not durable until [`commit`](Self::commit).
    fn write(&mut self, key: &str, value: i16) -> Result<(), StorageError>;

    /// Make staged writes durable.
    fn commit(&mut self) -> Result<(), StorageError>;
}

/// In-memory storage, used by tests and nodes without persistent storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryCalibrationStorage {
    values: HashMap<String, i16>,
}

impl MemoryCalibrationStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with `(key, value)` pairs.
    pub fn with_values<'a>(values: impl IntoIterator<Item = (&'a str, i16)>) -> Self {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<i16> {
        self.values.get(key).copied()
    }
}

impl CalibrationStorage for MemoryCalibrationStorage {
    fn read(&self, key: &str) -> Result<i16, StorageError> {
        self.values
            .get(key)
            .copied()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn write(&mut self, key: &str, value: i16) -> Result<(), StorageError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

// ============================================================================
// Calibration axes
// ============================================================================

/// Unit of a stored calibration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationUnit {
    /// Additive angle offset in 0.01°.
    HundredthsOfDegree,
    /// Multiplicative factor in 0.01 %, 10000 = 1.0.
    HundredthsOfPercent,
}

/// One calibrated quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CalibrationAxis {
    /// Apparent wind angle offset.
    AwaOffset,
    /// Apparent wind speed factor.
    AwsFactor,
    /// Speed over water factor.
    SowFactor,
    /// Heading offset.
    HeadingOffset,
    PitchOffset,
    RollOffset,
}

impl CalibrationAxis {
    pub const ALL: [CalibrationAxis; 6] = [
        CalibrationAxis::AwaOffset,
        CalibrationAxis::AwsFactor,
        CalibrationAxis::SowFactor,
        CalibrationAxis::HeadingOffset,
        CalibrationAxis::PitchOffset,
        CalibrationAxis::RollOffset,
    ];

    /// Storage key.
    pub fn key(self) -> &'static str {
        match self {
            CalibrationAxis::AwaOffset => "awa",
            CalibrationAxis::AwsFactor => "aws",
            CalibrationAxis::SowFactor => "sow",
            CalibrationAxis::HeadingOffset => "hdg",
            CalibrationAxis::PitchOffset => "pitch",
            CalibrationAxis::RollOffset => "roll",
        }
    }

    pub fn unit(self) -> CalibrationUnit {
        match self {
            CalibrationAxis::AwsFactor | CalibrationAxis::SowFactor => {
                CalibrationUnit::HundredthsOfPercent
            }
            _ => CalibrationUnit::HundredthsOfDegree,
        }
    }

    /// Compiled-in default: no offset, unity factor.
    pub fn default_value(self) -> i16 {
        match self.unit() {
            CalibrationUnit::HundredthsOfDegree => 0,
            CalibrationUnit::HundredthsOfPercent => UNITY_FACTOR,
        }
    }
}

impl fmt::Display for CalibrationAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ============================================================================
// Command interpretation
// ============================================================================

/// How raw command values are interpreted.
///
/// A node uses exactly one policy, fixed by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandPolicy {
    /// 0xFFFE restores the default, 0xFFFF leaves the value unchanged,
    /// everything else is stored as a signed value.
    #[default]
    Sentinel,
    /// Every value is stored as a signed value.
    Literal,
}

/// What a command asks for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationUpdate {
    Set(i16),
    RestoreDefault,
    Unchanged,
}

impl CommandPolicy {
    pub fn interpret(self, raw: u16) -> CalibrationUpdate {
        match (self, raw) {
            (CommandPolicy::Sentinel, RESTORE_DEFAULT) => CalibrationUpdate::RestoreDefault,
            (CommandPolicy::Sentinel, LEAVE_UNCHANGED) => CalibrationUpdate::Unchanged,
            _ => CalibrationUpdate::Set(raw as i16),
        }
    }
}

// ============================================================================
// Cached values
// ============================================================================

/// Snapshot of every calibration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationValues {
    pub awa_offset: i16,
    pub aws_factor: i16,
    pub sow_factor: i16,
    pub heading_offset: i16,
    pub pitch_offset: i16,
    pub roll_offset: i16,
}

impl Default for CalibrationValues {
    fn default() -> Self {
        let mut values = Self {
            awa_offset: 0,
            aws_factor: 0,
            sow_factor: 0,
            heading_offset: 0,
            pitch_offset: 0,
            roll_offset: 0,
        };
        for axis in CalibrationAxis::ALL {
            values.set(axis, axis.default_value());
        }
        values
    }
}

impl CalibrationValues {
    pub fn get(&self, axis: CalibrationAxis) -> i16 {
        match axis {
            CalibrationAxis::AwaOffset => self.awa_offset,
            CalibrationAxis::AwsFactor => self.aws_factor,
            CalibrationAxis::SowFactor => self.sow_factor,
            CalibrationAxis::HeadingOffset => self.heading_offset,
            CalibrationAxis::PitchOffset => self.pitch_offset,
            CalibrationAxis::RollOffset => self.roll_offset,
        }
    }

    pub fn set(&mut self, axis: CalibrationAxis, value: i16) {
        let slot = match axis {
            CalibrationAxis::AwaOffset => &mut self.awa_offset,
            CalibrationAxis::AwsFactor => &mut self.aws_factor,
            CalibrationAxis::SowFactor => &mut self.sow_factor,
            CalibrationAxis::HeadingOffset => &mut self.heading_offset,
            CalibrationAxis::PitchOffset => &mut self.pitch_offset,
            CalibrationAxis::RollOffset => &mut self.roll_offset,
        };
        *slot = value;
    }

    /// Angle offset in degrees.
    pub fn offset_deg(&self, axis: CalibrationAxis) -> f32 {
        f32::from(self.get(axis)) / 100.0
    }

    /// Multiplicative factor, 1.0 for 100 %.
    pub fn factor(&self, axis: CalibrationAxis) -> f32 {
        f32::from(self.get(axis)) / f32::from(UNITY_FACTOR)
    }
}

// ============================================================================
// Store adapter
// ============================================================================

/// Typed calibration access on top of a platform storage.
#[derive(Debug)]
pub struct CalibrationStore<S> {
    storage: S,
    cache: CalibrationValues,
}

impl<S: CalibrationStorage> CalibrationStore<S> {
    /// Wrap `storage` and load every axis into the cache.
    pub fn new(storage: S) -> Self {
        let mut store = Self {
            storage,
            cache: CalibrationValues::default(),
        };
        for axis in CalibrationAxis::ALL {
            store.reload(axis);
        }
        info!(values = ?store.cache, "Calibration loaded");
        store
    }

    /// Cached values.
    pub fn values(&self) -> &CalibrationValues {
        &self.cache
    }

    pub fn get(&self, axis: CalibrationAxis) -> i16 {
        self.cache.get(axis)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Apply a decoded command to one axis and return the cached value
    /// afterwards.
    pub fn apply(&mut self, axis: CalibrationAxis, update: CalibrationUpdate) -> i16 {
        let value = match update {
            CalibrationUpdate::Unchanged => {
                debug!(%axis, "Calibration left unchanged");
                return self.cache.get(axis);
            }
            CalibrationUpdate::RestoreDefault => axis.default_value(),
            CalibrationUpdate::Set(v) => v,
        };

        if let Err(e) = self.persist(axis, value) {
            warn!(%axis, value, error = %e, "Failed to persist calibration");
        }
        self.reload(axis)
    }

    fn persist(&mut self, axis: CalibrationAxis, value: i16) -> Result<(), StorageError> {
        self.storage.write(axis.key(), value)?;
        self.storage.commit()
    }

    /// Re-read one axis from storage into the cache.
    fn reload(&mut self, axis: CalibrationAxis) -> i16 {
        let value = match self.storage.read(axis.key()) {
            Ok(v) => v,
            Err(StorageError::NotFound(_)) => axis.default_value(),
            Err(e) => {
                warn!(%axis, error = %e, "Calibration read failed, using default");
                axis.default_value()
            }
        };
        self.cache.set(axis, value);
        value
    }
}
