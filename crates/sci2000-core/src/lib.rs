//! # sci2000-core
//!
//! Sensor fusion state and signal processing for the sci2000 bridge nodes.
//!
//! This crate provides:
//! - Typed sensor events (attitude, GNSS, pulse frequency, photodiode, bus state)
//! - The fusion store with per-signal validity and staleness tracking
//! - Transmission schedules for the published message groups
//! - The calibration store adapter and its key-value storage trait
//! - Signal processors: low-pass filters, photodiode wind-angle decoder,
//!   true-wind solver, magnetic deviation and pulse-to-speed conversion
//! - Node configuration types
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! so the same logic runs in the Linux host binary and on the node firmware.

pub mod angle;
pub mod awa;
pub mod calibration;
pub mod config;
pub mod deviation;
pub mod event;
pub mod filter;
pub mod pulse;
pub mod schedule;
pub mod store;
pub mod true_wind;

pub use calibration::{
    CalibrationAxis, CalibrationStorage, CalibrationStore, CalibrationUpdate, CalibrationValues,
    CommandPolicy, MemoryCalibrationStorage, StorageError,
};
pub use config::{ConfigError, NodeConfig};
pub use event::*;
pub use schedule::{MessageGroup, ScheduleSet, TransmitSchedule};
pub use store::{Current, FusionStore, SignalRecord};
