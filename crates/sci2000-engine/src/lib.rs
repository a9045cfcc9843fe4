//! # sci2000-engine
//!
//! The publication engine and its collaborators.
//!
//! This crate provides:
//! - Traits for the NMEA 2000 stack and the link indicator
//! - The generic calibration PGN handler driven by per-PGN field tables
//! - The publication engine and its event loop
//! - The pulse capture handoff and counting worker
//! - The side-channel CAN bridge

pub mod bridge;
pub mod bus;
pub mod calibration_handler;
pub mod engine;
pub mod pulse_counter;

pub use bridge::{encode_for_side_channel, SideChannelBridge, SideInterfaceBus};
pub use bus::{BusHealth, BusNotification, DeviceIdentity, DeviceIndex, LinkIndicator, N2kBus, NoIndicator};
pub use calibration_handler::{CalibrationPgnHandler, FieldTable, HandlerError, HandlerOutcome};
pub use engine::{Devices, PublicationEngine, EVENT_POLL_TIMEOUT};
pub use pulse_counter::{capture_channel, CaptureProducer, PulseCounter, CAPTURE_QUEUE_DEPTH};
