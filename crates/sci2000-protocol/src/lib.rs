//! # sci2000-protocol
//!
//! Wire formats spoken by the sci2000 bridge nodes.
//!
//! This crate provides:
//! - The NMEA 2000 message builder/reader and 29-bit CAN identifiers
//! - Encoders for the standard PGNs the nodes publish
//! - PGN 126208 group function decoding and proprietary identity gating
//! - The proprietary calibration report layout (PGNs 130900-130902)
//! - SLIP framing and tunnelled CAN frames for the side channel
//! - The UBX parser used by the GNSS node

pub mod calibration_pgn;
pub mod frame;
pub mod group_function;
pub mod n2k;
pub mod pgn;
pub mod slip;
pub mod ubx;

pub use calibration_pgn::{CalibrationReport, PGN_IMU_CALIBRATION, PGN_MHU_CALIBRATION, PGN_SPEED_CALIBRATION};
pub use frame::{CanFrame, FrameError};
pub use group_function::{
    decode_group_function, match_identity, proprietary_field_width, FieldPair, GatingError, GroupFunction,
    ProprietaryIdentity,
};
pub use n2k::{CanId, DecodeError, N2kMessage, N2kReader};
pub use slip::SlipDecoder;
pub use ubx::{UbxAck, UbxMessage, UbxParser};
