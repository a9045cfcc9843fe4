//! Proprietary calibration PGNs 130900 (masthead unit), 130901 (speed) and
//! 130902 (attitude).
//!
//! A report carries a sequence id, the proprietary header word and then one
//! (field number, signed 16-bit value) entry per calibration value.

use crate::group_function::ProprietaryIdentity;
use crate::n2k::{DecodeError, N2kMessage};

pub const PGN_MHU_CALIBRATION: u32 = 130900;
pub const PGN_SPEED_CALIBRATION: u32 = 130901;
pub const PGN_IMU_CALIBRATION: u32 = 130902;

/// Priority of calibration replies.
pub const CALIBRATION_PRIORITY: u8 = 2;

/// Calibration report sent in reply to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationReport {
    pub pgn: u32,
    pub sequence_id: u8,
    pub header: u16,
    pub fields: Vec<(u8, i16)>,
}

impl CalibrationReport {
    pub fn new(pgn: u32, sequence_id: u8, identity: &ProprietaryIdentity) -> Self {
        Self {
            pgn,
            sequence_id,
            header: identity.header(),
            fields: Vec::new(),
        }
    }

    pub fn push(&mut self, field: u8, value: i16) -> &mut Self {
        self.fields.push((field, value));
        self
    }

    pub fn field(&self, number: u8) -> Option<i16> {
        self.fields
            .iter()
            .find(|(n, _)| *n == number)
            .map(|(_, v)| *v)
    }

    /// Manufacturer code from the header word.
    pub fn manufacturer_code(&self) -> u16 {
        self.header & 0x7FF
    }

    pub fn industry_code(&self) -> u8 {
        (self.header >> 13) as u8
    }

    pub fn encode(&self, destination: u8) -> N2kMessage {
        let mut msg = N2kMessage::new(self.pgn, CALIBRATION_PRIORITY).with_destination(destination);
        msg.add_byte(self.sequence_id).add_u16(self.header);
        for &(field, value) in &self.fields {
            msg.add_byte(field).add_i16(value);
        }
        msg
    }

    pub fn decode(msg: &N2kMessage) -> Result<Self, DecodeError> {
        if !matches!(
            msg.pgn,
            PGN_MHU_CALIBRATION | PGN_SPEED_CALIBRATION | PGN_IMU_CALIBRATION
        ) {
            return Err(DecodeError::UnexpectedPgn(msg.pgn));
        }
        let mut r = msg.reader();
        let sequence_id = r.read_u8()?;
        let header = r.read_u16()?;
        let mut fields = Vec::new();
        while r.remaining() > 0 {
            let field = r.read_u8()?;
            fields.push((field, r.read_i16()?));
        }
        Ok(Self {
            pgn: msg.pgn,
            sequence_id,
            header,
            fields,
        })
    }
}
