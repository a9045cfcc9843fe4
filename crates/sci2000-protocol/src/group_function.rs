//! PGN 126208 group function messages.
//!
//! Only the request (function code 0) and command (function code 1) forms
//! are decoded. Both carry a list of (field number, value) pairs addressed
//! to a target PGN; for the proprietary calibration PGNs the first two
//! pairs identify the manufacturer and industry.

use thiserror::Error;

use crate::n2k::{DecodeError, N2kMessage, N2kReader};
use crate::pgn::PGN_GROUP_FUNCTION;

/// Field number carrying the manufacturer code.
pub const FIELD_MANUFACTURER_CODE: u8 = 1;
/// Field number carrying the industry code.
pub const FIELD_INDUSTRY_CODE: u8 = 3;

/// Value width of a proprietary-PGN field: the industry code is one byte,
/// every other field two.
pub fn proprietary_field_width(field: u8) -> usize {
    if field == FIELD_INDUSTRY_CODE {
        1
    } else {
        2
    }
}

/// Group function codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    Request = 0,
    Command = 1,
    Acknowledge = 2,
}

/// One (field number, value) pair. Values are carried as raw unsigned
/// integers; their interpretation belongs to the target PGN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPair {
    pub field: u8,
    pub value: u16,
}

impl FieldPair {
    pub const fn new(field: u8, value: u16) -> Self {
        Self { field, value }
    }

    /// Value reinterpreted as a signed 16-bit quantity.
    pub fn as_i16(&self) -> i16 {
        self.value as i16
    }
}

/// Decoded group function message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupFunction {
    Request {
        pgn: u32,
        interval: u32,
        offset: u16,
        pairs: Vec<FieldPair>,
    },
    Command {
        pgn: u32,
        priority: u8,
        pairs: Vec<FieldPair>,
    },
}

impl GroupFunction {
    /// Target PGN.
    pub fn pgn(&self) -> u32 {
        match self {
            GroupFunction::Request { pgn, .. } | GroupFunction::Command { pgn, .. } => *pgn,
        }
    }

    pub fn pairs(&self) -> &[FieldPair] {
        match self {
            GroupFunction::Request { pairs, .. } | GroupFunction::Command { pairs, .. } => pairs,
        }
    }
}

/// Decode a PGN 126208 payload. `width` gives the value width in bytes for
/// each field number of the target PGN.
pub fn decode_group_function(
    data: &[u8],
    width: impl Fn(u8) -> usize,
) -> Result<GroupFunction, DecodeError> {
    let mut r = N2kReader::new(data);
    let code = r.read_u8()?;
    let pgn = r.read_u24()?;

    match code {
        c if c == FunctionCode::Request as u8 => {
            let interval = r.read_u32()?;
            let offset = r.read_u16()?;
            let pairs = read_pairs(&mut r, &width)?;
            Ok(GroupFunction::Request {
                pgn,
                interval,
                offset,
                pairs,
            })
        }
        c if c == FunctionCode::Command as u8 => {
            let priority = r.read_u8()? & 0x0F;
            let pairs = read_pairs(&mut r, &width)?;
            Ok(GroupFunction::Command {
                pgn,
                priority,
                pairs,
            })
        }
        other => Err(DecodeError::InvalidField {
            field: "function code",
            value: u32::from(other),
        }),
    }
}

fn read_pairs(r: &mut N2kReader<'_>, width: &impl Fn(u8) -> usize) -> Result<Vec<FieldPair>, DecodeError> {
    let count = r.read_u8()?;
    let mut pairs = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let field = r.read_u8()?;
        let value = r.read_uint(width(field))?;
        pairs.push(FieldPair::new(field, value as u16));
    }
    Ok(pairs)
}

/// Build a PGN 126208 request addressed to `destination`.
pub fn encode_request(
    pgn: u32,
    pairs: &[FieldPair],
    width: impl Fn(u8) -> usize,
    destination: u8,
) -> N2kMessage {
    let mut msg = N2kMessage::new(PGN_GROUP_FUNCTION, 3).with_destination(destination);
    msg.add_byte(FunctionCode::Request as u8)
        .add_u24(pgn)
        .add_u32(0xFFFF_FFFF)
        .add_u16(0xFFFF);
    write_pairs(&mut msg, pairs, &width);
    msg
}

/// Build a PGN 126208 command addressed to `destination`.
pub fn encode_command(
    pgn: u32,
    pairs: &[FieldPair],
    width: impl Fn(u8) -> usize,
    destination: u8,
) -> N2kMessage {
    let mut msg = N2kMessage::new(PGN_GROUP_FUNCTION, 3).with_destination(destination);
    msg.add_byte(FunctionCode::Command as u8)
        .add_u24(pgn)
        .add_byte(0xF8); // do not change priority
    write_pairs(&mut msg, pairs, &width);
    msg
}

fn write_pairs(msg: &mut N2kMessage, pairs: &[FieldPair], width: &impl Fn(u8) -> usize) {
    msg.add_byte(pairs.len() as u8);
    for pair in pairs {
        msg.add_byte(pair.field);
        match width(pair.field) {
            1 => msg.add_byte(pair.value as u8),
            _ => msg.add_u16(pair.value),
        };
    }
}

// ============================================================================
// Identity gating
// ============================================================================

/// Manufacturer and industry a proprietary PGN belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProprietaryIdentity {
    pub manufacturer_code: u16,
    pub industry_code: u8,
}

impl ProprietaryIdentity {
    pub const fn new(manufacturer_code: u16, industry_code: u8) -> Self {
        Self {
            manufacturer_code,
            industry_code,
        }
    }

    /// The two identity pairs that lead every proprietary request/command.
    pub fn pairs(&self) -> [FieldPair; 2] {
        [
            FieldPair::new(FIELD_MANUFACTURER_CODE, self.manufacturer_code),
            FieldPair::new(FIELD_INDUSTRY_CODE, u16::from(self.industry_code)),
        ]
    }

    /// Header word of proprietary fast-packet payloads.
    pub fn header(&self) -> u16 {
        (u16::from(self.industry_code) << 13) | (0b11 << 11) | (self.manufacturer_code & 0x7FF)
    }
}

/// Why a group function was not for us.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatingError {
    #[error("Expected at least 2 parameter pairs, got {0}")]
    TooFewPairs(usize),

    #[error("Manufacturer code {got} does not match {expected}")]
    ManufacturerMismatch { got: u16, expected: u16 },

    #[error("Industry code {got} does not match {expected}")]
    IndustryMismatch { got: u8, expected: u8 },

    #[error("Missing identity field {0}")]
    MissingField(u8),
}

/// Check the leading identity pairs (in either order) against `identity`.
/// On success returns the remaining pairs.
pub fn match_identity<'a>(
    pairs: &'a [FieldPair],
    identity: &ProprietaryIdentity,
) -> Result<&'a [FieldPair], GatingError> {
    if pairs.len() < 2 {
        return Err(GatingError::TooFewPairs(pairs.len()));
    }
    let (head, rest) = pairs.split_at(2);

    let find = |field: u8| {
        head.iter()
            .find(|p| p.field == field)
            .map(|p| p.value)
            .ok_or(GatingError::MissingField(field))
    };
    let mfg = find(FIELD_MANUFACTURER_CODE)?;
    let industry = find(FIELD_INDUSTRY_CODE)?;

    if mfg != identity.manufacturer_code {
        return Err(GatingError::ManufacturerMismatch {
            got: mfg,
            expected: identity.manufacturer_code,
        });
    }
    if industry != u16::from(identity.industry_code) {
        return Err(GatingError::IndustryMismatch {
            got: industry as u8,
            expected: identity.industry_code,
        });
    }
    Ok(rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCI: ProprietaryIdentity = ProprietaryIdentity::new(2020, 4);

    #[test]
    fn test_decode_request() {
        // function 0, PGN 130900, interval, offset, 2 pairs
        let data = [
            0x00, 0x54, 0xFF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02, 0x01, 0xE4, 0x07,
            0x03, 0x04,
        ];
        let gf = decode_group_function(&data, proprietary_field_width).unwrap();
        assert_eq!(
            gf,
            GroupFunction::Request {
                pgn: 130900,
                interval: 0xFFFF_FFFF,
                offset: 0xFFFF,
                pairs: vec![FieldPair::new(1, 2020), FieldPair::new(3, 4)],
            }
        );
    }

    #[test]
    fn test_decode_command_with_negative_value() {
        let pairs = [SCI.pairs()[0], SCI.pairs()[1], FieldPair::new(4, (-150i16) as u16)];
        let msg = encode_command(130902, &pairs, proprietary_field_width, 0x23);
        assert_eq!(msg.destination, 0x23);

        let gf = decode_group_function(&msg.data, proprietary_field_width).unwrap();
        assert_eq!(gf.pgn(), 130902);
        assert!(matches!(gf, GroupFunction::Command { priority: 8, .. }));
        assert_eq!(gf.pairs()[2].as_i16(), -150);
    }

    #[test]
    fn test_truncated_pairs() {
        let msg = encode_request(130900, &SCI.pairs(), proprietary_field_width, 0x23);
        let short = &msg.data[..msg.data.len() - 1];
        assert!(matches!(
            decode_group_function(short, proprietary_field_width),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_unknown_function_code() {
        let data = [0x05, 0x54, 0xFF, 0x01, 0x00];
        assert!(matches!(
            decode_group_function(&data, proprietary_field_width),
            Err(DecodeError::InvalidField { value: 5, .. })
        ));
    }

    #[test]
    fn test_gating_accepts_either_order() {
        let pairs = [FieldPair::new(3, 4), FieldPair::new(1, 2020), FieldPair::new(4, 10)];
        let rest = match_identity(&pairs, &SCI).unwrap();
        assert_eq!(rest, &[FieldPair::new(4, 10)]);
    }

    #[test]
    fn test_gating_rejections() {
        assert_eq!(
            match_identity(&[FieldPair::new(1, 2020)], &SCI),
            Err(GatingError::TooFewPairs(1))
        );
        assert_eq!(
            match_identity(&[FieldPair::new(1, 2021), FieldPair::new(3, 4)], &SCI),
            Err(GatingError::ManufacturerMismatch {
                got: 2021,
                expected: 2020
            })
        );
        assert_eq!(
            match_identity(&[FieldPair::new(1, 2020), FieldPair::new(3, 1)], &SCI),
            Err(GatingError::IndustryMismatch { got: 1, expected: 4 })
        );
        assert_eq!(
            match_identity(&[FieldPair::new(1, 2020), FieldPair::new(4, 1)], &SCI),
            Err(GatingError::MissingField(3))
        );
    }

    #[test]
    fn test_identity_header() {
        assert_eq!(SCI.header(), (4 << 13) | (3 << 11) | 2020);
    }
}
