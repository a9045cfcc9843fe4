//! NMEA 2000 message container, field writer and reader.
//!
//! Fields are little-endian. Numeric fields carry reserved "not available"
//! values: the writer emits them for `None` or out-of-range inputs, and the
//! reader maps them back to `None`.

use thiserror::Error;

pub const N2K_NA_U8: u8 = 0xFF;
pub const N2K_NA_U16: u16 = 0xFFFF;
pub const N2K_NA_I16: i16 = 0x7FFF;
pub const N2K_NA_U32: u32 = 0xFFFF_FFFF;
pub const N2K_NA_I32: i32 = 0x7FFF_FFFF;

/// Destination address for broadcast messages.
pub const BROADCAST_ADDRESS: u8 = 0xFF;

/// Errors decoding message payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Message truncated: needed {needed} bytes at offset {offset}, {len} available")]
    Truncated {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("Unexpected PGN {0}")]
    UnexpectedPgn(u32),

    #[error("Invalid value {value} for {field}")]
    InvalidField { field: &'static str, value: u32 },
}

/// 29-bit extended CAN identifier of an NMEA 2000 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanId(pub u32);

impl CanId {
    /// Assemble an identifier. For PDU1 PGNs the destination goes into the
    /// PDU specific byte.
    pub fn new(priority: u8, pgn: u32, source: u8, destination: u8) -> Self {
        let pgn = pgn & 0x3_FFFF;
        let pf = (pgn >> 8) & 0xFF;
        let pgn_bits = if pf < 240 {
            (pgn & 0x3_FF00) | u32::from(destination)
        } else {
            pgn
        };
        CanId((u32::from(priority & 0x07) << 26) | (pgn_bits << 8) | u32::from(source))
    }

    pub fn priority(&self) -> u8 {
        ((self.0 >> 26) & 0x07) as u8
    }

    pub fn pgn(&self) -> u32 {
        let raw = (self.0 >> 8) & 0x3_FFFF;
        if (raw >> 8) & 0xFF < 240 {
            raw & 0x3_FF00
        } else {
            raw
        }
    }

    pub fn source(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub fn destination(&self) -> u8 {
        let raw = (self.0 >> 8) & 0x3_FFFF;
        if (raw >> 8) & 0xFF < 240 {
            (raw & 0xFF) as u8
        } else {
            BROADCAST_ADDRESS
        }
    }
}

/// A complete (possibly multi-frame) NMEA 2000 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct N2kMessage {
    pub pgn: u32,
    pub priority: u8,
    pub source: u8,
    pub destination: u8,
    pub data: Vec<u8>,
}

impl N2kMessage {
    /// Empty broadcast message.
    pub fn new(pgn: u32, priority: u8) -> Self {
        Self {
            pgn,
            priority,
            source: 0,
            destination: BROADCAST_ADDRESS,
            data: Vec::with_capacity(8),
        }
    }

    pub fn with_destination(mut self, destination: u8) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_source(mut self, source: u8) -> Self {
        self.source = source;
        self
    }

    pub fn can_id(&self) -> CanId {
        CanId::new(self.priority, self.pgn, self.source, self.destination)
    }

    pub fn reader(&self) -> N2kReader<'_> {
        N2kReader::new(&self.data)
    }

    pub fn add_byte(&mut self, v: u8) -> &mut Self {
        self.data.push(v);
        self
    }

    pub fn add_u16(&mut self, v: u16) -> &mut Self {
        self.data.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn add_i16(&mut self, v: i16) -> &mut Self {
        self.data.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn add_u24(&mut self, v: u32) -> &mut Self {
        self.data.extend_from_slice(&v.to_le_bytes()[..3]);
        self
    }

    pub fn add_u32(&mut self, v: u32) -> &mut Self {
        self.data.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn add_i32(&mut self, v: i32) -> &mut Self {
        self.data.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Unsigned 16-bit fixed point; values outside `0..0xFFFD` become NA.
    pub fn add_2byte_udouble(&mut self, v: Option<f64>, precision: f64) -> &mut Self {
        let raw = v
            .map(|v| (v / precision).round())
            .filter(|r| (0.0..=f64::from(0xFFFDu16)).contains(r))
            .map_or(N2K_NA_U16, |r| r as u16);
        self.add_u16(raw)
    }

    /// Signed 16-bit fixed point; values outside `-0x7FFE..=0x7FFD` become NA.
    pub fn add_2byte_double(&mut self, v: Option<f64>, precision: f64) -> &mut Self {
        let raw = v
            .map(|v| (v / precision).round())
            .filter(|r| (-f64::from(0x7FFEi16)..=f64::from(0x7FFDi16)).contains(r))
            .map_or(N2K_NA_I16, |r| r as i16);
        self.add_i16(raw)
    }

    /// Signed 32-bit fixed point; out-of-range values become NA.
    pub fn add_4byte_double(&mut self, v: Option<f64>, precision: f64) -> &mut Self {
        let raw = v
            .map(|v| (v / precision).round())
            .filter(|r| (-f64::from(0x7FFF_FFFEi32)..=f64::from(0x7FFF_FFFDi32)).contains(r))
            .map_or(N2K_NA_I32, |r| r as i32);
        self.add_i32(raw)
    }

    /// Unsigned 32-bit fixed point; out-of-range values become NA.
    pub fn add_4byte_udouble(&mut self, v: Option<f64>, precision: f64) -> &mut Self {
        let raw = v
            .map(|v| (v / precision).round())
            .filter(|r| (0.0..=f64::from(0xFFFF_FFFDu32)).contains(r))
            .map_or(N2K_NA_U32, |r| r as u32);
        self.add_u32(raw)
    }
}

/// Sequential little-endian field reader.
#[derive(Debug, Clone)]
pub struct N2kReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> N2kReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: n,
                len: self.data.len(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u24(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(3)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Unsigned little-endian integer of 1 to 4 bytes.
    pub fn read_uint(&mut self, width: usize) -> Result<u32, DecodeError> {
        let b = self.take(width.clamp(1, 4))?;
        Ok(b.iter().rev().fold(0u32, |acc, &x| (acc << 8) | u32::from(x)))
    }

    pub fn read_2byte_udouble(&mut self, precision: f64) -> Result<Option<f64>, DecodeError> {
        let raw = self.read_u16()?;
        Ok((raw != N2K_NA_U16).then(|| f64::from(raw) * precision))
    }

    pub fn read_2byte_double(&mut self, precision: f64) -> Result<Option<f64>, DecodeError> {
        let raw = self.read_i16()?;
        Ok((raw != N2K_NA_I16).then(|| f64::from(raw) * precision))
    }

    pub fn read_4byte_double(&mut self, precision: f64) -> Result<Option<f64>, DecodeError> {
        let raw = self.read_i32()?;
        Ok((raw != N2K_NA_I32).then(|| f64::from(raw) * precision))
    }

    pub fn read_4byte_udouble(&mut self, precision: f64) -> Result<Option<f64>, DecodeError> {
        let raw = self.read_u32()?;
        Ok((raw != N2K_NA_U32).then(|| f64::from(raw) * precision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_can_id_pdu2() {
        let id = CanId::new(2, 130306, 35, 0x10);
        assert_eq!(id.priority(), 2);
        assert_eq!(id.pgn(), 130306);
        assert_eq!(id.source(), 35);
        // Destination is ignored for broadcast PGNs
        assert_eq!(id.destination(), BROADCAST_ADDRESS);
        assert_eq!(id.0, 0x09FD_0223);
    }

    #[test]
    fn test_can_id_pdu1() {
        let id = CanId::new(3, 126208, 10, 42);
        assert_eq!(id.pgn(), 126208);
        assert_eq!(id.destination(), 42);
        assert_eq!(id.source(), 10);
    }

    #[test]
    fn test_fixed_point_and_na() {
        let mut msg = N2kMessage::new(130306, 2);
        msg.add_2byte_udouble(Some(5.14), 0.01)
            .add_2byte_udouble(None, 0.01)
            .add_2byte_udouble(Some(-1.0), 0.01)
            .add_2byte_double(Some(-0.5), 0.0001)
            .add_2byte_double(Some(10.0), 0.0001);

        assert_eq!(msg.data[0..2], 514u16.to_le_bytes());
        assert_eq!(msg.data[2..4], [0xFF, 0xFF]);
        assert_eq!(msg.data[4..6], [0xFF, 0xFF]);

        let mut r = msg.reader();
        let speed = r.read_2byte_udouble(0.01).unwrap().unwrap();
        assert!((speed - 5.14).abs() < 1e-9);
        assert_eq!(r.read_2byte_udouble(0.01).unwrap(), None);
        assert_eq!(r.read_2byte_udouble(0.01).unwrap(), None);
        let v = r.read_2byte_double(0.0001).unwrap().unwrap();
        assert!((v + 0.5).abs() < 1e-9);
        // 10 / 0.0001 overflows i16
        assert_eq!(r.read_2byte_double(0.0001).unwrap(), None);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_reader_truncation() {
        let data = [0x01, 0x02, 0x03];
        let mut r = N2kReader::new(&data);
        assert_eq!(r.read_u16().unwrap(), 0x0201);
        assert_eq!(
            r.read_u16(),
            Err(DecodeError::Truncated {
                offset: 2,
                needed: 2,
                len: 3
            })
        );
    }

    #[test]
    fn test_read_uint_widths() {
        let data = [0xE4, 0x07, 0x04, 0x10, 0x20, 0x30];
        let mut r = N2kReader::new(&data);
        assert_eq!(r.read_uint(2).unwrap(), 2020);
        assert_eq!(r.read_uint(1).unwrap(), 4);
        assert_eq!(r.read_u24().unwrap(), 0x30_2010);
    }
}
