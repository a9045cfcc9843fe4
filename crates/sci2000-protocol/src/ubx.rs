//! u-blox UBX binary protocol.
//!
//! [`UbxParser`] is a byte-at-a-time state machine. Complete frames with a
//! valid checksum come out as [`UbxMessage`]; NAV-PVT and ACK payloads can
//! then be decoded into typed values.

use chrono::{NaiveDate, NaiveDateTime};
use sci2000_core::GnssFix;
use thiserror::Error;

pub const SYNC_1: u8 = 0xB5;
pub const SYNC_2: u8 = 0x62;

/// Largest payload accepted.
pub const MAX_PAYLOAD_LEN: usize = 512;

pub const CLASS_NAV: u8 = 0x01;
pub const CLASS_ACK: u8 = 0x05;
pub const CLASS_CFG: u8 = 0x06;
pub const NAV_PVT: u8 = 0x07;
pub const ACK_NAK: u8 = 0x00;
pub const ACK_ACK: u8 = 0x01;

pub const NAV_PVT_LEN: usize = 92;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UbxError {
    #[error("Unexpected message {class:#04x}-{id:#04x}")]
    UnexpectedMessage { class: u8, id: u8 },

    #[error("Payload length {got}, expected {expected}")]
    BadLength { got: usize, expected: usize },
}

/// A framed UBX message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UbxMessage {
    pub class: u8,
    pub id: u8,
    pub payload: Vec<u8>,
}

/// Fletcher-8 checksum over class, id, length and payload.
pub fn checksum(class: u8, id: u8, payload: &[u8]) -> (u8, u8) {
    let len = (payload.len() as u16).to_le_bytes();
    let mut ck_a: u8 = 0;
    let mut ck_b: u8 = 0;
    for &b in [class, id, len[0], len[1]].iter().chain(payload) {
        ck_a = ck_a.wrapping_add(b);
        ck_b = ck_b.wrapping_add(ck_a);
    }
    (ck_a, ck_b)
}

/// Frame a message for sending.
pub fn encode(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
    let (ck_a, ck_b) = checksum(class, id, payload);
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(&[SYNC_1, SYNC_2, class, id]);
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    out.push(ck_a);
    out.push(ck_b);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Sync1,
    Sync2,
    Class,
    Id,
    Length1,
    Length2,
    Payload,
    CkA,
    CkB,
}

/// Streaming UBX frame parser.
#[derive(Debug, Clone)]
pub struct UbxParser {
    state: State,
    class: u8,
    id: u8,
    length: usize,
    payload: Vec<u8>,
    ck_a: u8,
    messages: u64,
    errors: u64,
}

impl Default for UbxParser {
    fn default() -> Self {
        Self::new()
    }
}

impl UbxParser {
    pub fn new() -> Self {
        Self {
            state: State::Sync1,
            class: 0,
            id: 0,
            length: 0,
            payload: Vec::with_capacity(MAX_PAYLOAD_LEN),
            ck_a: 0,
            messages: 0,
            errors: 0,
        }
    }

    /// Messages received with a valid checksum.
    pub fn messages(&self) -> u64 {
        self.messages
    }

    /// Oversized or corrupt frames.
    pub fn errors(&self) -> u64 {
        self.errors
    }

    pub fn push(&mut self, byte: u8) -> Option<UbxMessage> {
        match self.state {
            State::Sync1 => {
                if byte == SYNC_1 {
                    self.state = State::Sync2;
                }
            }
            State::Sync2 => {
                self.state = match byte {
                    SYNC_2 => State::Class,
                    SYNC_1 => State::Sync2,
                    _ => State::Sync1,
                };
            }
            State::Class => {
                self.class = byte;
                self.state = State::Id;
            }
            State::Id => {
                self.id = byte;
                self.state = State::Length1;
            }
            State::Length1 => {
                self.length = usize::from(byte);
                self.state = State::Length2;
            }
            State::Length2 => {
                self.length |= usize::from(byte) << 8;
                self.payload.clear();
                if self.length > MAX_PAYLOAD_LEN {
                    self.errors += 1;
                    self.state = State::Sync1;
                } else if self.length == 0 {
                    self.state = State::CkA;
                } else {
                    self.state = State::Payload;
                }
            }
            State::Payload => {
                self.payload.push(byte);
                if self.payload.len() == self.length {
                    self.state = State::CkA;
                }
            }
            State::CkA => {
                self.ck_a = byte;
                self.state = State::CkB;
            }
            State::CkB => {
                self.state = State::Sync1;
                if (self.ck_a, byte) == checksum(self.class, self.id, &self.payload) {
                    self.messages += 1;
                    return Some(UbxMessage {
                        class: self.class,
                        id: self.id,
                        payload: std::mem::take(&mut self.payload),
                    });
                }
                self.errors += 1;
            }
        }
        None
    }

    /// Feed a chunk, collecting every complete message.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<UbxMessage> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }
}

// ============================================================================
// Payload decoders
// ============================================================================

/// Acknowledgement of a CFG message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UbxAck {
    pub acknowledged: bool,
    pub class: u8,
    pub id: u8,
}

impl UbxAck {
    pub fn decode(msg: &UbxMessage) -> Result<Self, UbxError> {
        if msg.class != CLASS_ACK || !matches!(msg.id, ACK_ACK | ACK_NAK) {
            return Err(UbxError::UnexpectedMessage {
                class: msg.class,
                id: msg.id,
            });
        }
        if msg.payload.len() != 2 {
            return Err(UbxError::BadLength {
                got: msg.payload.len(),
                expected: 2,
            });
        }
        Ok(Self {
            acknowledged: msg.id == ACK_ACK,
            class: msg.payload[0],
            id: msg.payload[1],
        })
    }
}

fn le_u16(p: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([p[at], p[at + 1]])
}

fn le_i32(p: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([p[at], p[at + 1], p[at + 2], p[at + 3]])
}

/// Decode NAV-PVT into a fix. Returns `Ok(None)` when the receiver reports
/// no usable fix.
pub fn decode_nav_pvt(msg: &UbxMessage) -> Result<Option<GnssFix>, UbxError> {
    if msg.class != CLASS_NAV || msg.id != NAV_PVT {
        return Err(UbxError::UnexpectedMessage {
            class: msg.class,
            id: msg.id,
        });
    }
    let p = &msg.payload;
    if p.len() < NAV_PVT_LEN {
        return Err(UbxError::BadLength {
            got: p.len(),
            expected: NAV_PVT_LEN,
        });
    }

    let valid = p[11];
    let fix_type = p[20];
    let fix_ok = p[21] & 0x01 != 0;
    if !fix_ok || !(2..=4).contains(&fix_type) {
        return Ok(None);
    }

    let utc = if valid & 0x03 == 0x03 {
        let nano = le_i32(p, 16).max(0) as u32;
        NaiveDate::from_ymd_opt(i32::from(le_u16(p, 4)), u32::from(p[6]), u32::from(p[7]))
            .and_then(|d| {
                d.and_hms_nano_opt(u32::from(p[8]), u32::from(p[9]), u32::from(p[10]), nano)
            })
    } else {
        None
    };

    let speed_mps = le_i32(p, 60) as f32 / 1000.0;
    let heading_deg = le_i32(p, 64) as f64 * 1e-5;

    Ok(Some(GnssFix {
        latitude_deg: f64::from(le_i32(p, 28)) * 1e-7,
        longitude_deg: f64::from(le_i32(p, 24)) * 1e-7,
        cog_rad: Some(heading_deg.to_radians() as f32),
        sog_mps: Some(speed_mps),
        utc,
    }))
}

/// Build a NAV-PVT payload. Used by the simulator to drive the parser.
pub fn nav_pvt_payload(fix: &GnssFix) -> Vec<u8> {
    use chrono::{Datelike, Timelike};

    let mut p = vec![0u8; NAV_PVT_LEN];
    if let Some(t) = fix.utc {
        p[4..6].copy_from_slice(&(t.year() as u16).to_le_bytes());
        p[6] = t.month() as u8;
        p[7] = t.day() as u8;
        p[8] = t.hour() as u8;
        p[9] = t.minute() as u8;
        p[10] = t.second() as u8;
        p[11] = 0x03;
        p[16..20].copy_from_slice(&(t.nanosecond().min(999_999_999) as i32).to_le_bytes());
    }
    p[20] = 3;
    p[21] = 0x01;
    p[24..28].copy_from_slice(&((fix.longitude_deg * 1e7).round() as i32).to_le_bytes());
    p[28..32].copy_from_slice(&((fix.latitude_deg * 1e7).round() as i32).to_le_bytes());
    let speed_mm = (fix.sog_mps.unwrap_or(0.0) * 1000.0).round() as i32;
    p[60..64].copy_from_slice(&speed_mm.to_le_bytes());
    let heading = (f64::from(fix.cog_rad.unwrap_or(0.0)).to_degrees() * 1e5).round() as i32;
    p[64..68].copy_from_slice(&heading.to_le_bytes());
    p
}
