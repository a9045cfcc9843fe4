//! Raw CAN frames tunnelled over the side channel.
//!
//! Wire layout: 29-bit identifier as big-endian u32, DLC byte, then DLC
//! data bytes.

use thiserror::Error;

use crate::n2k::CanId;

pub const MAX_DLC: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Invalid DLC {0}")]
    InvalidDlc(u8),

    #[error("Frame truncated: {len} bytes, expected {expected}")]
    Truncated { len: usize, expected: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    pub id: u32,
    pub data: Vec<u8>,
}

impl CanFrame {
    pub fn new(id: u32, data: &[u8]) -> Result<Self, FrameError> {
        if data.len() > MAX_DLC {
            return Err(FrameError::InvalidDlc(data.len() as u8));
        }
        Ok(Self {
            id: id & 0x1FFF_FFFF,
            data: data.to_vec(),
        })
    }

    pub fn can_id(&self) -> CanId {
        CanId(self.id)
    }

    pub fn to_tunnel_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.data.len());
        out.extend_from_slice(&self.id.to_be_bytes());
        out.push(self.data.len() as u8);
        out.extend_from_slice(&self.data);
        out
    }

    pub fn from_tunnel_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < 5 {
            return Err(FrameError::Truncated {
                len: bytes.len(),
                expected: 5,
            });
        }
        let id = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let dlc = bytes[4];
        if usize::from(dlc) > MAX_DLC {
            return Err(FrameError::InvalidDlc(dlc));
        }
        let expected = 5 + usize::from(dlc);
        if bytes.len() < expected {
            return Err(FrameError::Truncated {
                len: bytes.len(),
                expected,
            });
        }
        Ok(Self {
            id,
            data: bytes[5..expected].to_vec(),
        })
    }
}
