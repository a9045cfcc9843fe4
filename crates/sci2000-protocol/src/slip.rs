//! SLIP byte stuffing (RFC 1055) for the side-channel link.

pub const END: u8 = 0xC0;
pub const ESC: u8 = 0xDB;
pub const ESC_END: u8 = 0xDC;
pub const ESC_ESC: u8 = 0xDD;

/// Receive buffer size. Bytes beyond it are dropped until the next END.
pub const MAX_FRAME_LEN: usize = 128;

/// Incremental SLIP decoder.
#[derive(Debug, Clone, Default)]
pub struct SlipDecoder {
    buffer: Vec<u8>,
    escape_next: bool,
    overflowed: u64,
}

impl SlipDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_LEN),
            escape_next: false,
            overflowed: 0,
        }
    }

    /// Feed one byte; returns a frame when END closes a non-empty one.
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        match byte {
            END => {
                self.escape_next = false;
                if self.buffer.is_empty() {
                    None
                } else {
                    Some(std::mem::take(&mut self.buffer))
                }
            }
            ESC => {
                self.escape_next = true;
                None
            }
            _ => {
                let byte = if std::mem::take(&mut self.escape_next) {
                    match byte {
                        ESC_END => END,
                        ESC_ESC => ESC,
                        other => other,
                    }
                } else {
                    byte
                };
                if self.buffer.len() < MAX_FRAME_LEN {
                    self.buffer.push(byte);
                } else {
                    self.overflowed += 1;
                }
                None
            }
        }
    }

    /// Feed a chunk, calling `on_frame` for each complete frame.
    pub fn feed(&mut self, bytes: &[u8], mut on_frame: impl FnMut(&[u8])) {
        for &b in bytes {
            if let Some(frame) = self.push(b) {
                on_frame(&frame);
            }
        }
    }

    /// Bytes dropped because a frame exceeded [`MAX_FRAME_LEN`].
    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }
}

/// Stuff `payload` and terminate it with END.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    for &b in payload {
        match b {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            _ => out.push(b),
        }
    }
    out.push(END);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_escapes() {
        assert_eq!(
            encode(&[0x01, END, 0x02, ESC]),
            vec![0x01, ESC, ESC_END, 0x02, ESC, ESC_ESC, END]
        );
    }

    #[test]
    fn test_decode_stuffed_frame() {
        let mut decoder = SlipDecoder::new();
        let mut frames = Vec::new();
        decoder.feed(&encode(&[END, ESC, 0x7F]), |f| frames.push(f.to_vec()));
        assert_eq!(frames, vec![vec![END, ESC, 0x7F]]);
    }

    #[test]
    fn test_empty_frames_skipped() {
        let mut decoder = SlipDecoder::new();
        let mut frames = Vec::new();
        decoder.feed(&[END, END, 0x01, END, END], |f| frames.push(f.to_vec()));
        assert_eq!(frames, vec![vec![0x01]]);
    }

    #[test]
    fn test_split_across_chunks() {
        let mut decoder = SlipDecoder::new();
        let encoded = encode(&[0x10, END, 0x20]);
        let (a, b) = encoded.split_at(2);
        let mut frames = Vec::new();
        decoder.feed(a, |f| frames.push(f.to_vec()));
        assert!(frames.is_empty());
        decoder.feed(b, |f| frames.push(f.to_vec()));
        assert_eq!(frames, vec![vec![0x10, END, 0x20]]);
    }

    #[test]
    fn test_oversized_frame_truncated() {
        let mut decoder = SlipDecoder::new();
        let mut frames = Vec::new();
        let payload = vec![0x55; MAX_FRAME_LEN + 10];
        decoder.feed(&encode(&payload), |f| frames.push(f.len()));
        assert_eq!(frames, vec![MAX_FRAME_LEN]);
        assert_eq!(decoder.overflowed(), 10);
    }

    #[test]
    fn test_invalid_escape_keeps_byte() {
        let mut decoder = SlipDecoder::new();
        assert_eq!(decoder.push(ESC), None);
        assert_eq!(decoder.push(0x41), None);
        assert_eq!(decoder.push(END), Some(vec![0x41]));
    }
}
