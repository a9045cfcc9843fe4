//! Side-channel CAN bridge.
//!
//! Raw CAN frames arrive SLIP-framed over a serial, Bluetooth or Wi-Fi link
//! and are forwarded onto the primary bus. While a forwarded frame is being
//! sent the side-channel echo is suspended, so the bridge does not pick up
//! its own transmission as new input.

use tracing::{debug, warn};

use sci2000_protocol::slip::{self, SlipDecoder};
use sci2000_protocol::CanFrame;

/// The primary bus as seen by the bridge.
pub trait SideInterfaceBus {
    /// Enable or disable echoing primary-bus frames to the side channel.
    fn set_side_echo(&mut self, enabled: bool);

    /// Transmit a frame on the primary bus.
    fn send_frame(&mut self, frame: &CanFrame) -> bool;

    /// Hand a frame to the local NMEA 2000 stack as if it had been received.
    fn inject_frame(&mut self, frame: &CanFrame);
}

/// Counters for the bridge.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStats {
    pub forwarded: u64,
    pub send_failures: u64,
    pub invalid_frames: u64,
}

pub struct SideChannelBridge<B> {
    bus: B,
    decoder: SlipDecoder,
    stats: BridgeStats,
}

impl<B: SideInterfaceBus> SideChannelBridge<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            decoder: SlipDecoder::new(),
            stats: BridgeStats::default(),
        }
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Feed bytes received on the side channel.
    pub fn on_side_bytes(&mut self, bytes: &[u8]) {
        let mut frames = Vec::new();
        self.decoder.feed(bytes, |payload| frames.push(CanFrame::from_tunnel_bytes(payload)));

        for frame in frames {
            match frame {
                Ok(frame) => self.forward(&frame),
                Err(e) => {
                    self.stats.invalid_frames += 1;
                    warn!(error = %e, "Dropping invalid side-channel frame");
                }
            }
        }
    }

    fn forward(&mut self, frame: &CanFrame) {
        self.bus.set_side_echo(false);
        let sent = self.bus.send_frame(frame);
        self.bus.set_side_echo(true);
        self.bus.inject_frame(frame);

        if sent {
            self.stats.forwarded += 1;
            debug!(id = %format!("{:08X}", frame.id), len = frame.data.len(), "Forwarded side-channel frame");
        } else {
            self.stats.send_failures += 1;
            warn!(id = %format!("{:08X}", frame.id), "Failed to forward side-channel frame");
        }
    }
}

/// SLIP-encode a primary-bus frame for the side channel.
pub fn encode_for_side_channel(frame: &CanFrame) -> Vec<u8> {
    slip::encode(&frame.to_tunnel_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Echo(bool),
        Send(u32),
        Inject(u32),
    }

    #[derive(Default)]
    struct RecordingSideBus {
        calls: Vec<Call>,
        fail_sends: bool,
    }

    impl SideInterfaceBus for RecordingSideBus {
        fn set_side_echo(&mut self, enabled: bool) {
            self.calls.push(Call::Echo(enabled));
        }

        fn send_frame(&mut self, frame: &CanFrame) -> bool {
            self.calls.push(Call::Send(frame.id));
            !self.fail_sends
        }

        fn inject_frame(&mut self, frame: &CanFrame) {
            self.calls.push(Call::Inject(frame.id));
        }
    }

    #[test]
    fn test_echo_suspended_around_send() {
        let mut bridge = SideChannelBridge::new(RecordingSideBus::default());
        let frame = CanFrame::new(0x09F1_1223, &[0xC0, 0xDB, 1]).unwrap();
        bridge.on_side_bytes(&encode_for_side_channel(&frame));

        assert_eq!(
            bridge.bus().calls,
            vec![
                Call::Echo(false),
                Call::Send(0x09F1_1223),
                Call::Echo(true),
                Call::Inject(0x09F1_1223)
            ]
        );
        assert_eq!(bridge.stats().forwarded, 1);
    }

    #[test]
    fn test_invalid_frame_counted() {
        let mut bridge = SideChannelBridge::new(RecordingSideBus::default());
        bridge.on_side_bytes(&slip::encode(&[0, 0, 0, 1, 12]));
        assert!(bridge.bus().calls.is_empty());
        assert_eq!(bridge.stats().invalid_frames, 1);
    }

    #[test]
    fn test_send_failure_still_injects() {
        let mut bridge = SideChannelBridge::new(RecordingSideBus {
            fail_sends: true,
            ..Default::default()
        });
        let frame = CanFrame::new(0x1234, &[]).unwrap();
        bridge.on_side_bytes(&encode_for_side_channel(&frame));
        assert_eq!(bridge.stats().send_failures, 1);
        assert_eq!(bridge.bus().calls.last(), Some(&Call::Inject(0x1234)));
    }
}
