//! A bus that logs instead of driving a CAN controller.
//!
//! Outgoing messages are written to the log as hex. Incoming messages are
//! whatever the demo calibration client pushes into the inbox channel.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sci2000_engine::{BusNotification, DeviceIdentity, DeviceIndex, LinkIndicator, N2kBus};
use sci2000_protocol::{N2kMessage, ProprietaryIdentity};

/// Source address claimed by the first virtual device; the rest follow.
const FIRST_ADDRESS: u8 = 0x40;

pub struct TracingBus {
    devices: Vec<DeviceIdentity>,
    inbox: mpsc::UnboundedReceiver<N2kMessage>,
    opened: bool,
}

impl TracingBus {
    pub fn new(inbox: mpsc::UnboundedReceiver<N2kMessage>) -> Self {
        Self {
            devices: Vec::new(),
            inbox,
            opened: false,
        }
    }

    /// Address of a registered device.
    pub fn address(device: DeviceIndex) -> u8 {
        FIRST_ADDRESS.wrapping_add(device.0 as u8)
    }
}

impl N2kBus for TracingBus {
    fn register_device(&mut self, identity: &DeviceIdentity) -> DeviceIndex {
        let index = DeviceIndex(self.devices.len());
        info!(
            model = identity.model_id,
            product = identity.product_code,
            address = Self::address(index),
            pgns = ?identity.transmit_pgns,
            "Registered device"
        );
        self.devices.push(identity.clone());
        index
    }

    fn register_calibration_pgn(&mut self, pgn: u32, device: DeviceIndex, identity: ProprietaryIdentity) {
        debug!(pgn, ?device, mfg = identity.manufacturer_code, "Calibration PGN registered");
    }

    fn send_message(&mut self, message: &N2kMessage, device: DeviceIndex) -> bool {
        let Some(identity) = self.devices.get(device.0) else {
            warn!(?device, pgn = message.pgn, "Send from unknown device");
            return false;
        };
        debug!(
            model = identity.model_id,
            pgn = message.pgn,
            dst = message.destination,
            data = %hex(&message.data),
            "TX"
        );
        true
    }

    fn pump_incoming(&mut self) -> Vec<BusNotification> {
        let mut notifications = Vec::new();
        if !self.opened {
            self.opened = true;
            info!(devices = self.devices.len(), "Address claim complete");
            notifications.push(BusNotification::Opened);
        }
        while let Ok(message) = self.inbox.try_recv() {
            let destination = message.destination;
            let device = (0..self.devices.len())
                .map(DeviceIndex)
                .find(|d| Self::address(*d) == destination)
                .unwrap_or(DeviceIndex(0));
            debug!(pgn = message.pgn, src = message.source, data = %hex(&message.data), "RX");
            notifications.push(BusNotification::Message { device, message });
        }
        notifications
    }
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ")
}

/// Indicator that reports link changes in the log.
#[derive(Debug, Default)]
pub struct LogIndicator;

impl LinkIndicator for LogIndicator {
    fn set_bus_state(&mut self, available: bool) {
        if available {
            info!("Bus available");
        } else {
            warn!("Bus unavailable");
        }
    }

    fn set_transmit_ok(&mut self, ok: bool) {
        if ok {
            info!("Transmission recovered");
        } else {
            warn!("Transmission failing");
        }
    }
}
