//! Collaborator traits for the NMEA 2000 stack and the link indicator.
//!
//! The engine never touches CAN frames directly. Address claim, fast-packet
//! assembly and ISO request handling live behind [`N2kBus`]; the engine
//! only registers its virtual devices, sends complete messages and drains
//! whatever the stack has received.

use sci2000_core::config::{MARINE_INDUSTRY_CODE, SCI_MANUFACTURER_CODE};
use sci2000_protocol::calibration_pgn::{PGN_IMU_CALIBRATION, PGN_MHU_CALIBRATION, PGN_SPEED_CALIBRATION};
use sci2000_protocol::group_function::ProprietaryIdentity;
use sci2000_protocol::pgn::{
    PGN_ATTITUDE, PGN_COG_SOG_RAPID, PGN_POSITION_RAPID, PGN_SPEED_WATER, PGN_SYSTEM_TIME,
    PGN_VESSEL_HEADING, PGN_WIND,
};
use sci2000_protocol::N2kMessage;

/// Index of a virtual device registered with the bus stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIndex(pub usize);

/// Product and device information announced by one virtual device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub model_id: &'static str,
    pub product_code: u16,
    pub device_function: u8,
    pub device_class: u8,
    pub manufacturer_code: u16,
    pub industry_code: u8,
    pub transmit_pgns: Vec<u32>,
}

impl DeviceIdentity {
    pub fn wind() -> Self {
        Self::sci("SCI MHU->N2K", 130, 130, 85, vec![PGN_WIND, PGN_MHU_CALIBRATION])
    }

    pub fn water_speed() -> Self {
        Self::sci("SCI SOW->N2K", 131, 155, 60, vec![PGN_SPEED_WATER, PGN_SPEED_CALIBRATION])
    }

    pub fn attitude() -> Self {
        Self::sci(
            "SCI IMU->N2K",
            132,
            140,
            60,
            vec![PGN_VESSEL_HEADING, PGN_ATTITUDE, PGN_IMU_CALIBRATION],
        )
    }

    pub fn gnss() -> Self {
        Self::sci(
            "SCI GPS->N2K",
            133,
            145,
            60,
            vec![PGN_POSITION_RAPID, PGN_COG_SOG_RAPID, PGN_SYSTEM_TIME],
        )
    }

    fn sci(
        model_id: &'static str,
        product_code: u16,
        device_function: u8,
        device_class: u8,
        transmit_pgns: Vec<u32>,
    ) -> Self {
        Self {
            model_id,
            product_code,
            device_function,
            device_class,
            manufacturer_code: SCI_MANUFACTURER_CODE,
            industry_code: MARINE_INDUSTRY_CODE,
            transmit_pgns,
        }
    }

    /// Override manufacturer and industry codes.
    pub fn with_identity(mut self, identity: ProprietaryIdentity) -> Self {
        self.manufacturer_code = identity.manufacturer_code;
        self.industry_code = identity.industry_code;
        self
    }

    pub fn proprietary_identity(&self) -> ProprietaryIdentity {
        ProprietaryIdentity::new(self.manufacturer_code, self.industry_code)
    }
}

/// Something the bus stack reports back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusNotification {
    /// Address claim finished; publication may start.
    Opened,
    /// A complete message addressed to (or broadcast to) one of our devices.
    Message { device: DeviceIndex, message: N2kMessage },
}

/// The NMEA 2000 stack as seen by the engine.
pub trait N2kBus {
    fn register_device(&mut self, identity: &DeviceIdentity) -> DeviceIndex;

    /// Route group function requests/commands for `pgn` to the engine.
    fn register_calibration_pgn(&mut self, pgn: u32, device: DeviceIndex, identity: ProprietaryIdentity);

    /// Queue a message from `device`. Returns false when the stack could not
    /// accept it.
    fn send_message(&mut self, message: &N2kMessage, device: DeviceIndex) -> bool;

    /// Run the stack's state machine and drain what it produced.
    fn pump_incoming(&mut self) -> Vec<BusNotification>;
}

/// Status LEDs or whatever else shows link state.
pub trait LinkIndicator {
    fn set_bus_state(&mut self, available: bool);

    fn set_transmit_ok(&mut self, _ok: bool) {}
}

/// Indicator for nodes without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIndicator;

impl LinkIndicator for NoIndicator {
    fn set_bus_state(&mut self, _available: bool) {}
}

/// Send success/failure counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BusHealth {
    pub sent: u64,
    pub failed: u64,
    pub consecutive_failures: u32,
}

impl BusHealth {
    /// Record a send result. Returns true when the healthy/failing state
    /// changed.
    pub fn record(&mut self, ok: bool) -> bool {
        let was_healthy = self.is_healthy();
        if ok {
            self.sent += 1;
            self.consecutive_failures = 0;
        } else {
            self.failed += 1;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        was_healthy != self.is_healthy()
    }

    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_identities() {
        let wind = DeviceIdentity::wind();
        assert_eq!(wind.model_id, "SCI MHU->N2K");
        assert_eq!((wind.product_code, wind.device_function, wind.device_class), (130, 130, 85));
        assert_eq!(wind.proprietary_identity(), ProprietaryIdentity::new(2020, 4));

        let imu = DeviceIdentity::attitude().with_identity(ProprietaryIdentity::new(999, 2));
        assert_eq!(imu.manufacturer_code, 999);
        assert!(imu.transmit_pgns.contains(&PGN_IMU_CALIBRATION));
    }

    #[test]
    fn test_health_transitions() {
        let mut health = BusHealth::default();
        assert!(!health.record(true));
        assert!(health.record(false));
        assert!(!health.record(false));
        assert_eq!(health.consecutive_failures, 2);
        assert!(health.record(true));
        assert_eq!(
            health,
            BusHealth {
                sent: 2,
                failed: 2,
                consecutive_failures: 0
            }
        );
    }
}
