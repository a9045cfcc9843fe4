//! Proprietary calibration PGN handler.
//!
//! One handler type serves every calibration PGN; what differs between the
//! masthead unit, speed and attitude PGNs is captured by a [`FieldTable`].

use tracing::{debug, info, warn};

use sci2000_core::{CalibrationAxis, CalibrationStorage, CalibrationStore, CalibrationValues, CommandPolicy};
use sci2000_protocol::calibration_pgn::{
    CalibrationReport, PGN_IMU_CALIBRATION, PGN_MHU_CALIBRATION, PGN_SPEED_CALIBRATION,
};
use sci2000_protocol::group_function::{
    decode_group_function, match_identity, proprietary_field_width, FieldPair, GatingError, GroupFunction,
    ProprietaryIdentity,
};
use sci2000_protocol::pgn::SequenceId;
use sci2000_protocol::{DecodeError, N2kMessage};

use crate::bus::DeviceIndex;

/// One writable calibration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationField {
    pub number: u8,
    pub axis: CalibrationAxis,
}

/// Field layout of one calibration PGN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTable {
    pub pgn: u32,
    pub fields: Vec<CalibrationField>,
    /// Read-only field carrying the sensor self-calibration status.
    pub status_field: Option<u8>,
}

impl FieldTable {
    /// PGN 130900: apparent wind angle offset and wind speed factor.
    pub fn mhu() -> Self {
        Self {
            pgn: PGN_MHU_CALIBRATION,
            fields: vec![
                CalibrationField {
                    number: 4,
                    axis: CalibrationAxis::AwaOffset,
                },
                CalibrationField {
                    number: 5,
                    axis: CalibrationAxis::AwsFactor,
                },
            ],
            status_field: None,
        }
    }

    /// PGN 130901: speed through water factor.
    pub fn speed() -> Self {
        Self {
            pgn: PGN_SPEED_CALIBRATION,
            fields: vec![CalibrationField {
                number: 4,
                axis: CalibrationAxis::SowFactor,
            }],
            status_field: None,
        }
    }

    /// PGN 130902: heading, pitch and roll offsets plus IMU status.
    pub fn imu() -> Self {
        Self {
            pgn: PGN_IMU_CALIBRATION,
            fields: vec![
                CalibrationField {
                    number: 4,
                    axis: CalibrationAxis::HeadingOffset,
                },
                CalibrationField {
                    number: 5,
                    axis: CalibrationAxis::PitchOffset,
                },
                CalibrationField {
                    number: 6,
                    axis: CalibrationAxis::RollOffset,
                },
            ],
            status_field: Some(7),
        }
    }

    pub fn axis(&self, number: u8) -> Option<CalibrationAxis> {
        self.fields.iter().find(|f| f.number == number).map(|f| f.axis)
    }
}

/// Errors handling a group function for a calibration PGN.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Malformed group function: {0}")]
    Decode(#[from] DecodeError),

    #[error("Not addressed to us: {0}")]
    Gating(#[from] GatingError),

    #[error("Group function for PGN {got}, handler serves {expected}")]
    WrongPgn { got: u32, expected: u32 },
}

/// What handling a group function produced.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// Reply to send to the requester.
    Reply(N2kMessage),
    /// Values after a command, per written axis.
    Updated(Vec<(CalibrationAxis, i16)>),
}

/// Request/command handler for one calibration PGN.
#[derive(Debug, Clone)]
pub struct CalibrationPgnHandler {
    table: FieldTable,
    identity: ProprietaryIdentity,
    device: DeviceIndex,
    sequence: SequenceId,
}

impl CalibrationPgnHandler {
    pub fn new(table: FieldTable, identity: ProprietaryIdentity, device: DeviceIndex) -> Self {
        Self {
            table,
            identity,
            device,
            sequence: SequenceId::default(),
        }
    }

    pub fn pgn(&self) -> u32 {
        self.table.pgn
    }

    pub fn device(&self) -> DeviceIndex {
        self.device
    }

    pub fn table(&self) -> &FieldTable {
        &self.table
    }

    /// Decode a PGN 126208 message and run it as a request or command.
    pub fn handle_group_function<S: CalibrationStorage>(
        &mut self,
        message: &N2kMessage,
        store: &mut CalibrationStore<S>,
        policy: CommandPolicy,
        status: u8,
    ) -> Result<HandlerOutcome, HandlerError> {
        let gf = decode_group_function(&message.data, proprietary_field_width)?;
        if gf.pgn() != self.table.pgn {
            return Err(HandlerError::WrongPgn {
                got: gf.pgn(),
                expected: self.table.pgn,
            });
        }
        match gf {
            GroupFunction::Request { pairs, .. } => self
                .handle_request(&pairs, message.source, store.values(), status)
                .map(HandlerOutcome::Reply),
            GroupFunction::Command { pairs, .. } => self
                .handle_command(&pairs, store, policy)
                .map(HandlerOutcome::Updated),
        }
    }

    /// Reply with every cached value, addressed to `requester`.
    pub fn handle_request(
        &mut self,
        pairs: &[FieldPair],
        requester: u8,
        values: &CalibrationValues,
        status: u8,
    ) -> Result<N2kMessage, HandlerError> {
        match_identity(pairs, &self.identity)?;

        let mut report = CalibrationReport::new(self.table.pgn, self.sequence.next(), &self.identity);
        for field in &self.table.fields {
            report.push(field.number, values.get(field.axis));
        }
        if let Some(number) = self.table.status_field {
            report.push(number, i16::from(status));
        }
        debug!(pgn = self.table.pgn, requester, fields = ?report.fields, "Calibration request");
        Ok(report.encode(requester))
    }

    /// Persist every recognised field. Unknown fields are skipped.
    pub fn handle_command<S: CalibrationStorage>(
        &self,
        pairs: &[FieldPair],
        store: &mut CalibrationStore<S>,
        policy: CommandPolicy,
    ) -> Result<Vec<(CalibrationAxis, i16)>, HandlerError> {
        let rest = match_identity(pairs, &self.identity)?;

        let mut updated = Vec::new();
        for pair in rest {
            if Some(pair.field) == self.table.status_field {
                warn!(pgn = self.table.pgn, field = pair.field, "Status field is read-only");
                continue;
            }
            let Some(axis) = self.table.axis(pair.field) else {
                debug!(pgn = self.table.pgn, field = pair.field, "Ignoring unknown calibration field");
                continue;
            };
            let value = store.apply(axis, policy.interpret(pair.value));
            info!(pgn = self.table.pgn, %axis, value, "Calibration updated");
            updated.push((axis, value));
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sci2000_core::calibration::{LEAVE_UNCHANGED, RESTORE_DEFAULT};
    use sci2000_core::MemoryCalibrationStorage;

    const SCI: ProprietaryIdentity = ProprietaryIdentity::new(2020, 4);

    fn imu_handler() -> CalibrationPgnHandler {
        CalibrationPgnHandler::new(FieldTable::imu(), SCI, DeviceIndex(0))
    }

    fn with_identity(extra: &[FieldPair]) -> Vec<FieldPair> {
        let mut pairs = SCI.pairs().to_vec();
        pairs.extend_from_slice(extra);
        pairs
    }

    #[test]
    fn test_request_reports_all_fields() {
        let mut handler = imu_handler();
        let mut values = CalibrationValues::default();
        values.set(CalibrationAxis::PitchOffset, -25);

        let reply = handler
            .handle_request(&with_identity(&[]), 0x31, &values, 0b1111_0101)
            .unwrap();
        assert_eq!(reply.destination, 0x31);
        assert_eq!(reply.priority, 2);

        let report = CalibrationReport::decode(&reply).unwrap();
        assert_eq!(report.fields, vec![(4, 0), (5, -25), (6, 0), (7, 0b1111_0101)]);
    }

    #[test]
    fn test_request_sequence_advances() {
        let mut handler = imu_handler();
        let values = CalibrationValues::default();
        let a = handler.handle_request(&with_identity(&[]), 1, &values, 0).unwrap();
        let b = handler.handle_request(&with_identity(&[]), 1, &values, 0).unwrap();
        assert_eq!(a.data[0] + 1, b.data[0]);
    }

    #[test]
    fn test_command_sentinels() {
        let handler = CalibrationPgnHandler::new(FieldTable::mhu(), SCI, DeviceIndex(0));
        let mut store = CalibrationStore::new(MemoryCalibrationStorage::with_values([("awa", 300), ("aws", 9500)]));

        let pairs = with_identity(&[FieldPair::new(4, RESTORE_DEFAULT), FieldPair::new(5, LEAVE_UNCHANGED)]);
        let updated = handler
            .handle_command(&pairs, &mut store, CommandPolicy::Sentinel)
            .unwrap();
        assert_eq!(
            updated,
            vec![(CalibrationAxis::AwaOffset, 0), (CalibrationAxis::AwsFactor, 9500)]
        );
    }

    #[test]
    fn test_command_literal_policy() {
        let handler = CalibrationPgnHandler::new(FieldTable::speed(), SCI, DeviceIndex(0));
        let mut store = CalibrationStore::new(MemoryCalibrationStorage::new());

        let pairs = with_identity(&[FieldPair::new(4, RESTORE_DEFAULT)]);
        handler
            .handle_command(&pairs, &mut store, CommandPolicy::Literal)
            .unwrap();
        assert_eq!(store.get(CalibrationAxis::SowFactor), RESTORE_DEFAULT as i16);
    }

    #[test]
    fn test_command_skips_unknown_and_status_fields() {
        let handler = imu_handler();
        let mut store = CalibrationStore::new(MemoryCalibrationStorage::new());
        let pairs = with_identity(&[
            FieldPair::new(9, 1),
            FieldPair::new(7, 3),
            FieldPair::new(6, (-40i16) as u16),
        ]);
        let updated = handler
            .handle_command(&pairs, &mut store, CommandPolicy::Sentinel)
            .unwrap();
        assert_eq!(updated, vec![(CalibrationAxis::RollOffset, -40)]);
        assert_eq!(store.storage().get("roll"), Some(-40));
    }

    #[test]
    fn test_foreign_command_changes_nothing() {
        let handler = imu_handler();
        let mut store = CalibrationStore::new(MemoryCalibrationStorage::new());
        let pairs = vec![FieldPair::new(1, 1851), FieldPair::new(3, 4), FieldPair::new(4, 150)];

        let result = handler.handle_command(&pairs, &mut store, CommandPolicy::Sentinel);
        assert!(matches!(result, Err(HandlerError::Gating(GatingError::ManufacturerMismatch { .. }))));
        assert_eq!(store.get(CalibrationAxis::HeadingOffset), 0);
        assert_eq!(store.storage().get("hdg"), None);
    }

    #[test]
    fn test_group_function_for_other_pgn() {
        let mut handler = imu_handler();
        let mut store = CalibrationStore::new(MemoryCalibrationStorage::new());
        let msg = sci2000_protocol::group_function::encode_request(
            PGN_MHU_CALIBRATION,
            &SCI.pairs(),
            proprietary_field_width,
            0x10,
        );
        let result = handler.handle_group_function(&msg, &mut store, CommandPolicy::Sentinel, 0);
        assert!(matches!(result, Err(HandlerError::WrongPgn { got: 130900, .. })));
    }
}
