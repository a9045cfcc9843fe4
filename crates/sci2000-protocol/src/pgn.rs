//! Encoders for the standard PGNs the nodes publish.
//!
//! Angles are radians on the wire with 1e-4 resolution, speeds are m/s with
//! 0.01 resolution. `None` inputs are written as "not available".

use chrono::{NaiveDate, NaiveDateTime, Timelike};

use crate::n2k::N2kMessage;

pub const PGN_GROUP_FUNCTION: u32 = 126208;
pub const PGN_SYSTEM_TIME: u32 = 126992;
pub const PGN_VESSEL_HEADING: u32 = 127250;
pub const PGN_ATTITUDE: u32 = 127257;
pub const PGN_SPEED_WATER: u32 = 128259;
pub const PGN_POSITION_RAPID: u32 = 129025;
pub const PGN_COG_SOG_RAPID: u32 = 129026;
pub const PGN_WIND: u32 = 130306;

const ANGLE_RESOLUTION: f64 = 0.0001;
const SPEED_RESOLUTION: f64 = 0.01;
const LATLON_RESOLUTION: f64 = 1e-7;

/// Heading/course reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DirectionReference {
    True = 0,
    Magnetic = 1,
}

/// Wind reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WindReference {
    TrueNorth = 0,
    Magnetic = 1,
    Apparent = 2,
    TrueBoat = 3,
    TrueWater = 4,
}

/// Source of a system time message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TimeSource {
    Gps = 0,
    Glonass = 1,
    RadioStation = 2,
    LocalCesium = 3,
    LocalRubidium = 4,
    LocalCrystal = 5,
}

fn angle(v: Option<f32>) -> Option<f64> {
    v.map(f64::from)
}

/// Sequence identifier tying together messages produced in the same tick.
/// Cycles through 0..=252.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceId(u8);

impl SequenceId {
    pub fn next(&mut self) -> u8 {
        let sid = self.0;
        self.0 = if sid >= 252 { 0 } else { sid + 1 };
        sid
    }
}

/// PGN 127250 Vessel Heading.
pub fn vessel_heading(
    sid: u8,
    heading: Option<f32>,
    deviation: Option<f32>,
    variation: Option<f32>,
    reference: DirectionReference,
) -> N2kMessage {
    let mut msg = N2kMessage::new(PGN_VESSEL_HEADING, 2);
    msg.add_byte(sid)
        .add_2byte_udouble(angle(heading), ANGLE_RESOLUTION)
        .add_2byte_double(angle(deviation), ANGLE_RESOLUTION)
        .add_2byte_double(angle(variation), ANGLE_RESOLUTION)
        .add_byte(0xFC | reference as u8);
    msg
}

/// PGN 127257 Attitude.
pub fn attitude(sid: u8, yaw: Option<f32>, pitch: Option<f32>, roll: Option<f32>) -> N2kMessage {
    let mut msg = N2kMessage::new(PGN_ATTITUDE, 3);
    msg.add_byte(sid)
        .add_2byte_double(angle(yaw), ANGLE_RESOLUTION)
        .add_2byte_double(angle(pitch), ANGLE_RESOLUTION)
        .add_2byte_double(angle(roll), ANGLE_RESOLUTION)
        .add_byte(0xFF);
    msg
}

/// PGN 130306 Wind Data.
pub fn wind(sid: u8, speed_mps: Option<f32>, angle_rad: Option<f32>, reference: WindReference) -> N2kMessage {
    let mut msg = N2kMessage::new(PGN_WIND, 2);
    msg.add_byte(sid)
        .add_2byte_udouble(speed_mps.map(f64::from), SPEED_RESOLUTION)
        .add_2byte_udouble(angle(angle_rad), ANGLE_RESOLUTION)
        .add_byte(0xF8 | reference as u8)
        .add_u16(0xFFFF);
    msg
}

/// PGN 128259 Speed, water referenced, paddle wheel.
pub fn speed_water(sid: u8, water_mps: Option<f32>) -> N2kMessage {
    let mut msg = N2kMessage::new(PGN_SPEED_WATER, 2);
    msg.add_byte(sid)
        .add_2byte_udouble(water_mps.map(f64::from), SPEED_RESOLUTION)
        .add_2byte_udouble(None, SPEED_RESOLUTION)
        .add_byte(0) // paddle wheel
        .add_byte(0xFF)
        .add_byte(0xFF);
    msg
}

/// PGN 129025 Position, Rapid Update.
pub fn position_rapid(latitude_deg: Option<f64>, longitude_deg: Option<f64>) -> N2kMessage {
    let mut msg = N2kMessage::new(PGN_POSITION_RAPID, 2);
    msg.add_4byte_double(latitude_deg, LATLON_RESOLUTION)
        .add_4byte_double(longitude_deg, LATLON_RESOLUTION);
    msg
}

/// PGN 129026 COG & SOG, Rapid Update.
pub fn cog_sog_rapid(sid: u8, cog_rad: Option<f32>, sog_mps: Option<f32>) -> N2kMessage {
    let mut msg = N2kMessage::new(PGN_COG_SOG_RAPID, 2);
    msg.add_byte(sid)
        .add_byte(0xFC | DirectionReference::True as u8)
        .add_2byte_udouble(angle(cog_rad), ANGLE_RESOLUTION)
        .add_2byte_udouble(sog_mps.map(f64::from), SPEED_RESOLUTION)
        .add_u16(0xFFFF);
    msg
}

/// PGN 126992 System Time.
pub fn system_time(sid: u8, utc: Option<NaiveDateTime>, source: TimeSource) -> N2kMessage {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    let (days, seconds) = match utc {
        Some(t) => {
            let days = (t.date() - epoch).num_days();
            let secs = f64::from(t.num_seconds_from_midnight())
                + f64::from(t.nanosecond() % 1_000_000_000) / 1e9;
            (u16::try_from(days).ok(), Some(secs))
        }
        None => (None, None),
    };

    let mut msg = N2kMessage::new(PGN_SYSTEM_TIME, 3);
    msg.add_byte(sid)
        .add_byte(0xF0 | source as u8)
        .add_u16(days.unwrap_or(0xFFFF))
        .add_4byte_udouble(seconds, 0.0001);
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::n2k::N2K_NA_I16;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sequence_id_wraps() {
        let mut sid = SequenceId::default();
        for expected in 0..=252u8 {
            assert_eq!(sid.next(), expected);
        }
        assert_eq!(sid.next(), 0);
    }

    #[test]
    fn test_vessel_heading_layout() {
        let msg = vessel_heading(7, Some(1.0), None, None, DirectionReference::Magnetic);
        assert_eq!(msg.pgn, PGN_VESSEL_HEADING);
        assert_eq!(msg.data.len(), 8);

        let mut r = msg.reader();
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_u16().unwrap(), 10_000);
        assert_eq!(r.read_i16().unwrap(), N2K_NA_I16);
        assert_eq!(r.read_i16().unwrap(), N2K_NA_I16);
        assert_eq!(r.read_u8().unwrap() & 0x03, 1);
    }

    #[test]
    fn test_attitude_layout() {
        let msg = attitude(1, Some(0.5), Some(-0.1), None);
        assert_eq!(msg.data.len(), 8);
        let mut r = msg.reader();
        r.skip(1).unwrap();
        assert_eq!(r.read_i16().unwrap(), 5_000);
        assert_eq!(r.read_i16().unwrap(), -1_000);
        assert_eq!(r.read_i16().unwrap(), N2K_NA_I16);
    }

    #[test]
    fn test_wind_layout() {
        let msg = wind(3, Some(6.17), Some(0.7854), WindReference::Apparent);
        assert_eq!(msg.data.len(), 8);
        let mut r = msg.reader();
        assert_eq!(r.read_u8().unwrap(), 3);
        assert_eq!(r.read_u16().unwrap(), 617);
        assert_eq!(r.read_u16().unwrap(), 7_854);
        assert_eq!(r.read_u8().unwrap() & 0x07, 2);
    }

    #[test]
    fn test_stale_wind_is_not_available() {
        let msg = wind(0, None, None, WindReference::Apparent);
        assert_eq!(msg.data[1..5], [0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_speed_water_layout() {
        let msg = speed_water(9, Some(2.57));
        assert_eq!(msg.data.len(), 8);
        let mut r = msg.reader();
        assert_eq!(r.read_u8().unwrap(), 9);
        assert_eq!(r.read_u16().unwrap(), 257);
        assert_eq!(r.read_u16().unwrap(), 0xFFFF);
        assert_eq!(r.read_u8().unwrap(), 0);
    }

    #[test]
    fn test_position_rapid() {
        let msg = position_rapid(Some(37.8), Some(-122.4));
        let mut r = msg.reader();
        assert_eq!(r.read_i32().unwrap(), 378_000_000);
        assert_eq!(r.read_i32().unwrap(), -1_224_000_000);
    }

    #[test]
    fn test_cog_sog_rapid() {
        let msg = cog_sog_rapid(2, Some(3.0), None);
        let mut r = msg.reader();
        r.skip(2).unwrap();
        assert_eq!(r.read_u16().unwrap(), 30_000);
        assert_eq!(r.read_u16().unwrap(), 0xFFFF);
    }

    #[test]
    fn test_system_time() {
        let utc = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 30, 15)
            .unwrap();
        let msg = system_time(0, Some(utc), TimeSource::Gps);
        let mut r = msg.reader();
        r.skip(1).unwrap();
        assert_eq!(r.read_u8().unwrap() & 0x0F, 0);
        assert_eq!(r.read_u16().unwrap(), 19_875);
        assert_eq!(r.read_u32().unwrap(), 45_015 * 10_000);
    }
}
