//! Simulated sensors.
//!
//! Each simulator produces what the real driver would and pushes it through
//! the same path: attitude and photodiode samples become events directly,
//! pulse edges go through the capture handoff, and GNSS fixes are encoded
//! as UBX NAV-PVT and parsed back.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use sci2000_core::angle::wrap_360;
use sci2000_core::{AttitudeReading, Event, GnssFix, ImuCalibrationState, PhotodiodeSample};
use sci2000_engine::CaptureProducer;
use sci2000_protocol::calibration_pgn::PGN_IMU_CALIBRATION;
use sci2000_protocol::group_function::encode_request;
use sci2000_protocol::ubx::{self, decode_nav_pvt, nav_pvt_payload};
use sci2000_protocol::{proprietary_field_width, N2kMessage, ProprietaryIdentity, UbxParser};

/// Photodiode amplitude in ADC counts.
const PHOTODIODE_AMPLITUDE: f32 = 1000.0;

/// Source address of the simulated calibration display.
const DISPLAY_ADDRESS: u8 = 0x23;

/// Inertial unit at 20 Hz: slow heading swing, pitch and roll.
pub async fn attitude(events: mpsc::Sender<Event>) {
    let start = Instant::now();
    let mut interval = tokio::time::interval(Duration::from_millis(50));
    loop {
        interval.tick().await;
        let t = start.elapsed().as_secs_f32();
        let reading = AttitudeReading {
            heading_deg: wrap_360(200.0 + 15.0 * (t / 30.0).sin()),
            pitch_deg: 3.0 * (t / 4.0).sin(),
            roll_deg: 12.0 * (t / 6.0).sin(),
            calibration: ImuCalibrationState {
                system: 3,
                gyro: 3,
                accel: 3,
                mag: 2,
            },
        };
        if !offer(&events, Event::attitude(true, reading)) {
            tracing::error!("Failed to send attitude - engine may have stopped");
            break;
        }
    }
}

/// Masthead photodiodes at 10 Hz with the vane swinging around 40°.
pub async fn photodiode(events: mpsc::Sender<Event>) {
    let start = Instant::now();
    let mut interval = tokio::time::interval(Duration::from_millis(100));
    loop {
        interval.tick().await;
        let t = start.elapsed().as_secs_f32();
        let sample = photodiode_sample(40.0 + 15.0 * (t / 8.0).sin());
        if !offer(&events, Event::photodiode(true, sample)) {
            tracing::error!("Failed to send photodiode sample - engine may have stopped");
            break;
        }
    }
}

/// Hand an event to the engine without waiting; a full channel drops it.
/// Returns false once the engine is gone.
fn offer(events: &mpsc::Sender<Event>, event: Event) -> bool {
    match events.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::trace!("Engine busy, simulated event dropped");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Photodiode triplet seen with the vane at `angle_deg`.
pub fn photodiode_sample(angle_deg: f32) -> PhotodiodeSample {
    let theta = angle_deg.to_radians();
    let channel = |u: f32| (PHOTODIODE_AMPLITUDE * (u + 1.0)) as i16;
    PhotodiodeSample {
        red: channel(-theta.cos()),
        green: channel(-(theta - 30f32.to_radians()).sin()),
        blue: channel((theta + 30f32.to_radians()).sin()),
    }
}

/// Generate capture edges at `hz(t)`, `t` in seconds since start.
pub async fn pulse_edges(mut producer: CaptureProducer, hz: impl Fn(f32) -> f32) {
    let start = Instant::now();
    while !producer.is_closed() {
        let rate = hz(start.elapsed().as_secs_f32());
        if rate <= 0.0 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }
        tokio::time::sleep(Duration::from_secs_f32(1.0 / rate)).await;
        producer.on_edge(start.elapsed().as_micros() as u64);
    }
    tracing::debug!(dropped = producer.dropped(), "Pulse generator stopped");
}

/// GNSS receiver at 1 Hz, round-tripped through the UBX parser.
pub async fn gnss(events: mpsc::Sender<Event>) {
    let mut parser = UbxParser::new();
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    let mut fix = GnssFix {
        latitude_deg: 36.9613,
        longitude_deg: -122.0308,
        cog_rad: Some(4.2),
        sog_mps: Some(3.1),
        utc: None,
    };

    loop {
        interval.tick().await;
        fix.latitude_deg -= 0.00001;
        fix.longitude_deg -= 0.00002;
        fix.utc = Some(chrono::Utc::now().naive_utc());

        let bytes = ubx::encode(ubx::CLASS_NAV, ubx::NAV_PVT, &nav_pvt_payload(&fix));
        // Split like a serial read would
        let (head, tail) = bytes.split_at(bytes.len() / 2);
        let mut messages = parser.feed(head);
        messages.extend(parser.feed(tail));

        for message in messages {
            let event = match decode_nav_pvt(&message) {
                Ok(Some(decoded)) => Event::gnss(true, decoded),
                Ok(None) => Event::gnss(false, GnssFix::default()),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring UBX message");
                    continue;
                }
            };
            if !offer(&events, event) {
                tracing::error!("Failed to send GNSS fix - engine may have stopped");
                return;
            }
        }
    }
}

/// A display polling the attitude calibration every 30 s.
pub async fn calibration_client(
    inbox: mpsc::UnboundedSender<N2kMessage>,
    identity: ProprietaryIdentity,
    destination: u8,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let request = encode_request(PGN_IMU_CALIBRATION, &identity.pairs(), proprietary_field_width, destination)
            .with_source(DISPLAY_ADDRESS);
        if inbox.send(request).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sci2000_core::awa::AwaDecoder;

    #[test]
    fn test_photodiode_sample_decodes() {
        let decoder = AwaDecoder::default();
        for deg in [25.0f32, 40.0, 55.0] {
            let angle = decoder.decode(photodiode_sample(deg)).unwrap();
            assert!((angle.to_degrees() - deg).abs() < 0.5, "{} -> {}", deg, angle.to_degrees());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_engine_channel_never_stalls_sensor() {
        let (tx, mut rx) = mpsc::channel(1);
        let task = tokio::spawn(attitude(tx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!task.is_finished());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        drop(rx);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("sensor keeps running after the engine is gone")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_gnss_round_trips_through_parser() {
        let (tx, mut rx) = mpsc::channel(4);
        let task = tokio::spawn(gnss(tx));

        let event = rx.recv().await.unwrap();
        assert!(event.valid);
        let sci2000_core::EventPayload::Gnss(fix) = event.payload else {
            panic!("expected a GNSS event, got {:?}", event.payload);
        };
        assert!((fix.latitude_deg - 36.96129).abs() < 1e-6);
        assert!(fix.utc.is_some());
        task.abort();
    }
}
