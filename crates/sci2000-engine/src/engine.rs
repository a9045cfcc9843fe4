//! The publication engine.
//!
//! One struct owns everything a node needs at run time: the bus, the link
//! indicator, calibration, fused sensor state, schedules and the calibration
//! PGN handlers. Sensor workers talk to it only through the event channel
//! consumed by [`PublicationEngine::run`].
//!
//! Every loop iteration waits at most [`EVENT_POLL_TIMEOUT`] for an event,
//! then unconditionally pumps the bus and checks the schedules, so a burst
//! of events cannot starve publication.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use sci2000_core::angle::{wrap_360, wrap_pi, wrap_two_pi};
use sci2000_core::awa::AwaDecoder;
use sci2000_core::filter::LowPassFilter;
use sci2000_core::pulse::knots_to_mps;
use sci2000_core::true_wind::{compute_true_wind, Wind};
use sci2000_core::{
    CalibrationAxis, CalibrationStorage, CalibrationStore, Event, EventPayload, FusionStore, MessageGroup,
    NodeConfig, ScheduleSet,
};
use sci2000_protocol::group_function::ProprietaryIdentity;
use sci2000_protocol::pgn::{self, DirectionReference, SequenceId, TimeSource, WindReference, PGN_GROUP_FUNCTION};
use sci2000_protocol::N2kMessage;

use crate::bus::{BusHealth, BusNotification, DeviceIdentity, DeviceIndex, LinkIndicator, N2kBus};
use crate::calibration_handler::{CalibrationPgnHandler, FieldTable, HandlerError, HandlerOutcome};

/// Longest wait for an event before the schedules are checked again.
pub const EVENT_POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Virtual devices registered with the bus, per role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Devices {
    pub attitude: Option<DeviceIndex>,
    pub wind: Option<DeviceIndex>,
    pub water_speed: Option<DeviceIndex>,
    pub gnss: Option<DeviceIndex>,
}

impl Devices {
    fn for_group(&self, group: MessageGroup) -> Option<DeviceIndex> {
        match group {
            MessageGroup::Heading | MessageGroup::Attitude => self.attitude,
            MessageGroup::Wind => self.wind,
            MessageGroup::WaterSpeed => self.water_speed,
            MessageGroup::Gnss => self.gnss,
        }
    }
}

/// Sensor fusion and NMEA 2000 publication for one node.
pub struct PublicationEngine<B, S, L> {
    config: NodeConfig,
    bus: B,
    indicator: L,
    calibration: CalibrationStore<S>,
    store: FusionStore,
    schedules: ScheduleSet,
    awa_decoder: AwaDecoder,
    awa_filter: LowPassFilter,
    last_awa_sample: Option<Instant>,
    handlers: Vec<CalibrationPgnHandler>,
    devices: Devices,
    sid: SequenceId,
    health: BusHealth,
    open: bool,
}

impl<B, S, L> PublicationEngine<B, S, L>
where
    B: N2kBus,
    S: CalibrationStorage,
    L: LinkIndicator,
{
    /// Build the engine and register a virtual device (and its calibration
    /// PGN, if any) for every enabled group.
    pub fn new(config: NodeConfig, mut bus: B, storage: S, indicator: L) -> Self {
        let identity = ProprietaryIdentity::new(
            config.identity.manufacturer_code,
            config.identity.industry_code,
        );
        let groups = config.groups.enabled();

        let mut devices = Devices::default();
        let mut handlers = Vec::new();
        let mut register = |device: DeviceIdentity, table: Option<FieldTable>| {
            let index = bus.register_device(&device.with_identity(identity));
            if let Some(table) = table {
                bus.register_calibration_pgn(table.pgn, index, identity);
                handlers.push(CalibrationPgnHandler::new(table, identity, index));
            }
            index
        };

        if config.groups.heading || config.groups.attitude {
            devices.attitude = Some(register(DeviceIdentity::attitude(), Some(FieldTable::imu())));
        }
        if config.groups.wind {
            devices.wind = Some(register(DeviceIdentity::wind(), Some(FieldTable::mhu())));
        }
        if config.groups.water_speed {
            devices.water_speed = Some(register(DeviceIdentity::water_speed(), Some(FieldTable::speed())));
        }
        if config.groups.gnss {
            devices.gnss = Some(register(DeviceIdentity::gnss(), None));
        }

        info!(?groups, ?devices, "Publication engine created");

        Self {
            calibration: CalibrationStore::new(storage),
            store: FusionStore::new(config.timeouts.clone()),
            schedules: ScheduleSet::from_config(&config.schedules, &groups),
            awa_decoder: AwaDecoder::new(config.wind.min_amplitude),
            awa_filter: LowPassFilter::new(config.wind.awa_cutoff_hz),
            last_awa_sample: None,
            handlers,
            devices,
            sid: SequenceId::default(),
            health: BusHealth::default(),
            open: false,
            config,
            bus,
            indicator,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn indicator(&self) -> &L {
        &self.indicator
    }

    pub fn calibration(&self) -> &CalibrationStore<S> {
        &self.calibration
    }

    pub fn store(&self) -> &FusionStore {
        &self.store
    }

    pub fn devices(&self) -> Devices {
        self.devices
    }

    pub fn health(&self) -> BusHealth {
        self.health
    }

    /// True once the bus has reported address claim.
    pub fn is_open(&self) -> bool {
        self.open
    }

    // ========================================================================
    // Event intake
    // ========================================================================

    /// Apply one sensor event.
    pub fn handle_event(&mut self, event: &Event, now: Instant) {
        match &event.payload {
            EventPayload::Photodiode(sample) => {
                let decoded = if event.valid {
                    self.awa_decoder.decode(*sample)
                } else {
                    None
                };
                match decoded {
                    Some(angle) => {
                        let dt = self
                            .last_awa_sample
                            .map(|last| now.saturating_duration_since(last).as_secs_f32())
                            .unwrap_or(0.0);
                        self.last_awa_sample = Some(now);
                        let filtered = self.awa_filter.filter_angle(angle, dt);
                        self.store.set_wind_angle(filtered, true, now);
                    }
                    None => {
                        trace!("Photodiode sample rejected");
                        self.awa_filter.reset();
                        self.last_awa_sample = None;
                        self.store.set_wind_angle(0.0, false, now);
                    }
                }
            }
            EventPayload::BusAvailability { available } => {
                debug!(available, "Bus availability changed");
                self.indicator.set_bus_state(*available);
            }
            _ => {
                if !self.store.update(event, now) {
                    debug!(source = ?event.source(), "Ignoring event");
                }
            }
        }
    }

    // ========================================================================
    // Bus pump and schedules
    // ========================================================================

    /// Pump the bus, answer calibration traffic and publish due groups.
    pub fn poll(&mut self, now: Instant) {
        for notification in self.bus.pump_incoming() {
            match notification {
                BusNotification::Opened => {
                    info!("Bus open, starting schedules");
                    self.open = true;
                    self.schedules.reset_all(now);
                }
                BusNotification::Message { device, message } => {
                    if message.pgn == PGN_GROUP_FUNCTION {
                        self.handle_group_function(device, &message);
                    } else {
                        trace!(pgn = message.pgn, "Ignoring received message");
                    }
                }
            }
        }

        for group in self.schedules.due(now) {
            self.publish(group, now);
        }
    }

    fn handle_group_function(&mut self, device: DeviceIndex, message: &N2kMessage) {
        let mut reader = message.reader();
        let target = reader.skip(1).and_then(|_| reader.read_u24());
        let Ok(target) = target else {
            warn!(source = message.source, "Truncated group function");
            return;
        };

        let status = self.store.imu_status_byte();
        let policy = self.config.command_policy;
        let Some(handler) = self.handlers.iter_mut().find(|h| h.pgn() == target) else {
            trace!(pgn = target, ?device, "Group function for a PGN we do not handle");
            return;
        };

        match handler.handle_group_function(message, &mut self.calibration, policy, status) {
            Ok(HandlerOutcome::Reply(reply)) => {
                let device = handler.device();
                self.send(&reply, device);
            }
            Ok(HandlerOutcome::Updated(updated)) => {
                debug!(pgn = target, ?updated, "Calibration command applied");
            }
            Err(HandlerError::Gating(e)) => {
                debug!(pgn = target, source = message.source, "Ignoring group function: {}", e);
            }
            Err(e) => {
                warn!(pgn = target, source = message.source, error = %e, "Bad group function");
            }
        }
    }

    fn send(&mut self, message: &N2kMessage, device: DeviceIndex) {
        let ok = self.bus.send_message(message, device);
        if self.health.record(ok) {
            self.indicator.set_transmit_ok(ok);
        }
        if !ok {
            warn!(pgn = message.pgn, failures = self.health.consecutive_failures, "Send failed");
        }
    }

    // ========================================================================
    // Publication
    // ========================================================================

    fn publish(&mut self, group: MessageGroup, now: Instant) {
        let Some(device) = self.devices.for_group(group) else {
            return;
        };
        let sid = self.sid.next();
        trace!(%group, sid, "Publishing");

        let messages = match group {
            MessageGroup::Heading => vec![self.heading_message(sid, now)],
            MessageGroup::Attitude => vec![self.attitude_message(sid, now)],
            MessageGroup::Wind => self.wind_messages(sid, now),
            MessageGroup::WaterSpeed => vec![pgn::speed_water(sid, self.water_speed_mps(now))],
            MessageGroup::Gnss => self.gnss_messages(sid, now),
        };
        for message in messages {
            self.send(&message, device);
        }
    }

    /// Heading in degrees after deviation and calibration offset.
    pub fn corrected_heading_deg(&self, now: Instant) -> Option<f32> {
        let reading = self.store.attitude(now).get()?;
        let deviation = self
            .config
            .deviation
            .map(|d| d.deviation_deg(reading.heading_deg))
            .unwrap_or(0.0);
        let offset = self.calibration.values().offset_deg(CalibrationAxis::HeadingOffset);
        Some(wrap_360(reading.heading_deg + deviation + offset))
    }

    fn heading_message(&self, sid: u8, now: Instant) -> N2kMessage {
        let heading = self.corrected_heading_deg(now).map(f32::to_radians);
        pgn::vessel_heading(sid, heading, None, None, DirectionReference::Magnetic)
    }

    fn attitude_message(&self, sid: u8, now: Instant) -> N2kMessage {
        let values = self.calibration.values();
        let reading = self.store.attitude(now).get();
        let yaw = self.corrected_heading_deg(now).map(|h| wrap_pi(h.to_radians()));
        let pitch = reading
            .map(|r| wrap_pi((r.pitch_deg + values.offset_deg(CalibrationAxis::PitchOffset)).to_radians()));
        let roll =
            reading.map(|r| wrap_pi((r.roll_deg + values.offset_deg(CalibrationAxis::RollOffset)).to_radians()));
        pgn::attitude(sid, yaw, pitch, roll)
    }

    /// Calibrated apparent wind angle in radians.
    pub fn apparent_wind_angle(&self, now: Instant) -> Option<f32> {
        let angle = self.store.wind_angle(now).get()?;
        let offset = self.calibration.values().offset_deg(CalibrationAxis::AwaOffset);
        Some(wrap_two_pi(angle + offset.to_radians()))
    }

    /// Calibrated apparent wind speed in knots.
    pub fn apparent_wind_speed_kts(&self, now: Instant) -> Option<f32> {
        let hz = self.store.wind_speed_hz(now).get()?;
        let factor = self.calibration.values().factor(CalibrationAxis::AwsFactor);
        Some(self.config.wind.speed.speed_knots(hz) * factor)
    }

    /// Calibrated speed through water in knots.
    pub fn water_speed_kts(&self, now: Instant) -> Option<f32> {
        let hz = self.store.water_speed_hz(now).get()?;
        let factor = self.calibration.values().factor(CalibrationAxis::SowFactor);
        Some(self.config.water.speed.speed_knots(hz) * factor)
    }

    fn water_speed_mps(&self, now: Instant) -> Option<f32> {
        self.water_speed_kts(now).map(knots_to_mps)
    }

    fn wind_messages(&self, sid: u8, now: Instant) -> Vec<N2kMessage> {
        let awa = self.apparent_wind_angle(now);
        let aws = self.apparent_wind_speed_kts(now);
        let mut messages = vec![pgn::wind(sid, aws.map(knots_to_mps), awa, WindReference::Apparent)];

        if self.config.wind.publish_true_wind {
            let true_wind = match (awa, aws, self.water_speed_kts(now)) {
                (Some(angle), Some(speed), Some(boat)) => {
                    let apparent = Wind { speed, angle };
                    match compute_true_wind(apparent, boat) {
                        Ok(wind) => Some(wind),
                        Err(e) => {
                            debug!(error = %e, "True wind unavailable, using apparent");
                            Some(apparent)
                        }
                    }
                }
                _ => None,
            };
            messages.push(pgn::wind(
                sid,
                true_wind.map(|w| knots_to_mps(w.speed)),
                true_wind.map(|w| w.angle),
                WindReference::TrueBoat,
            ));
        }
        messages
    }

    fn gnss_messages(&self, sid: u8, now: Instant) -> Vec<N2kMessage> {
        let fix = self.store.gnss(now).get();
        vec![
            pgn::position_rapid(fix.map(|f| f.latitude_deg), fix.map(|f| f.longitude_deg)),
            pgn::cog_sog_rapid(sid, fix.and_then(|f| f.cog_rad), fix.and_then(|f| f.sog_mps)),
            pgn::system_time(sid, fix.and_then(|f| f.utc), TimeSource::Gps),
        ]
    }

    // ========================================================================
    // Main loop
    // ========================================================================

    /// Consume events until every sender is dropped, then hand the engine
    /// back.
    pub async fn run(mut self, mut events: mpsc::Receiver<Event>) -> Self {
        info!("Publication engine running");
        loop {
            match tokio::time::timeout(EVENT_POLL_TIMEOUT, events.recv()).await {
                Ok(Some(event)) => self.handle_event(&event, tokio::time::Instant::now().into_std()),
                Ok(None) => break,
                Err(_) => {}
            }
            self.poll(tokio::time::Instant::now().into_std());
        }
        info!(health = ?self.health, "Event channel closed, engine stopping");
        self
    }
}
