//! Pulse capture handoff and the counting worker.
//!
//! The capture side ([`CaptureProducer`]) runs in interrupt-like context: it
//! differences timestamps and does a non-blocking send on a short bounded
//! channel, dropping the capture when the channel is full. The counting
//! worker ([`PulseCounter`]) turns intervals into a filtered frequency and
//! publishes it as an [`Event`].

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

use sci2000_core::config::PulseCounterConfig;
use sci2000_core::filter::LowPassFilter;
use sci2000_core::pulse::{pulse_frequency_hz, InterPulseTimer};
use sci2000_core::{Event, PulseChannel};

/// Depth of the capture channel.
pub const CAPTURE_QUEUE_DEPTH: usize = 10;

/// Create a connected capture producer and interval receiver.
pub fn capture_channel() -> (CaptureProducer, mpsc::Receiver<u64>) {
    let (tx, rx) = mpsc::channel(CAPTURE_QUEUE_DEPTH);
    (CaptureProducer::new(tx), rx)
}

/// Capture-context side of the handoff.
#[derive(Debug)]
pub struct CaptureProducer {
    timer: InterPulseTimer,
    tx: mpsc::Sender<u64>,
    dropped: u64,
}

impl CaptureProducer {
    pub fn new(tx: mpsc::Sender<u64>) -> Self {
        Self {
            timer: InterPulseTimer::new(),
            tx,
            dropped: 0,
        }
    }

    /// Record a capture at `now_us`. Returns true if an interval was queued.
    pub fn on_edge(&mut self, now_us: u64) -> bool {
        let Some(interval_us) = self.timer.on_edge(now_us) else {
            return false;
        };
        match self.tx.try_send(interval_us) {
            Ok(()) => true,
            Err(_) => {
                self.dropped += 1;
                false
            }
        }
    }

    /// Captures dropped because the worker fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// True once the counting worker has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Counting worker for one pulse input.
#[derive(Debug, Clone)]
pub struct PulseCounter {
    channel: PulseChannel,
    pulses_per_capture: u32,
    receive_timeout: Duration,
    filter: LowPassFilter,
    dropped_events: u64,
}

impl PulseCounter {
    pub fn new(channel: PulseChannel, config: &PulseCounterConfig) -> Self {
        Self {
            channel,
            pulses_per_capture: config.pulses_per_capture,
            receive_timeout: Duration::from_millis(config.receive_timeout_ms),
            filter: LowPassFilter::new(config.cutoff_hz),
            dropped_events: 0,
        }
    }

    /// Frequency events dropped because the engine's channel was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    /// Frequency for one capture interval, filtered.
    pub fn on_interval(&mut self, interval_us: u64) -> f32 {
        let hz = pulse_frequency_hz(self.pulses_per_capture, interval_us);
        self.filter.filter(hz, interval_us as f32 / 1_000_000.0)
    }

    /// Run until either channel closes, then hand the worker back.
    ///
    /// After `receive_timeout` without a capture the sensor is reported as
    /// stopped: a valid 0 Hz event, and the filter starts over. Events are
    /// handed over with `try_send`; when the engine is behind the event is
    /// dropped and counted so captures keep draining.
    pub async fn run(mut self, mut captures: mpsc::Receiver<u64>, events: mpsc::Sender<Event>) -> Self {
        debug!(channel = ?self.channel, "Pulse counter started");
        loop {
            let hz = match tokio::time::timeout(self.receive_timeout, captures.recv()).await {
                Ok(Some(interval_us)) => {
                    let hz = self.on_interval(interval_us);
                    trace!(channel = ?self.channel, interval_us, hz, "Pulse interval");
                    hz
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(channel = ?self.channel, "No pulses, reporting stopped");
                    self.filter.reset();
                    0.0
                }
            };
            match events.try_send(Event::pulse(true, self.channel, hz)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped_events += 1;
                    trace!(channel = ?self.channel, dropped = self.dropped_events, "Engine busy, event dropped");
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }
        debug!(channel = ?self.channel, dropped_events = self.dropped_events, "Pulse counter stopped");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sci2000_core::EventPayload;

    fn config() -> PulseCounterConfig {
        PulseCounterConfig {
            pulses_per_capture: 1,
            receive_timeout_ms: 10_000,
            cutoff_hz: 0.0,
        }
    }

    #[test]
    fn test_producer_drops_when_full() {
        let (mut producer, _rx) = capture_channel();
        assert!(!producer.on_edge(0));
        for i in 1..=CAPTURE_QUEUE_DEPTH as u64 {
            assert!(producer.on_edge(i * 100_000));
        }
        assert!(!producer.on_edge(2_000_000));
        assert_eq!(producer.dropped(), 1);
    }

    #[test]
    fn test_interval_to_frequency() {
        let mut counter = PulseCounter::new(PulseChannel::SpeedOverWater, &config());
        assert_eq!(counter.on_interval(250_000), 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_emits_frequency_then_zero_on_timeout() {
        let (mut producer, captures) = capture_channel();
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let counter = PulseCounter::new(PulseChannel::ApparentWindSpeed, &config());
        let worker = tokio::spawn(counter.run(captures, events_tx));

        producer.on_edge(1_000_000);
        producer.on_edge(1_500_000);

        let event = events_rx.recv().await.unwrap();
        assert_eq!(
            event.payload,
            EventPayload::PulseFrequency {
                channel: PulseChannel::ApparentWindSpeed,
                hz: 2.0
            }
        );

        // Paused clock auto-advances to the receive timeout
        let event = events_rx.recv().await.unwrap();
        assert!(event.valid);
        assert_eq!(
            event.payload,
            EventPayload::PulseFrequency {
                channel: PulseChannel::ApparentWindSpeed,
                hz: 0.0
            }
        );

        drop(producer);
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_engine_channel_does_not_stall_captures() {
        let (mut producer, captures) = capture_channel();
        let (events_tx, mut events_rx) = mpsc::channel(1);
        events_tx
            .try_send(Event::pulse(true, PulseChannel::SpeedOverWater, 1.0))
            .unwrap();

        let counter = PulseCounter::new(PulseChannel::SpeedOverWater, &config());
        let worker = tokio::spawn(counter.run(captures, events_tx));

        for i in 0..40u64 {
            producer.on_edge(i * 100_000);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(producer.dropped(), 0);

        drop(producer);
        let counter = worker.await.unwrap();
        assert_eq!(counter.dropped_events(), 39);

        // The event queued before the worker started is still the only one
        assert_eq!(
            events_rx.recv().await.unwrap().payload,
            EventPayload::PulseFrequency {
                channel: PulseChannel::SpeedOverWater,
                hz: 1.0
            }
        );
        assert!(events_rx.try_recv().is_err());
    }
}
