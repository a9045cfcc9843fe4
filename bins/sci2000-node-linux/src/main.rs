mod bus;
mod sim;
mod storage;

use std::path::PathBuf;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sci2000_core::{Event, NodeConfig, PulseChannel};
use sci2000_engine::{capture_channel, PublicationEngine, PulseCounter};
use sci2000_protocol::ProprietaryIdentity;

use crate::bus::{LogIndicator, TracingBus};
use crate::storage::JsonFileStorage;

/// Depth of the engine's event channel.
const EVENT_QUEUE_DEPTH: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sci2000_engine=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("sci2000 node starting...");

    let config = load_config()?;
    let calibration_path = std::env::var("SCI2000_CALIBRATION")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("sci2000-calibration.json"));
    let storage = JsonFileStorage::open_or_empty(calibration_path);
    tracing::info!(path = %storage.path().display(), "Calibration storage ready");

    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

    let engine = PublicationEngine::new(config.clone(), TracingBus::new(inbox_rx), storage, LogIndicator);
    let devices = engine.devices();
    event_tx.send(Event::bus_availability(true)).await?;
    let engine_handle = tokio::spawn(engine.run(event_rx));

    // Simulated sensors for the enabled groups
    if config.groups.heading || config.groups.attitude {
        tokio::spawn(sim::attitude(event_tx.clone()));
    }
    if config.groups.wind {
        tokio::spawn(sim::photodiode(event_tx.clone()));
        let (producer, captures) = capture_channel();
        let counter = PulseCounter::new(PulseChannel::ApparentWindSpeed, &config.pulse_counter);
        tokio::spawn(counter.run(captures, event_tx.clone()));
        tokio::spawn(sim::pulse_edges(producer, |t| 5.0 + 1.5 * (t / 20.0).sin()));
    }
    if config.groups.water_speed {
        let (producer, captures) = capture_channel();
        let counter = PulseCounter::new(PulseChannel::SpeedOverWater, &config.pulse_counter);
        tokio::spawn(counter.run(captures, event_tx.clone()));
        tokio::spawn(sim::pulse_edges(producer, |t| 24.0 + 4.0 * (t / 45.0).sin()));
    }
    if config.groups.gnss {
        tokio::spawn(sim::gnss(event_tx.clone()));
    }
    if let Some(device) = devices.attitude {
        let identity = ProprietaryIdentity::new(config.identity.manufacturer_code, config.identity.industry_code);
        tokio::spawn(sim::calibration_client(inbox_tx.clone(), identity, TracingBus::address(device)));
    }
    drop(event_tx);

    tracing::info!(groups = ?config.groups.enabled(), "sci2000 node ready");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        result = engine_handle => match result {
            Ok(engine) => tracing::warn!(health = ?engine.health(), "Publication engine stopped"),
            Err(e) => tracing::error!("Publication engine task failed: {}", e),
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Configuration from the file named by argv[1] or `SCI2000_CONFIG`, else
/// defaults.
fn load_config() -> anyhow::Result<NodeConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SCI2000_CONFIG").ok());
    let Some(path) = path else {
        tracing::info!("No configuration file, using defaults");
        return Ok(NodeConfig::default());
    };

    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    let config = NodeConfig::from_json(&text).with_context(|| format!("parsing {}", path))?;
    tracing::info!(path = %path, "Configuration loaded");
    Ok(config)
}
