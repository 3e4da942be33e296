pub mod config;
pub mod controller;
pub mod driver;
pub mod mqtt;
pub mod router;
pub mod sensor;

#[cfg(test)]
mod testing;

use crate::config::{GardenConfig, HardwareBackend, HardwareConfig};
use crate::controller::{Actuators, ControllerState, RelayBoard, SimulatedActuators};
use crate::driver::{ControlLoop, GardenLoop};
use crate::mqtt::{identity, supervise, ConnectionState, MqttHandler, MqttPublisher, RumqttLink};
use crate::router::{MessageRouter, TopicTable};
use crate::sensor::{RaspberryPiSensors, SensorBank, SimulatedSensors};
use color_eyre::{eyre::eyre, Result};
use rumqttc::AsyncClient;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup()?;

    let config = setup_config().await?;
    let topics = TopicTable::new(&config.mqtt.namespace);

    let address = identity::resolve_address(config.mqtt.hardware_address.as_deref());
    let client_id = identity::client_id(&config.mqtt.client_tag, &address);
    let (link, client) = RumqttLink::new(&config.mqtt, &client_id, topics.lwt())
        .map_err(|e| eyre!("Failed to set up MQTT link: {}", e))?;

    let (inbound_tx, inbound_rx) = mpsc::channel(config.mqtt.channel_capacity);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let shutdown = CancellationToken::new();

    let handler = MqttHandler::create(
        Box::new(link),
        topics.subscriptions(),
        config.reconnect_backoff(),
        inbound_tx,
        state_tx,
    );
    let supervisor = tokio::spawn(supervise(handler, shutdown.clone()));

    tokio::spawn(shutdown_on_ctrl_c(
        client.clone(),
        state_rx.clone(),
        shutdown.clone(),
    ));

    let (sensors, actuators) = build_hardware(&config.hardware)?;
    let garden = GardenLoop::new(
        ControllerState::new(&config.control.modes, config.control.thresholds),
        MessageRouter::new(topics, config.control.strict_thresholds),
        ControlLoop::new(sensors),
        actuators,
        Box::new(MqttPublisher::new(client, state_rx)),
        inbound_rx,
        config.tick_interval(),
    );

    info!("Greenhouse controller {} running", client_id);
    let _final_state = garden.run(shutdown.clone()).await;

    if let Err(e) = supervisor.await {
        warn!("MQTT supervisor ended abnormally: {}", e);
    }
    info!("Shutdown complete");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

async fn setup_config() -> Result<GardenConfig> {
    let path = config::resolve_config_path(
        std::env::args().nth(1),
        std::env::var(config::CONFIG_ENV).ok(),
    );
    if path == config::default_config_path() {
        config::ensure_default_config(&path).await?;
    }
    let config = GardenConfig::load(&path).await?;
    debug!(
        "Effective config: control {:?}, hardware {:?}",
        config.control, config.hardware
    );
    Ok(config)
}

fn build_hardware(
    hardware: &HardwareConfig,
) -> Result<(Box<dyn SensorBank>, Box<dyn Actuators>)> {
    match hardware.backend {
        HardwareBackend::Simulated => {
            info!("Using simulated sensors and actuators");
            Ok((
                Box::new(SimulatedSensors::new(hardware.calibration())),
                Box::new(SimulatedActuators::new()),
            ))
        }
        HardwareBackend::RaspberryPi => {
            let sensors = RaspberryPiSensors::open(
                hardware.calibration(),
                hardware.moisture_channel,
                hardware.light_channel,
                hardware.climate_dir.clone(),
            )
            .map_err(|e| eyre!("Failed to open sensors: {}", e))?;
            let relays = RelayBoard::open(&hardware.relay_pins(), hardware.relay_active_low)
                .map_err(|e| eyre!("Failed to open relay board: {}", e))?;
            Ok((Box::new(sensors), Box::new(relays)))
        }
    }
}

/// Signs off from the broker before stopping so the last-will is not delivered
async fn shutdown_on_ctrl_c(
    client: AsyncClient,
    mut connection: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        return;
    }
    info!("Ctrl-C received, shutting down");

    if *connection.borrow() == ConnectionState::Connected {
        match client.try_disconnect() {
            Ok(()) => {
                // The supervisor keeps polling until the disconnect is flushed
                let flushed = tokio::time::timeout(
                    DISCONNECT_GRACE,
                    connection.wait_for(|state| *state != ConnectionState::Connected),
                )
                .await
                .is_ok();
                if !flushed {
                    debug!("Broker did not confirm disconnect within {:?}", DISCONNECT_GRACE);
                }
            }
            Err(e) => warn!("Clean MQTT disconnect failed: {}", e),
        }
    }
    shutdown.cancel();
}
