//! Physical outputs behind the device controller.

use crate::controller::device::DeviceKind;
use rppal::gpio::{Gpio, Level, OutputPin};
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[error("No output configured for {0}")]
    Unconfigured(DeviceKind),
}

/// Drives the relay (or whatever switches the load) of each device
pub trait Actuators {
    fn drive(&mut self, device: DeviceKind, on: bool) -> Result<(), ActuatorError>;
}

/// In-memory outputs for host runs
#[derive(Debug, Default)]
pub struct SimulatedActuators {
    outputs: HashMap<DeviceKind, bool>,
}

impl SimulatedActuators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self, device: DeviceKind) -> bool {
        self.outputs.get(&device).copied().unwrap_or(false)
    }
}

impl Actuators for SimulatedActuators {
    fn drive(&mut self, device: DeviceKind, on: bool) -> Result<(), ActuatorError> {
        let previous = self.outputs.insert(device, on);
        if previous != Some(on) {
            info!("[sim] {} output {}", device, if on { "HIGH" } else { "LOW" });
        }
        Ok(())
    }
}

/// Relay module on Raspberry Pi GPIO pins (BCM numbering)
pub struct RelayBoard {
    pins: HashMap<DeviceKind, OutputPin>,
    active_low: bool,
}

impl RelayBoard {
    /// Claims the pins and switches every relay off
    pub fn open(pins: &[(DeviceKind, u8)], active_low: bool) -> Result<Self, ActuatorError> {
        let gpio = Gpio::new()?;
        let mut outputs = HashMap::new();
        for &(device, bcm) in pins {
            let pin = gpio.get(bcm)?;
            // Come up in the OFF level so the relay never clicks on at boot
            let output = match relay_level(false, active_low) {
                Level::High => pin.into_output_high(),
                Level::Low => pin.into_output_low(),
            };
            info!("Relay for {} on GPIO{}", device, bcm);
            outputs.insert(device, output);
        }
        Ok(Self {
            pins: outputs,
            active_low,
        })
    }
}

/// Output level that puts a relay in the requested state
pub fn relay_level(on: bool, active_low: bool) -> Level {
    if on != active_low {
        Level::High
    } else {
        Level::Low
    }
}

impl Actuators for RelayBoard {
    fn drive(&mut self, device: DeviceKind, on: bool) -> Result<(), ActuatorError> {
        let pin = self
            .pins
            .get_mut(&device)
            .ok_or(ActuatorError::Unconfigured(device))?;
        pin.write(relay_level(on, self.active_low));
        debug!("GPIO{} -> {}", pin.pin(), if on { "ON" } else { "OFF" });
        Ok(())
    }
}
