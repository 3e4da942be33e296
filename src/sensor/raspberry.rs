//! Sensor access on a Raspberry Pi.
//!
//! Soil moisture and light come from an MCP3008 ADC on SPI0/CE0. Temperature and
//! humidity come from a DHT11/DHT22 bound to the kernel `dht11` IIO driver, which
//! exposes milli-degrees and milli-percent under sysfs.

use super::{
    checked, light_percent, moisture_percent, Calibration, SensorBank, SensorError,
    SensorSnapshot,
};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SPI_CLOCK_HZ: u32 = 1_000_000;
const TEMPERATURE_FILE: &str = "in_temp_input";
const HUMIDITY_FILE: &str = "in_humidityrelative_input";

pub struct RaspberryPiSensors {
    spi: Spi,
    calibration: Calibration,
    moisture_channel: u8,
    light_channel: u8,
    climate_dir: PathBuf,
}

impl RaspberryPiSensors {
    pub fn open(
        calibration: Calibration,
        moisture_channel: u8,
        light_channel: u8,
        climate_dir: PathBuf,
    ) -> Result<Self, SensorError> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, SPI_CLOCK_HZ, Mode::Mode0)
            .map_err(|e| SensorError::Bus(e.to_string()))?;
        info!(
            "Opened MCP3008 on SPI0 (moisture ch{}, light ch{}), climate at {}",
            moisture_channel,
            light_channel,
            climate_dir.display()
        );
        Ok(Self {
            spi,
            calibration,
            moisture_channel,
            light_channel,
            climate_dir,
        })
    }

    /// Single-ended conversion on one MCP3008 channel (10 bit)
    fn read_channel(&mut self, channel: u8) -> Result<u16, SensorError> {
        if channel > 7 {
            return Err(SensorError::Malformed(format!(
                "MCP3008 has no channel {}",
                channel
            )));
        }
        let write = [0x01, (0x08 | channel) << 4, 0x00];
        let mut read = [0u8; 3];
        self.spi
            .transfer(&mut read, &write)
            .map_err(|e| SensorError::Bus(e.to_string()))?;
        Ok(decode_mcp3008(&read))
    }
}

fn decode_mcp3008(frame: &[u8; 3]) -> u16 {
    (u16::from(frame[1] & 0x03) << 8) | u16::from(frame[2])
}

/// Reads a sysfs IIO attribute scaled by 1000
fn read_milli(path: &Path) -> Result<f32, SensorError> {
    let text = fs::read_to_string(path).map_err(|e| SensorError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let milli: i64 = text
        .trim()
        .parse()
        .map_err(|_| SensorError::Malformed(text.trim().to_string()))?;
    checked(milli as f32 / 1000.0)
}

impl SensorBank for RaspberryPiSensors {
    fn sample(&mut self) -> SensorSnapshot {
        let moisture = self
            .read_channel(self.moisture_channel)
            .map(|raw| moisture_percent(raw, self.calibration.moisture_full_scale));
        let light = self
            .read_channel(self.light_channel)
            .map(|raw| light_percent(raw, self.calibration.light_full_scale));
        let temperature = read_milli(&self.climate_dir.join(TEMPERATURE_FILE));
        let humidity = read_milli(&self.climate_dir.join(HUMIDITY_FILE));

        debug!(
            "Hardware sample: moisture={:?} light={:?} temperature={:?} humidity={:?}",
            moisture, light, temperature, humidity
        );

        SensorSnapshot {
            moisture,
            temperature,
            humidity,
            light,
        }
    }
}
