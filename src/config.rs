use crate::controller::{DeviceKind, ModeDefaults, Thresholds};
use crate::mqtt::MqttConfig;
use crate::sensor::Calibration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = ".config/greenhouse";
const CONFIG_FILE: &str = "config.toml";
pub const CONFIG_ENV: &str = "GREENHOUSE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GardenConfig {
    pub mqtt: MqttConfig,
    pub control: ControlConfig,
    pub hardware: HardwareConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub tick_interval_ms: u64,
    /// Drop malformed threshold updates instead of storing 0
    pub strict_thresholds: bool,
    pub modes: ModeDefaults,
    pub thresholds: Thresholds,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            strict_thresholds: false,
            modes: ModeDefaults::default(),
            thresholds: Thresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareBackend {
    #[default]
    Simulated,
    RaspberryPi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub backend: HardwareBackend,
    /// 4095 for a 12-bit converter; use 1023 with the MCP3008
    pub moisture_full_scale: f32,
    pub light_full_scale: f32,
    /// BCM pin numbers
    pub pump_pin: u8,
    pub light_pin: u8,
    pub fan_pin: u8,
    pub relay_active_low: bool,
    pub moisture_channel: u8,
    pub light_channel: u8,
    /// IIO device of the DHT climate sensor
    pub climate_dir: PathBuf,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            backend: HardwareBackend::Simulated,
            moisture_full_scale: 4095.0,
            light_full_scale: 1023.0,
            pump_pin: 17,
            light_pin: 27,
            fan_pin: 22,
            relay_active_low: true,
            moisture_channel: 0,
            light_channel: 1,
            climate_dir: PathBuf::from("/sys/bus/iio/devices/iio:device0"),
        }
    }
}

impl HardwareConfig {
    pub fn calibration(&self) -> Calibration {
        Calibration {
            moisture_full_scale: self.moisture_full_scale,
            light_full_scale: self.light_full_scale,
        }
    }

    pub fn relay_pins(&self) -> [(DeviceKind, u8); 3] {
        [
            (DeviceKind::Pump, self.pump_pin),
            (DeviceKind::Light, self.light_pin),
            (DeviceKind::Fan, self.fan_pin),
        ]
    }
}

impl GardenConfig {
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: GardenConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "control.tick_interval_ms must be positive".into(),
            ));
        }
        if self.mqtt.reconnect_backoff_ms == 0 {
            return Err(ConfigError::Invalid(
                "mqtt.reconnect_backoff_ms must be positive".into(),
            ));
        }
        if self.mqtt.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "mqtt.channel_capacity must be positive".into(),
            ));
        }
        if self.mqtt.namespace.trim_matches('/').is_empty() {
            return Err(ConfigError::Invalid("mqtt.namespace is empty".into()));
        }

        let hw = &self.hardware;
        if !(hw.moisture_full_scale > 0.0 && hw.light_full_scale > 0.0) {
            return Err(ConfigError::Invalid(
                "ADC full-scale values must be positive".into(),
            ));
        }
        if hw.backend == HardwareBackend::RaspberryPi {
            let pins: HashSet<u8> = hw.relay_pins().iter().map(|&(_, pin)| pin).collect();
            if pins.len() != 3 {
                return Err(ConfigError::Invalid(
                    "relay pins must be distinct".into(),
                ));
            }
            if hw.moisture_channel > 7 || hw.light_channel > 7 {
                return Err(ConfigError::Invalid(
                    "MCP3008 channels are 0-7".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.control.tick_interval_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.mqtt.reconnect_backoff_ms)
    }
}

/// `~/.config/greenhouse/config.toml`
pub fn default_config_path() -> PathBuf {
    let mut path = dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    });
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}

/// Command line argument first, then the environment, then the default location
pub fn resolve_config_path(arg: Option<String>, env: Option<String>) -> PathBuf {
    arg.or(env)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path)
}

/// Writes a default config to `path` unless a file is already there.
/// Returns whether a file was written.
pub async fn ensure_default_config(path: &Path) -> Result<bool, ConfigError> {
    let exists = tokio::fs::try_exists(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    if exists {
        debug!("Config file {} exists", path.display());
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    let content = toml::to_string_pretty(&GardenConfig::default())?;
    tokio::fs::write(path, content)
        .await
        .map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    info!("Wrote default config to {}", path.display());
    Ok(true)
}
