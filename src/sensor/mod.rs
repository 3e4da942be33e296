//! Sensor Reader
//!
//! Converts raw ADC codes and climate sensor readings into calibrated physical
//! quantities. Calibration is a plain linear scale against the converter's
//! full-scale code; implausible raw values are passed through unchanged so the
//! caller sees exactly what the hardware reported.
//!
//! Every metric in a [`SensorSnapshot`] is a `Result`: a failed read or a
//! non-finite value (a disconnected DHT sensor reports NaN) surfaces as a
//! [`SensorError`] instead of a sentinel that would silently compare false
//! against every threshold.

pub mod raspberry;
pub mod simulated;

use std::fmt;

pub use raspberry::RaspberryPiSensors;
pub use simulated::SimulatedSensors;

/// Physical quantities sampled once per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Moisture,
    Temperature,
    Humidity,
    Light,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Moisture,
        Metric::Temperature,
        Metric::Humidity,
        Metric::Light,
    ];

    /// Topic segment used for readings (`<ns>/<metric>`) and thresholds (`<ns>/set_<metric>`)
    pub fn name(self) -> &'static str {
        match self {
            Metric::Moisture => "moisture",
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::Light => "light",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorError {
    #[error("Sensor reported a non-finite value")]
    NotANumber,

    #[error("Bus transfer failed: {0}")]
    Bus(String),

    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Malformed sensor output: {0}")]
    Malformed(String),
}

/// Full-scale constants of the analog converters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub moisture_full_scale: f32,
    pub light_full_scale: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            moisture_full_scale: 4095.0,
            light_full_scale: 1023.0,
        }
    }
}

/// One reading of every sensor. Produced once per tick and never retained.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSnapshot {
    pub moisture: Result<f32, SensorError>,
    pub temperature: Result<f32, SensorError>,
    pub humidity: Result<f32, SensorError>,
    pub light: Result<f32, SensorError>,
}

impl SensorSnapshot {
    pub fn get(&self, metric: Metric) -> &Result<f32, SensorError> {
        match metric {
            Metric::Moisture => &self.moisture,
            Metric::Temperature => &self.temperature,
            Metric::Humidity => &self.humidity,
            Metric::Light => &self.light,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, &Result<f32, SensorError>)> {
        Metric::ALL.into_iter().map(move |metric| (metric, self.get(metric)))
    }
}

/// Source of calibrated readings, sampled by the control loop on every tick.
///
/// Implementations must return promptly; the tick never waits on network I/O.
pub trait SensorBank {
    fn sample(&mut self) -> SensorSnapshot;
}

/// Soil moisture in percent. A dry soil sensor reads near full scale, so the scale is inverted.
pub fn moisture_percent(raw: u16, full_scale: f32) -> f32 {
    100.0 - (f32::from(raw) / full_scale) * 100.0
}

/// Ambient light in percent of full scale
pub fn light_percent(raw: u16, full_scale: f32) -> f32 {
    (f32::from(raw) / full_scale) * 100.0
}

/// Rejects the NaN/inf sentinels some climate sensors report when disconnected
pub fn checked(value: f32) -> Result<f32, SensorError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SensorError::NotANumber)
    }
}
