//! Deterministic sensor bank for host runs without attached hardware.

use super::{checked, light_percent, moisture_percent, Calibration, SensorBank, SensorSnapshot};
use tracing::debug;

/// Produces slowly drifting readings so automatic control can be watched on a desk.
///
/// Raw ADC codes follow triangle waves; climate values follow sine waves with a
/// period of a few minutes at the default one-second tick.
#[derive(Debug, Clone)]
pub struct SimulatedSensors {
    calibration: Calibration,
    tick: u64,
}

impl SimulatedSensors {
    pub fn new(calibration: Calibration) -> Self {
        Self {
            calibration,
            tick: 0,
        }
    }
}

fn triangle(tick: u64, period: u64, low: u16, high: u16) -> u16 {
    let span = u64::from(high - low);
    let phase = tick % period;
    let half = period / 2;
    let offset = if phase < half {
        phase * span / half
    } else {
        (period - phase) * span / half
    };
    low + offset as u16
}

impl SensorBank for SimulatedSensors {
    fn sample(&mut self) -> SensorSnapshot {
        self.tick = self.tick.wrapping_add(1);
        let t = self.tick as f32;

        let moisture_raw = triangle(self.tick, 240, 1200, 3800);
        let light_raw = triangle(self.tick, 600, 0, 1023);
        let temperature = 26.0 + 6.0 * (t / 90.0).sin();
        let humidity = 65.0 + 20.0 * (t / 150.0).cos();

        debug!(
            "Simulated sample #{}: moisture_raw={} light_raw={}",
            self.tick, moisture_raw, light_raw
        );

        SensorSnapshot {
            moisture: Ok(moisture_percent(
                moisture_raw,
                self.calibration.moisture_full_scale,
            )),
            temperature: checked(temperature),
            humidity: checked(humidity),
            light: Ok(light_percent(light_raw, self.calibration.light_full_scale)),
        }
    }
}
