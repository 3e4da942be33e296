use crate::controller::device::{Command, Device, DeviceKind, Measurement, Mode, Transition};
use crate::sensor::Metric;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Comparison values for automatic control, one per metric.
///
/// The fan consults both `temperature` and `humidity`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub moisture: f32,
    pub temperature: f32,
    pub humidity: f32,
    pub light: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            moisture: 20.0,
            temperature: 30.0,
            humidity: 80.0,
            light: 30.0,
        }
    }
}

impl Thresholds {
    pub fn get(&self, metric: Metric) -> f32 {
        match metric {
            Metric::Moisture => self.moisture,
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Light => self.light,
        }
    }

    pub fn set(&mut self, metric: Metric, value: f32) {
        let slot = match metric {
            Metric::Moisture => &mut self.moisture,
            Metric::Temperature => &mut self.temperature,
            Metric::Humidity => &mut self.humidity,
            Metric::Light => &mut self.light,
        };
        *slot = value;
    }
}

/// Startup mode per device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeDefaults {
    pub pump: Mode,
    pub light: Mode,
    pub fan: Mode,
}

impl ModeDefaults {
    pub fn get(&self, kind: DeviceKind) -> Mode {
        match kind {
            DeviceKind::Pump => self.pump,
            DeviceKind::Light => self.light,
            DeviceKind::Fan => self.fan,
        }
    }
}

/// Mode & threshold store plus per-device timing.
///
/// Owned by the event loop and handed by reference to the control loop and the
/// message router; nothing else mutates it. Rebuilt from defaults on every start.
#[derive(Debug, Clone)]
pub struct ControllerState {
    pump: Device,
    light: Device,
    fan: Device,
    thresholds: Thresholds,
    malformed_payloads: u64,
}

impl ControllerState {
    pub fn new(modes: &ModeDefaults, thresholds: Thresholds) -> Self {
        info!(
            "Controller state: modes pump={} light={} fan={}, thresholds {:?}",
            modes.pump, modes.light, modes.fan, thresholds
        );
        Self {
            pump: Device::new(DeviceKind::Pump, modes.get(DeviceKind::Pump)),
            light: Device::new(DeviceKind::Light, modes.get(DeviceKind::Light)),
            fan: Device::new(DeviceKind::Fan, modes.get(DeviceKind::Fan)),
            thresholds,
            malformed_payloads: 0,
        }
    }

    pub fn device(&self, kind: DeviceKind) -> &Device {
        match kind {
            DeviceKind::Pump => &self.pump,
            DeviceKind::Light => &self.light,
            DeviceKind::Fan => &self.fan,
        }
    }

    fn device_mut(&mut self, kind: DeviceKind) -> &mut Device {
        match kind {
            DeviceKind::Pump => &mut self.pump,
            DeviceKind::Light => &mut self.light,
            DeviceKind::Fan => &mut self.fan,
        }
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        [&self.pump, &self.light, &self.fan].into_iter()
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn set_mode(&mut self, kind: DeviceKind, mode: Mode) {
        self.device_mut(kind).set_mode(mode);
    }

    pub fn set_threshold(&mut self, metric: Metric, value: f32) {
        info!(
            "Threshold {} {} -> {}",
            metric,
            self.thresholds.get(metric),
            value
        );
        self.thresholds.set(metric, value);
    }

    pub fn evaluate(
        &mut self,
        kind: DeviceKind,
        measurement: &Measurement,
        now: Instant,
    ) -> Option<Transition> {
        let thresholds = self.thresholds;
        self.device_mut(kind).evaluate(measurement, &thresholds, now)
    }

    pub fn apply_manual(
        &mut self,
        kind: DeviceKind,
        command: Command,
        now: Instant,
    ) -> Option<Transition> {
        self.device_mut(kind).apply_manual(command, now)
    }

    pub fn record_malformed_payload(&mut self) -> u64 {
        self.malformed_payloads += 1;
        self.malformed_payloads
    }

    pub fn malformed_payloads(&self) -> u64 {
        self.malformed_payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_from_defaults() {
        let modes = ModeDefaults {
            fan: Mode::Manual,
            ..Default::default()
        };
        let state = ControllerState::new(&modes, Thresholds::default());

        assert_eq!(state.device(DeviceKind::Pump).mode(), Mode::Automatic);
        assert_eq!(state.device(DeviceKind::Fan).mode(), Mode::Manual);
        assert!(state.devices().all(|d| !d.is_actuated()));
        assert_eq!(state.thresholds().moisture, 20.0);
        assert_eq!(state.malformed_payloads(), 0);
    }

    #[test]
    fn threshold_update_is_used_by_next_evaluation() {
        let mut state = ControllerState::new(&ModeDefaults::default(), Thresholds::default());
        let now = Instant::now();

        // 35% is above the default of 20%: pump stays off
        let t = state
            .evaluate(DeviceKind::Pump, &Measurement::Moisture(35.0), now)
            .unwrap();
        assert!(!t.actuated);

        state.set_threshold(Metric::Moisture, 40.0);
        let t = state
            .evaluate(DeviceKind::Pump, &Measurement::Moisture(35.0), now)
            .unwrap();
        assert!(t.actuated);
    }

    #[test]
    fn thresholds_roundtrip_by_metric() {
        let mut thresholds = Thresholds::default();
        for (i, metric) in Metric::ALL.into_iter().enumerate() {
            thresholds.set(metric, i as f32);
        }
        for (i, metric) in Metric::ALL.into_iter().enumerate() {
            assert_eq!(thresholds.get(metric), i as f32);
        }
    }
}
