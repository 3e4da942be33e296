//! Per-actuator control logic: mode arbitration, threshold rules and activation timing.

use crate::controller::state::Thresholds;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

/// Actuators driven by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Pump,
    Light,
    Fan,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 3] = [DeviceKind::Pump, DeviceKind::Light, DeviceKind::Fan];

    /// Topic prefix, e.g. `pump` in `<ns>/pump_mode`
    pub fn name(self) -> &'static str {
        match self {
            DeviceKind::Pump => "pump",
            DeviceKind::Light => "light",
            DeviceKind::Fan => "fan",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Who is allowed to drive a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Driven solely by sensor/threshold comparison
    #[default]
    Automatic,
    /// Driven solely by remote ON/OFF commands
    Manual,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Automatic => f.write_str("AUTO"),
            Mode::Manual => f.write_str("MANUAL"),
        }
    }
}

/// Remote manual actuation command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    On,
    Off,
}

/// The sensor input a device compares against its threshold(s)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Moisture(f32),
    Light(f32),
    Climate { temperature: f32, humidity: f32 },
}

impl DeviceKind {
    /// Threshold rule per device. `None` when the measurement does not belong to this device.
    ///
    /// Pump and light switch on below their threshold; the fan switches on when
    /// either temperature or humidity exceeds its threshold.
    pub fn demand(self, measurement: &Measurement, thresholds: &Thresholds) -> Option<bool> {
        match (self, *measurement) {
            (DeviceKind::Pump, Measurement::Moisture(moisture)) => {
                Some(moisture < thresholds.moisture)
            }
            (DeviceKind::Light, Measurement::Light(light)) => Some(light < thresholds.light),
            (
                DeviceKind::Fan,
                Measurement::Climate {
                    temperature,
                    humidity,
                },
            ) => Some(temperature > thresholds.temperature || humidity > thresholds.humidity),
            _ => None,
        }
    }
}

/// Result of one evaluation or command; always emitted, edge or not.
///
/// Status is republished on every tick as a heartbeat, so callers publish every
/// transition they receive, not only the ones with `changed` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub device: DeviceKind,
    pub actuated: bool,
    pub changed: bool,
    /// Duration of the last completed activation; present whenever the device is off
    pub active_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Device {
    kind: DeviceKind,
    mode: Mode,
    actuated: bool,
    // Some iff actuated
    activation_start: Option<Instant>,
    last_active_secs: u64,
    total_active_secs: u64,
}

impl Device {
    pub fn new(kind: DeviceKind, mode: Mode) -> Self {
        Self {
            kind,
            mode,
            actuated: false,
            activation_start: None,
            last_active_secs: 0,
            total_active_secs: 0,
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_actuated(&self) -> bool {
        self.actuated
    }

    pub fn activation_start(&self) -> Option<Instant> {
        self.activation_start
    }

    pub fn last_active_secs(&self) -> u64 {
        self.last_active_secs
    }

    pub fn total_active_secs(&self) -> u64 {
        self.total_active_secs
    }

    /// Takes effect for the next evaluation or command
    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            info!("{} mode {} -> {}", self.kind, self.mode, mode);
        }
        self.mode = mode;
    }

    /// Automatic control. Ignored unless the device is in [`Mode::Automatic`].
    pub fn evaluate(
        &mut self,
        measurement: &Measurement,
        thresholds: &Thresholds,
        now: Instant,
    ) -> Option<Transition> {
        if self.mode != Mode::Automatic {
            debug!("{} is in manual mode, skipping evaluation", self.kind);
            return None;
        }
        let on = self.kind.demand(measurement, thresholds)?;
        Some(self.switch(on, now))
    }

    /// Manual control. Ignored unless the device is in [`Mode::Manual`].
    pub fn apply_manual(&mut self, command: Command, now: Instant) -> Option<Transition> {
        if self.mode != Mode::Manual {
            debug!(
                "Ignoring manual {:?} for {}: device is in automatic mode",
                command, self.kind
            );
            return None;
        }
        Some(self.switch(command == Command::On, now))
    }

    fn switch(&mut self, on: bool, now: Instant) -> Transition {
        let changed = on != self.actuated;

        if on {
            if !self.actuated {
                self.activation_start = Some(now);
                info!("{} ON", self.kind);
            }
            self.actuated = true;
        } else {
            if let Some(start) = self.activation_start.take() {
                let secs = now.saturating_duration_since(start).as_secs();
                self.last_active_secs = secs;
                self.total_active_secs = self.total_active_secs.saturating_add(secs);
                info!(
                    "{} OFF after {}s ({}s total)",
                    self.kind, secs, self.total_active_secs
                );
            }
            self.actuated = false;
        }

        Transition {
            device: self.kind,
            actuated: self.actuated,
            changed,
            active_secs: (!self.actuated).then_some(self.last_active_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn thresholds() -> Thresholds {
        Thresholds {
            moisture: 40.0,
            temperature: 30.0,
            humidity: 80.0,
            light: 30.0,
        }
    }

    #[test]
    fn dry_soil_turns_pump_on() {
        let mut pump = Device::new(DeviceKind::Pump, Mode::Automatic);
        let now = Instant::now();

        let t = pump
            .evaluate(&Measurement::Moisture(25.0), &thresholds(), now)
            .unwrap();

        assert!(t.actuated);
        assert!(t.changed);
        assert_eq!(t.active_secs, None);
        assert_eq!(pump.activation_start(), Some(now));
    }

    #[test]
    fn wet_soil_turns_pump_off_and_reports_elapsed_seconds() {
        let mut pump = Device::new(DeviceKind::Pump, Mode::Automatic);
        let start = Instant::now();
        pump.evaluate(&Measurement::Moisture(25.0), &thresholds(), start);

        // Still on a few ticks later: start time is kept from the edge
        let t = pump
            .evaluate(
                &Measurement::Moisture(30.0),
                &thresholds(),
                start + Duration::from_secs(3),
            )
            .unwrap();
        assert!(t.actuated && !t.changed);
        assert_eq!(pump.activation_start(), Some(start));

        let t = pump
            .evaluate(
                &Measurement::Moisture(55.0),
                &thresholds(),
                start + Duration::from_millis(7_900),
            )
            .unwrap();
        assert!(!t.actuated);
        assert!(t.changed);
        assert_eq!(t.active_secs, Some(7));
        assert_eq!(pump.activation_start(), None);
        assert_eq!(pump.total_active_secs(), 7);
    }

    #[test]
    fn remaining_off_republishes_last_duration() {
        let mut pump = Device::new(DeviceKind::Pump, Mode::Automatic);
        let start = Instant::now();
        pump.evaluate(&Measurement::Moisture(10.0), &thresholds(), start);
        pump.evaluate(
            &Measurement::Moisture(90.0),
            &thresholds(),
            start + Duration::from_secs(4),
        );

        let t = pump
            .evaluate(
                &Measurement::Moisture(90.0),
                &thresholds(),
                start + Duration::from_secs(60),
            )
            .unwrap();
        assert!(!t.changed);
        assert_eq!(t.active_secs, Some(4));
        assert_eq!(pump.total_active_secs(), 4);
    }

    #[test]
    fn fan_uses_or_semantics() {
        let mut fan = Device::new(DeviceKind::Fan, Mode::Automatic);
        let now = Instant::now();

        let hot = Measurement::Climate {
            temperature: 32.0,
            humidity: 50.0,
        };
        assert!(fan.evaluate(&hot, &thresholds(), now).unwrap().actuated);

        let humid = Measurement::Climate {
            temperature: 20.0,
            humidity: 85.0,
        };
        assert!(fan.evaluate(&humid, &thresholds(), now).unwrap().actuated);

        let mild = Measurement::Climate {
            temperature: 20.0,
            humidity: 50.0,
        };
        assert!(!fan.evaluate(&mild, &thresholds(), now).unwrap().actuated);
    }

    #[test]
    fn light_turns_on_when_dark() {
        let mut light = Device::new(DeviceKind::Light, Mode::Automatic);
        let now = Instant::now();
        assert!(light
            .evaluate(&Measurement::Light(5.0), &thresholds(), now)
            .unwrap()
            .actuated);
        assert!(!light
            .evaluate(&Measurement::Light(30.0), &thresholds(), now)
            .unwrap()
            .actuated);
    }

    #[test]
    fn mismatched_measurement_is_not_evaluated() {
        let mut pump = Device::new(DeviceKind::Pump, Mode::Automatic);
        assert!(pump
            .evaluate(&Measurement::Light(5.0), &thresholds(), Instant::now())
            .is_none());
    }

    #[test]
    fn evaluation_is_idempotent_and_not_deduplicated() {
        let mut pump = Device::new(DeviceKind::Pump, Mode::Automatic);
        let now = Instant::now();
        let first = pump
            .evaluate(&Measurement::Moisture(25.0), &thresholds(), now)
            .unwrap();
        let second = pump
            .evaluate(&Measurement::Moisture(25.0), &thresholds(), now)
            .unwrap();
        assert_eq!(first.actuated, second.actuated);
        assert!(!second.changed);
    }

    #[test]
    fn manual_mode_blocks_automatic_control() {
        let now = Instant::now();
        for kind in DeviceKind::ALL {
            let mut device = Device::new(kind, Mode::Automatic);
            device.set_mode(Mode::Manual);
            let measurement = match kind {
                DeviceKind::Pump => Measurement::Moisture(0.0),
                DeviceKind::Light => Measurement::Light(0.0),
                DeviceKind::Fan => Measurement::Climate {
                    temperature: 50.0,
                    humidity: 99.0,
                },
            };
            assert!(device.evaluate(&measurement, &thresholds(), now).is_none());
            assert!(!device.is_actuated());
        }
    }

    #[test]
    fn manual_on_survives_readings_that_say_off() {
        let now = Instant::now();
        for kind in DeviceKind::ALL {
            let mut device = Device::new(kind, Mode::Manual);
            device.apply_manual(Command::On, now).unwrap();
            let measurement = match kind {
                DeviceKind::Pump => Measurement::Moisture(100.0),
                DeviceKind::Light => Measurement::Light(100.0),
                DeviceKind::Fan => Measurement::Climate {
                    temperature: 0.0,
                    humidity: 0.0,
                },
            };
            assert!(device.evaluate(&measurement, &thresholds(), now).is_none());
            assert!(device.is_actuated());
            assert_eq!(device.activation_start(), Some(now));
        }
    }

    #[test]
    fn automatic_mode_ignores_manual_commands() {
        for kind in DeviceKind::ALL {
            let mut device = Device::new(kind, Mode::Automatic);
            assert!(device.apply_manual(Command::On, Instant::now()).is_none());
            assert!(!device.is_actuated());
        }
    }

    #[test]
    fn manual_commands_drive_the_device() {
        let mut fan = Device::new(DeviceKind::Fan, Mode::Manual);
        let start = Instant::now();

        let on = fan.apply_manual(Command::On, start).unwrap();
        assert!(on.actuated && on.changed);

        let off = fan
            .apply_manual(Command::Off, start + Duration::from_secs(12))
            .unwrap();
        assert!(!off.actuated);
        assert_eq!(off.active_secs, Some(12));
    }

    #[test]
    fn nan_never_satisfies_a_threshold() {
        // Documented propagation if a NaN were ever fed in directly
        assert_eq!(
            DeviceKind::Pump.demand(&Measurement::Moisture(f32::NAN), &thresholds()),
            Some(false)
        );
    }
}
