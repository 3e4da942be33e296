//! Control Loop Driver
//!
//! One [`ControlLoop::tick`] per scheduler interval: sample every sensor once,
//! publish every reading, then evaluate each automatic device. The tick never
//! waits on I/O; publishes that the transport cannot take are dropped.
//!
//! [`event_loop`] owns the scheduler and interleaves ticks with inbound messages.

pub mod event_loop;

use crate::controller::{ControllerState, DeviceKind, Measurement, Mode};
use crate::router::{MessageRouter, Outputs};
use crate::sensor::{SensorBank, SensorError, SensorSnapshot};
use std::time::Instant;
use tracing::{debug, warn};

pub use event_loop::GardenLoop;

pub struct ControlLoop {
    sensors: Box<dyn SensorBank>,
    ticks: u64,
    sensor_failures: u64,
}

impl ControlLoop {
    pub fn new(sensors: Box<dyn SensorBank>) -> Self {
        Self {
            sensors,
            ticks: 0,
            sensor_failures: 0,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn sensor_failures(&self) -> u64 {
        self.sensor_failures
    }

    pub fn tick(
        &mut self,
        state: &mut ControllerState,
        router: &MessageRouter,
        out: &mut Outputs<'_>,
        now: Instant,
    ) {
        self.ticks += 1;
        let snapshot = self.sensors.sample();

        for (metric, reading) in snapshot.iter() {
            match reading {
                Ok(value) => router.publish_reading(metric, *value, out),
                Err(e) => {
                    self.sensor_failures += 1;
                    warn!("{} sensor unavailable: {}", metric, e);
                }
            }
        }

        for kind in DeviceKind::ALL {
            if state.device(kind).mode() != Mode::Automatic {
                // Manual devices still heartbeat their status
                router.publish_status(state.device(kind), out);
                continue;
            }
            let measurement = match measurement_for(kind, &snapshot) {
                Ok(measurement) => measurement,
                Err(e) => {
                    debug!("Skipping {} this tick: {}", kind, e);
                    router.publish_status(state.device(kind), out);
                    continue;
                }
            };
            if let Some(transition) = state.evaluate(kind, &measurement, now) {
                router.commit(&transition, out);
            }
        }
    }
}

/// The inputs a device's rule reads. Any missing input skips the device.
pub fn measurement_for(
    kind: DeviceKind,
    snapshot: &SensorSnapshot,
) -> Result<Measurement, SensorError> {
    Ok(match kind {
        DeviceKind::Pump => Measurement::Moisture(snapshot.moisture.clone()?),
        DeviceKind::Light => Measurement::Light(snapshot.light.clone()?),
        DeviceKind::Fan => Measurement::Climate {
            temperature: snapshot.temperature.clone()?,
            humidity: snapshot.humidity.clone()?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Command, ModeDefaults, Thresholds};
    use crate::router::TopicTable;
    use crate::testing::{snapshot, RecordingActuators, RecordingPublisher, ScriptedSensors};
    use std::time::Duration;

    struct Rig {
        control: ControlLoop,
        state: ControllerState,
        router: MessageRouter,
        actuators: RecordingActuators,
        publisher: RecordingPublisher,
    }

    impl Rig {
        fn new(snapshots: Vec<SensorSnapshot>) -> Self {
            let thresholds = Thresholds {
                moisture: 40.0,
                ..Default::default()
            };
            Self {
                control: ControlLoop::new(Box::new(ScriptedSensors::new(snapshots))),
                state: ControllerState::new(&ModeDefaults::default(), thresholds),
                router: MessageRouter::new(TopicTable::new("esp32"), false),
                actuators: RecordingActuators::default(),
                publisher: RecordingPublisher::default(),
            }
        }

        fn tick(&mut self, now: Instant) {
            let mut actuators = self.actuators.clone();
            let mut publisher = self.publisher.clone();
            let mut out = Outputs {
                actuators: &mut actuators,
                publisher: &mut publisher,
            };
            self.control.tick(&mut self.state, &self.router, &mut out, now);
        }
    }

    #[test]
    fn publishes_every_reading_retained() {
        let mut rig = Rig::new(vec![snapshot(55.0, 21.5, 60.0, 80.0)]);
        rig.tick(Instant::now());

        assert_eq!(rig.publisher.payloads_for("esp32/moisture"), vec!["55.00"]);
        assert_eq!(rig.publisher.payloads_for("esp32/temperature"), vec!["21.50"]);
        assert_eq!(rig.publisher.payloads_for("esp32/humidity"), vec!["60.00"]);
        assert_eq!(rig.publisher.payloads_for("esp32/light"), vec!["80.00"]);
        assert!(rig.publisher.messages().iter().all(|p| p.retain));
    }

    #[test]
    fn pump_cycle_reports_active_time() {
        let mut rig = Rig::new(vec![
            snapshot(25.0, 20.0, 50.0, 80.0),
            snapshot(55.0, 20.0, 50.0, 80.0),
        ]);
        let start = Instant::now();

        rig.tick(start);
        assert!(rig.actuators.is_on(DeviceKind::Pump));
        assert_eq!(rig.publisher.last_payload("esp32/pump_status").unwrap(), "ON");
        assert_eq!(
            rig.state.device(DeviceKind::Pump).activation_start(),
            Some(start)
        );

        rig.tick(start + Duration::from_millis(12_900));
        assert!(!rig.actuators.is_on(DeviceKind::Pump));
        assert_eq!(rig.publisher.last_payload("esp32/pump_status").unwrap(), "OFF");
        assert_eq!(rig.publisher.last_payload("esp32/pump_time").unwrap(), "12");
    }

    #[test]
    fn status_is_republished_every_tick() {
        let mut rig = Rig::new(vec![snapshot(55.0, 20.0, 50.0, 80.0)]);
        let start = Instant::now();
        for i in 0..3 {
            rig.tick(start + Duration::from_secs(i));
        }
        assert_eq!(
            rig.publisher.payloads_for("esp32/fan_status"),
            vec!["OFF", "OFF", "OFF"]
        );
        assert_eq!(rig.control.ticks(), 3);
    }

    #[test]
    fn hot_air_alone_runs_the_fan() {
        let mut rig = Rig::new(vec![snapshot(55.0, 32.0, 50.0, 80.0)]);
        rig.tick(Instant::now());
        assert!(rig.actuators.is_on(DeviceKind::Fan));
    }

    #[test]
    fn manual_devices_ignore_sensors() {
        let mut rig = Rig::new(vec![snapshot(5.0, 20.0, 50.0, 80.0)]);
        rig.state.set_mode(DeviceKind::Pump, Mode::Manual);

        rig.tick(Instant::now());

        assert!(!rig.state.device(DeviceKind::Pump).is_actuated());
        assert!(!rig.actuators.is_on(DeviceKind::Pump));
        assert_eq!(rig.publisher.payloads_for("esp32/pump_status"), vec!["OFF"]);
    }

    #[test]
    fn manual_on_is_kept_through_ticks() {
        // Wet soil: automatic control would switch the pump off
        let mut rig = Rig::new(vec![snapshot(90.0, 20.0, 50.0, 80.0)]);
        let start = Instant::now();
        rig.state.set_mode(DeviceKind::Pump, Mode::Manual);
        let on = rig
            .state
            .apply_manual(DeviceKind::Pump, Command::On, start)
            .unwrap();
        let mut actuators = rig.actuators.clone();
        let mut publisher = rig.publisher.clone();
        rig.router.commit(
            &on,
            &mut Outputs {
                actuators: &mut actuators,
                publisher: &mut publisher,
            },
        );

        rig.tick(start + Duration::from_secs(1));
        rig.tick(start + Duration::from_secs(2));

        assert!(rig.state.device(DeviceKind::Pump).is_actuated());
        assert!(rig.actuators.is_on(DeviceKind::Pump));
        assert_eq!(
            rig.publisher.payloads_for("esp32/pump_status"),
            vec!["ON", "ON", "ON"]
        );
    }

    #[test]
    fn failed_sensor_skips_only_its_devices() {
        let mut broken = snapshot(5.0, 35.0, 50.0, 10.0);
        broken.humidity = Err(SensorError::NotANumber);
        let mut rig = Rig::new(vec![broken]);

        rig.tick(Instant::now());

        assert!(rig.actuators.is_on(DeviceKind::Pump));
        assert!(rig.actuators.is_on(DeviceKind::Light));
        assert!(!rig.actuators.is_on(DeviceKind::Fan));
        assert!(rig.publisher.payloads_for("esp32/humidity").is_empty());
        assert_eq!(rig.control.sensor_failures(), 1);
    }

    #[test]
    fn offline_transport_does_not_stop_control() {
        let mut rig = Rig::new(vec![snapshot(5.0, 20.0, 50.0, 80.0)]);
        rig.publisher.set_online(false);

        rig.tick(Instant::now());

        assert!(rig.actuators.is_on(DeviceKind::Pump));
        assert!(rig.publisher.messages().is_empty());
        assert!(rig.publisher.dropped() > 0);
    }

    #[test]
    fn fan_needs_both_climate_inputs() {
        let mut snap = snapshot(50.0, 20.0, 50.0, 50.0);
        snap.temperature = Err(SensorError::Bus("timeout".into()));
        assert!(measurement_for(DeviceKind::Fan, &snap).is_err());
        assert_eq!(
            measurement_for(DeviceKind::Pump, &snap).unwrap(),
            Measurement::Moisture(50.0)
        );
    }
}
