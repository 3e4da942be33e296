//! Recording doubles shared by unit tests

use crate::controller::{ActuatorError, Actuators, DeviceKind};
use crate::mqtt::{Publisher, TransportError};
use crate::sensor::{SensorBank, SensorSnapshot};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// Clone-able handle: keep one clone in the test, hand the other to the code under test
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    log: Arc<Mutex<Vec<Published>>>,
    offline: Arc<AtomicBool>,
    dropped: Arc<AtomicUsize>,
}

impl RecordingPublisher {
    pub fn messages(&self) -> Vec<Published> {
        self.log.lock().unwrap().clone()
    }

    pub fn payloads_for(&self, topic: &str) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.payload.clone())
            .collect()
    }

    pub fn last_payload(&self, topic: &str) -> Option<String> {
        self.payloads_for(topic).pop()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> Result<(), TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            return Err(TransportError::Offline);
        }
        self.log.lock().unwrap().push(Published {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retain,
        });
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingActuators {
    outputs: Arc<Mutex<HashMap<DeviceKind, bool>>>,
}

impl RecordingActuators {
    pub fn is_on(&self, device: DeviceKind) -> bool {
        self.outputs
            .lock()
            .unwrap()
            .get(&device)
            .copied()
            .unwrap_or(false)
    }
}

impl Actuators for RecordingActuators {
    fn drive(&mut self, device: DeviceKind, on: bool) -> Result<(), ActuatorError> {
        self.outputs.lock().unwrap().insert(device, on);
        Ok(())
    }
}

/// Replays queued snapshots, then repeats the last one
pub struct ScriptedSensors {
    queue: VecDeque<SensorSnapshot>,
    last: SensorSnapshot,
}

impl ScriptedSensors {
    pub fn new(snapshots: Vec<SensorSnapshot>) -> Self {
        let last = snapshots
            .last()
            .cloned()
            .unwrap_or_else(|| snapshot(50.0, 20.0, 50.0, 50.0));
        Self {
            queue: snapshots.into(),
            last,
        }
    }
}

impl SensorBank for ScriptedSensors {
    fn sample(&mut self) -> SensorSnapshot {
        match self.queue.pop_front() {
            Some(next) => {
                self.last = next.clone();
                next
            }
            None => self.last.clone(),
        }
    }
}

pub fn snapshot(moisture: f32, temperature: f32, humidity: f32, light: f32) -> SensorSnapshot {
    SensorSnapshot {
        moisture: Ok(moisture),
        temperature: Ok(temperature),
        humidity: Ok(humidity),
        light: Ok(light),
    }
}
