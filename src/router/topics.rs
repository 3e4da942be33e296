//! The wire contract: every topic the controller listens on or publishes to.

use crate::controller::DeviceKind;
use crate::sensor::Metric;
use std::collections::HashMap;

/// What an inbound topic asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// `<ns>/<device>_mode`: `AUTO` | `MANUAL`
    SetMode(DeviceKind),
    /// `<ns>/<device>_control`: `ON` | `OFF`
    Manual(DeviceKind),
    /// `<ns>/set_<metric>`: decimal text
    SetThreshold(Metric),
}

/// Built once at startup; immutable afterwards
#[derive(Debug, Clone)]
pub struct TopicTable {
    namespace: String,
    inbound: HashMap<String, Action>,
    status: HashMap<DeviceKind, String>,
    time: HashMap<DeviceKind, String>,
    readings: HashMap<Metric, String>,
    lwt: String,
}

impl TopicTable {
    pub fn new(namespace: &str) -> Self {
        let ns = namespace.trim_end_matches('/');
        let mut inbound = HashMap::new();
        let mut status = HashMap::new();
        let mut time = HashMap::new();
        let mut readings = HashMap::new();

        for device in DeviceKind::ALL {
            inbound.insert(format!("{ns}/{device}_mode"), Action::SetMode(device));
            inbound.insert(format!("{ns}/{device}_control"), Action::Manual(device));
            status.insert(device, format!("{ns}/{device}_status"));
            time.insert(device, format!("{ns}/{device}_time"));
        }
        for metric in Metric::ALL {
            inbound.insert(format!("{ns}/set_{metric}"), Action::SetThreshold(metric));
            readings.insert(metric, format!("{ns}/{metric}"));
        }

        Self {
            namespace: ns.to_string(),
            inbound,
            status,
            time,
            readings,
            lwt: format!("{ns}/lwt"),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Exact match only
    pub fn resolve(&self, topic: &str) -> Option<Action> {
        self.inbound.get(topic).copied()
    }

    /// The fixed subscription set, sorted
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.inbound.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn status(&self, device: DeviceKind) -> &str {
        &self.status[&device]
    }

    pub fn time(&self, device: DeviceKind) -> &str {
        &self.time[&device]
    }

    pub fn reading(&self, metric: Metric) -> &str {
        &self.readings[&metric]
    }

    pub fn lwt(&self) -> &str {
        &self.lwt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_topics_resolve_to_actions() {
        let table = TopicTable::new("esp32");
        assert_eq!(
            table.resolve("esp32/pump_mode"),
            Some(Action::SetMode(DeviceKind::Pump))
        );
        assert_eq!(
            table.resolve("esp32/fan_control"),
            Some(Action::Manual(DeviceKind::Fan))
        );
        assert_eq!(
            table.resolve("esp32/set_humidity"),
            Some(Action::SetThreshold(Metric::Humidity))
        );
        assert_eq!(table.resolve("esp32/pump_status"), None);
        assert_eq!(table.resolve("ESP32/pump_mode"), None);
        assert_eq!(table.resolve("esp32/pump_mode/"), None);
    }

    #[test]
    fn subscription_set_is_complete() {
        let table = TopicTable::new("esp32/");
        let subs = table.subscriptions();
        // mode + control per device, one threshold per metric
        assert_eq!(subs.len(), 3 * 2 + 4);
        assert!(subs.contains(&"esp32/light_control".to_string()));
        assert!(subs.contains(&"esp32/set_light".to_string()));
        assert!(subs.iter().all(|t| table.resolve(t).is_some()));
    }

    #[test]
    fn outbound_topics() {
        let table = TopicTable::new("garden");
        assert_eq!(table.status(DeviceKind::Light), "garden/light_status");
        assert_eq!(table.time(DeviceKind::Pump), "garden/pump_time");
        assert_eq!(table.reading(Metric::Temperature), "garden/temperature");
        assert_eq!(table.lwt(), "garden/lwt");
        assert_eq!(table.namespace(), "garden");
    }
}
