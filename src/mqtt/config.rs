use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Broker connection and topic namespace settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// PEM trust anchor; when set the connection uses TLS
    pub ca_cert: Option<PathBuf>,
    pub keep_alive_secs: u64,
    /// Prefix of every topic, e.g. `esp32` in `esp32/pump_mode`
    pub namespace: String,
    /// Product tag prepended to the hardware address to form the client id
    pub client_tag: String,
    /// Overrides the address read from the network interfaces
    pub hardware_address: Option<String>,
    pub lwt_message: String,
    pub reconnect_backoff_ms: u64,
    /// Inbound message buffer between the supervisor and the event loop
    pub channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            ca_cert: None,
            keep_alive_secs: 15,
            namespace: "esp32".to_string(),
            client_tag: "ESP32-".to_string(),
            hardware_address: None,
            lwt_message: "ESP32 unexpectedly disconnected.".to_string(),
            reconnect_backoff_ms: 1000,
            channel_capacity: 100,
        }
    }
}
