use super::mqtt_handler::ConnectionState;
use super::TransportError;
use chrono::{DateTime, Local};
use rumqttc::{AsyncClient, QoS};
use std::fmt;
use tokio::sync::watch;
use tracing::{debug, info};

const PREVIEW_LEN: usize = 32;

/// A topic/payload pair delivered by the broker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received: DateTime<Local>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
            received: Local::now(),
        }
    }

    /// Lossy, truncated payload text for logs
    pub fn preview(&self) -> String {
        let text = String::from_utf8_lossy(&self.payload);
        if text.chars().count() > PREVIEW_LEN {
            let cut: String = text.chars().take(PREVIEW_LEN).collect();
            format!("{}...", cut)
        } else {
            text.into_owned()
        }
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} - {}: {}",
            self.received.format("%H:%M:%S%.3f"),
            self.topic,
            self.preview()
        )
    }
}

/// Fire-and-forget outbound publishing.
///
/// Implementations must not block: a publish that cannot be handed to the
/// transport right now fails and is dropped by the caller.
pub trait Publisher {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> Result<(), TransportError>;
}

/// Publishes through the rumqttc request queue, dropping everything while offline
pub struct MqttPublisher {
    client: AsyncClient,
    connection: watch::Receiver<ConnectionState>,
    sent: u64,
    dropped: u64,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient, connection: watch::Receiver<ConnectionState>) -> Self {
        Self {
            client,
            connection,
            sent: 0,
            dropped: 0,
        }
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        info!(
            "MQTT publisher closed: {} sent, {} dropped",
            self.sent, self.dropped
        );
    }
}

impl Publisher for MqttPublisher {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> Result<(), TransportError> {
        if *self.connection.borrow() != ConnectionState::Connected {
            self.dropped += 1;
            return Err(TransportError::Offline);
        }
        match self
            .client
            .try_publish(topic, QoS::AtMostOnce, retain, payload.as_bytes().to_vec())
        {
            Ok(()) => {
                self.sent += 1;
                debug!("Published {} = {} (retain={})", topic, payload, retain);
                Ok(())
            }
            Err(e) => {
                self.dropped += 1;
                Err(e.into())
            }
        }
    }
}
