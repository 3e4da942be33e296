//! # MQTT transport
//!
//! The messaging link between the controller and remote monitoring clients.
//!
//! ```text
//! mqtt/
//! ├── config.rs           - broker settings, namespace and identity tag
//! ├── identity.rs         - client id from the hardware address
//! ├── link.rs             - Link seam and the rumqttc implementation (LWT, TLS)
//! ├── message_manager.rs  - inbound message type and the outbound Publisher
//! └── mqtt_handler.rs     - connection supervisor state machine
//! ```
//!
//! The supervisor runs in its own task and forwards inbound messages over an mpsc
//! channel to the event loop, which owns all controller state. Outbound publishes
//! are fire-and-forget: while the link is down they fail fast and are dropped,
//! and the next tick republishes everything anyway.

pub mod config;
pub mod identity;
pub mod link;
pub mod message_manager;
pub mod mqtt_handler;

use std::path::PathBuf;

pub use config::MqttConfig;
pub use link::RumqttLink;
pub use message_manager::{InboundMessage, MqttPublisher, Publisher};
pub use mqtt_handler::{supervise, ConnectionState, MqttHandler};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport is offline")]
    Offline,

    #[error("Client request rejected: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("Connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("Failed to load CA certificate {path}: {source}")]
    Certificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
