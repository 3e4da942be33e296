//! Transport supervisor
//!
//! Keeps the broker connection alive with a typestate machine:
//!
//! ```text
//! Disconnected ──connect──► Connecting ──handshake ok──► Connected
//!      ▲                        │                           │
//!      └──── back_off (1 s) ◄───┘ handshake failed          │
//!      └────────────────────────────────────────────────────┘ link lost
//! ```
//!
//! On every successful handshake the full topic set is subscribed again before
//! any inbound message is forwarded. Retries never give up.
//!
//! Counters live in a `watch` channel so they outlive the handler: the totals
//! are still readable after shutdown drops a cycle mid-flight.

use super::link::{Link, LinkEvent};
use super::message_manager::InboundMessage;
use super::TransportError;
use chrono::{DateTime, Local};
use statum::{machine, state};
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runtime mirror of the typestate, shared with publishers
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Clone, Debug, Default)]
pub struct MqttStatus {
    pub connection_state: ConnectionState,
    pub connect_attempts: u64,
    pub failed_attempts: u64,
    pub messages_received: u64,
    pub last_activity: Option<DateTime<Local>>,
    pub last_error: Option<String>,
}

impl fmt::Display for MqttStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}, {} connect attempts ({} failed), {} messages received",
            self.connection_state,
            self.connect_attempts,
            self.failed_attempts,
            self.messages_received
        )?;
        if let Some(at) = self.last_activity {
            write!(f, ", last activity {}", at.format("%H:%M:%S"))?;
        }
        if let Some(error) = &self.last_error {
            write!(f, ", last error: {}", error)?;
        }
        Ok(())
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

#[machine]
pub struct MqttHandler<S: LinkState> {
    link: Box<dyn Link>,
    subscriptions: Vec<String>,
    backoff: Duration,
    inbound: mpsc::Sender<InboundMessage>,
    state_tx: watch::Sender<ConnectionState>,
    status: watch::Sender<MqttStatus>,
}

impl<S: LinkState> MqttHandler<S> {
    pub fn status(&self) -> MqttStatus {
        self.status.borrow().clone()
    }

    /// Live view of the counters
    pub fn watch_status(&self) -> watch::Receiver<MqttStatus> {
        self.status.subscribe()
    }

    fn announce(&mut self, state: ConnectionState) {
        self.status.send_modify(|s| s.connection_state = state);
        self.state_tx.send_replace(state);
    }

    fn record_failure(&mut self, error: &TransportError) {
        let error = error.to_string();
        self.status.send_modify(|s| s.last_error = Some(error));
        self.announce(ConnectionState::Disconnected);
    }
}

impl MqttHandler<Disconnected> {
    pub fn create(
        link: Box<dyn Link>,
        subscriptions: Vec<String>,
        backoff: Duration,
        inbound: mpsc::Sender<InboundMessage>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let (status, _) = watch::channel(MqttStatus::default());
        Self::new(link, subscriptions, backoff, inbound, state_tx, status)
    }

    pub fn connect(mut self) -> MqttHandler<Connecting> {
        let mut attempt = 0;
        self.status.send_modify(|s| {
            s.connect_attempts += 1;
            attempt = s.connect_attempts;
        });
        info!("Connecting to MQTT broker (attempt {})", attempt);
        self.announce(ConnectionState::Connecting);
        self.transition()
    }

    pub async fn back_off(self) -> Self {
        debug!("Waiting {:?} before reconnecting", self.backoff);
        tokio::time::sleep(self.backoff).await;
        self
    }

    /// One full connection lifetime: connect, serve until the link drops, or back off
    pub async fn cycle(self) -> MqttHandler<Disconnected> {
        match self.connect().handshake().await {
            Ok(connected) => connected.serve().await,
            Err(disconnected) => disconnected.back_off().await,
        }
    }
}

impl MqttHandler<Connecting> {
    pub async fn handshake(
        mut self,
    ) -> Result<MqttHandler<Connected>, MqttHandler<Disconnected>> {
        loop {
            match self.link.next_event().await {
                Ok(LinkEvent::Connected) => {
                    if let Err(e) = self.subscribe_all() {
                        warn!("Subscribing after connect failed: {}", e);
                        self.status.send_modify(|s| s.failed_attempts += 1);
                        self.record_failure(&e);
                        return Err(self.transition());
                    }
                    info!(
                        "Connected to MQTT, subscribed to {} topics",
                        self.subscriptions.len()
                    );
                    self.announce(ConnectionState::Connected);
                    return Ok(self.transition());
                }
                Ok(other) => debug!("Ignoring {:?} before ConnAck", other),
                Err(e) => {
                    self.status.send_modify(|s| s.failed_attempts += 1);
                    warn!(
                        "Failed to connect to MQTT: {}. Retrying in {:?}",
                        e, self.backoff
                    );
                    self.record_failure(&e);
                    return Err(self.transition());
                }
            }
        }
    }

    fn subscribe_all(&mut self) -> Result<(), TransportError> {
        for topic in &self.subscriptions {
            self.link.subscribe(topic)?;
            debug!("Subscribed to {}", topic);
        }
        Ok(())
    }
}

impl MqttHandler<Connected> {
    /// Forwards inbound messages until the link drops
    pub async fn serve(mut self) -> MqttHandler<Disconnected> {
        loop {
            match self.link.next_event().await {
                Ok(LinkEvent::Message(message)) => {
                    self.status.send_modify(|s| {
                        s.messages_received += 1;
                        s.last_activity = Some(message.received);
                    });
                    debug!("Inbound {}", message);
                    if self.inbound.send(message).await.is_err() {
                        warn!("Event loop is gone, dropping inbound message");
                    }
                }
                Ok(LinkEvent::Connected) => {
                    // Broker-side session reset without a visible drop
                    for topic in &self.subscriptions {
                        if let Err(e) = self.link.subscribe(topic) {
                            warn!("Resubscribing {} failed: {}", topic, e);
                        }
                    }
                }
                Ok(LinkEvent::Idle) => {}
                Err(e) => {
                    warn!(
                        "MQTT connection lost after {} messages: {}",
                        self.status.borrow().messages_received,
                        e
                    );
                    self.record_failure(&e);
                    return self.transition();
                }
            }
        }
    }
}

/// Runs the supervisor until `shutdown` fires and returns the final counters
pub async fn supervise(
    handler: MqttHandler<Disconnected>,
    shutdown: CancellationToken,
) -> MqttStatus {
    let status = handler.watch_status();
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = run_forever(handler) => {}
    }
    let totals = status.borrow().clone();
    info!("MQTT supervisor stopped: {}", totals);
    totals
}

async fn run_forever(mut handler: MqttHandler<Disconnected>) {
    loop {
        handler = handler.cycle().await;
        info!("MQTT link cycle ended: {}", handler.status());
    }
}
