//! The messaging link the supervisor drives: one event at a time, plus subscribe.

use super::config::MqttConfig;
use super::message_manager::InboundMessage;
use super::TransportError;
use rumqttc::{
    AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS, TlsConfiguration,
    Transport,
};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info};

/// What the link observed on its last poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Broker accepted the handshake
    Connected,
    Message(InboundMessage),
    /// Keep-alive traffic, acks and other packets the controller does not care about
    Idle,
}

pub type LinkFuture<'a> =
    Pin<Box<dyn Future<Output = Result<LinkEvent, TransportError>> + Send + 'a>>;

/// Object-safe transport seam so the supervisor can run against a scripted link in tests
pub trait Link: Send {
    /// Drives the connection until the next event. An error means the link is down;
    /// calling again starts a new connection attempt.
    fn next_event(&mut self) -> LinkFuture<'_>;

    /// Queues a subscription; it goes out with the next poll
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;
}

/// rumqttc-backed link
pub struct RumqttLink {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl RumqttLink {
    /// Builds the link and returns a client handle for publishing and clean disconnects
    pub fn new(
        config: &MqttConfig,
        client_id: &str,
        lwt_topic: &str,
    ) -> Result<(Self, AsyncClient), TransportError> {
        let options = mqtt_options(config, client_id, lwt_topic)?;
        let (client, eventloop) = AsyncClient::new(options, config.channel_capacity.max(1));
        info!(
            "MQTT link for {} -> {}:{} (tls={})",
            client_id,
            config.host,
            config.port,
            config.ca_cert.is_some()
        );
        Ok((
            Self {
                client: client.clone(),
                eventloop,
            },
            client,
        ))
    }
}

pub fn mqtt_options(
    config: &MqttConfig,
    client_id: &str,
    lwt_topic: &str,
) -> Result<MqttOptions, TransportError> {
    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options
        .set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(1)))
        .set_clean_session(true)
        .set_last_will(LastWill::new(
            lwt_topic,
            config.lwt_message.clone().into_bytes(),
            QoS::AtMostOnce,
            false,
        ));

    if let Some(user) = &config.username {
        options.set_credentials(user.clone(), config.password.clone().unwrap_or_default());
    }

    if let Some(path) = &config.ca_cert {
        let ca = std::fs::read(path).map_err(|source| TransportError::Certificate {
            path: path.clone(),
            source,
        })?;
        options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: None,
        }));
    }

    Ok(options)
}

impl Link for RumqttLink {
    fn next_event(&mut self) -> LinkFuture<'_> {
        Box::pin(async move {
            match self.eventloop.poll().await? {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    debug!("ConnAck: {:?}", ack);
                    Ok(LinkEvent::Connected)
                }
                Event::Incoming(Packet::Publish(publish)) => Ok(LinkEvent::Message(
                    InboundMessage::new(publish.topic, publish.payload.to_vec()),
                )),
                _ => Ok(LinkEvent::Idle),
            }
        })
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client.try_subscribe(topic, QoS::AtMostOnce)?;
        Ok(())
    }
}
