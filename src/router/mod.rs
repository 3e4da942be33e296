//! Message Router
//!
//! Maps inbound topic/payload pairs onto [`ControllerState`] mutations and maps
//! device transitions and readings onto outbound publishes. The topic contract
//! lives in [`topics::TopicTable`]; payload codecs in [`payload`].
//!
//! Nothing here surfaces an error to the caller. Unknown topics and unknown
//! commands are ignored. Malformed payloads are logged and counted. A
//! malformed threshold stores 0.0 unless strict thresholds are enabled, in
//! which case the update is dropped.

pub mod payload;
pub mod topics;

use crate::controller::{Actuators, ControllerState, Device, Transition};
use crate::mqtt::{InboundMessage, Publisher};
use crate::sensor::Metric;
use payload::{format_reading, format_status, parse_command, parse_mode, parse_threshold};
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub use topics::{Action, TopicTable};

/// Where routed effects land: the physical outputs and the transport
pub struct Outputs<'a> {
    pub actuators: &'a mut dyn Actuators,
    pub publisher: &'a mut dyn Publisher,
}

pub struct MessageRouter {
    topics: TopicTable,
    strict_thresholds: bool,
}

impl MessageRouter {
    pub fn new(topics: TopicTable, strict_thresholds: bool) -> Self {
        Self {
            topics,
            strict_thresholds,
        }
    }

    pub fn topics(&self) -> &TopicTable {
        &self.topics
    }

    /// Applies one inbound message. Returns the action if it changed anything.
    pub fn dispatch(
        &self,
        state: &mut ControllerState,
        message: &InboundMessage,
        now: Instant,
        out: &mut Outputs<'_>,
    ) -> Option<Action> {
        debug!(
            "Message received on topic: {} payload: {}",
            message.topic,
            message.preview()
        );

        let Some(action) = self.topics.resolve(&message.topic) else {
            debug!("Ignoring unrecognized topic {}", message.topic);
            return None;
        };

        let text = match payload::decode(&message.payload) {
            Ok(text) => text,
            Err(e) => {
                let count = state.record_malformed_payload();
                warn!("{} on {} ({} malformed so far)", e, message.topic, count);
                return None;
            }
        };

        match action {
            Action::SetMode(device) => match parse_mode(text) {
                Ok(mode) => {
                    state.set_mode(device, mode);
                    self.publish_status(state.device(device), out);
                    Some(action)
                }
                Err(e) => {
                    let count = state.record_malformed_payload();
                    warn!("{} for {} ({} malformed so far)", e, device, count);
                    None
                }
            },
            Action::Manual(device) => match parse_command(text) {
                Ok(command) => {
                    let transition = state.apply_manual(device, command, now)?;
                    info!("Manual {:?} applied to {}", command, device);
                    self.commit(&transition, out);
                    Some(action)
                }
                Err(e) => {
                    debug!("{} for {}, ignored", e, device);
                    None
                }
            },
            Action::SetThreshold(metric) => {
                let value = match parse_threshold(text) {
                    Ok(value) => value,
                    Err(e) => {
                        let count = state.record_malformed_payload();
                        if self.strict_thresholds {
                            warn!(
                                "Dropping {} threshold update: {} ({} malformed so far)",
                                metric, e, count
                            );
                            return None;
                        }
                        warn!(
                            "{} for {} threshold, storing 0 ({} malformed so far)",
                            e, metric, count
                        );
                        0.0
                    }
                };
                state.set_threshold(metric, value);
                Some(action)
            }
        }
    }

    /// Drives the output and publishes status, plus active time while off
    pub fn commit(&self, transition: &Transition, out: &mut Outputs<'_>) {
        if let Err(e) = out.actuators.drive(transition.device, transition.actuated) {
            error!("Failed to drive {}: {}", transition.device, e);
        }
        self.send(
            out,
            self.topics.status(transition.device),
            format_status(transition.actuated),
        );
        if let Some(secs) = transition.active_secs {
            self.send(out, self.topics.time(transition.device), &secs.to_string());
        }
    }

    pub fn publish_status(&self, device: &Device, out: &mut Outputs<'_>) {
        self.send(
            out,
            self.topics.status(device.kind()),
            format_status(device.is_actuated()),
        );
    }

    pub fn publish_reading(&self, metric: Metric, value: f32, out: &mut Outputs<'_>) {
        self.send(out, self.topics.reading(metric), &format_reading(value));
    }

    // Everything outbound is retained
    fn send(&self, out: &mut Outputs<'_>, topic: &str, payload: &str) {
        if let Err(e) = out.publisher.publish(topic, payload, true) {
            debug!("Dropped publish to {}: {}", topic, e);
        }
    }
}
