use super::ControlLoop;
use crate::controller::{Actuators, ControllerState};
use crate::mqtt::{InboundMessage, Publisher};
use crate::router::{MessageRouter, Outputs};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Single writer of [`ControllerState`].
///
/// Ticks and inbound messages are handled one at a time on the same task, so
/// every read-modify-write of a device or threshold runs to completion before
/// the next one starts. The transport supervisor lives on another task and only
/// talks to this loop through the inbound channel.
pub struct GardenLoop {
    state: ControllerState,
    router: MessageRouter,
    control: ControlLoop,
    actuators: Box<dyn Actuators>,
    publisher: Box<dyn Publisher>,
    inbound: mpsc::Receiver<InboundMessage>,
    tick_interval: Duration,
}

impl GardenLoop {
    pub fn new(
        state: ControllerState,
        router: MessageRouter,
        control: ControlLoop,
        actuators: Box<dyn Actuators>,
        publisher: Box<dyn Publisher>,
        inbound: mpsc::Receiver<InboundMessage>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            state,
            router,
            control,
            actuators,
            publisher,
            inbound,
            tick_interval,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn handle_tick(&mut self, now: Instant) {
        let mut out = Outputs {
            actuators: self.actuators.as_mut(),
            publisher: self.publisher.as_mut(),
        };
        self.control.tick(&mut self.state, &self.router, &mut out, now);
    }

    pub fn handle_message(&mut self, message: &InboundMessage, now: Instant) {
        let mut out = Outputs {
            actuators: self.actuators.as_mut(),
            publisher: self.publisher.as_mut(),
        };
        self.router.dispatch(&mut self.state, message, now, &mut out);
    }

    /// Runs until `shutdown` fires and hands back the final state
    pub async fn run(mut self, shutdown: CancellationToken) -> ControllerState {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut inbound_open = true;

        info!(
            "Control loop started on {}/#, ticking every {:?}",
            self.router.topics().namespace(),
            self.tick_interval
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.handle_tick(now());
                }
                message = self.inbound.recv(), if inbound_open => match message {
                    Some(message) => self.handle_message(&message, now()),
                    None => {
                        warn!("Inbound channel closed, continuing without remote control");
                        inbound_open = false;
                    }
                },
            }
        }

        info!(
            "Control loop stopped after {} ticks ({} sensor failures, {} malformed payloads)",
            self.control.ticks(),
            self.control.sensor_failures(),
            self.state.malformed_payloads()
        );
        for device in self.state.devices() {
            info!(
                "{}: {}s active in total",
                device.kind(),
                device.total_active_secs()
            );
        }
        self.state
    }
}

// Follows tokio's clock so paused-time tests see ticks advance
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
