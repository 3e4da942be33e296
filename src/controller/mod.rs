//! Device control subsystem
//!
//! ```text
//! Measurement ──► Device (mode + threshold rule) ──► Transition ──► Actuators / Router
//!                     ▲
//! ControllerState ────┘ (modes, thresholds, timing)
//! ```
//!
//! - [`device`] - per-actuator logic: mode arbitration, threshold rules, activation timing
//! - [`state`] - the mode & threshold store owned by the event loop
//! - [`actuator`] - physical outputs (simulated or relay board)

pub mod actuator;
pub mod device;
pub mod state;

pub use actuator::{ActuatorError, Actuators, RelayBoard, SimulatedActuators};
pub use device::{Command, Device, DeviceKind, Measurement, Mode, Transition};
pub use state::{ControllerState, ModeDefaults, Thresholds};
