//! Payload codecs for the text protocol.

use crate::controller::{Command, Mode};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PayloadError {
    #[error("Payload is not valid UTF-8")]
    NotUtf8,

    #[error("Unknown mode '{0}'")]
    UnknownMode(String),

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("'{0}' is not a decimal number")]
    NotANumber(String),
}

pub fn decode(payload: &[u8]) -> Result<&str, PayloadError> {
    std::str::from_utf8(payload).map_err(|_| PayloadError::NotUtf8)
}

pub fn parse_mode(text: &str) -> Result<Mode, PayloadError> {
    match text {
        "AUTO" => Ok(Mode::Automatic),
        "MANUAL" => Ok(Mode::Manual),
        other => Err(PayloadError::UnknownMode(other.to_string())),
    }
}

pub fn parse_command(text: &str) -> Result<Command, PayloadError> {
    match text {
        "ON" => Ok(Command::On),
        "OFF" => Ok(Command::Off),
        other => Err(PayloadError::UnknownCommand(other.to_string())),
    }
}

/// Surrounding whitespace is tolerated; NaN and infinities are not
pub fn parse_threshold(text: &str) -> Result<f32, PayloadError> {
    text.trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| PayloadError::NotANumber(text.to_string()))
}

/// Readings are published with two decimals
pub fn format_reading(value: f32) -> String {
    format!("{:.2}", value)
}

pub fn format_status(actuated: bool) -> &'static str {
    if actuated {
        "ON"
    } else {
        "OFF"
    }
}
