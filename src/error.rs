use std::fmt;

use crate::types::{FanSpeed, Mode, Settings, Temperature};

/// A value outside its legal set, rejected before any state change or I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Mode(String),
    FanSpeed(String),
    Temperature(i64),
    Band { min: i64, max: i64 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Mode(m) => {
                write!(f, "mode must be one of cool, heat, dry, fan or auto, got {m}")
            }
            ValidationError::FanSpeed(s) => {
                write!(f, "fan speed must be one of low, medium, high or auto, got {s}")
            }
            ValidationError::Temperature(t) => {
                write!(
                    f,
                    "temperature must be between {} and {}, got {t}",
                    Temperature::MIN,
                    Temperature::MAX
                )
            }
            ValidationError::Band { min, max } => {
                write!(f, "temperature band min {min} is above max {max}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug)]
pub enum Error {
    Validation(ValidationError),
    Lookup {
        mode: Mode,
        fan_speed: FanSpeed,
        temp: Temperature,
    },
    Transmission {
        command_id: String,
        settings: Option<Settings>,
        reason: String,
    },
    Setup(String),
    NotSetUp,
    CommandFile(String),
    Config(String),
    Protocol(String),
    Http(reqwest::Error),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl Error {
    /// Wraps any failure raised while sending `command_id` into a transmission error.
    pub(crate) fn transmission(command_id: &str, cause: Error) -> Self {
        match cause {
            e @ (Error::Transmission { .. } | Error::NotSetUp) => e,
            other => Error::Transmission {
                command_id: command_id.to_string(),
                settings: None,
                reason: other.to_string(),
            },
        }
    }

    pub(crate) fn setup(cause: Error) -> Self {
        match cause {
            e @ Error::Setup(_) => e,
            other => Error::Setup(other.to_string()),
        }
    }

    /// Attaches the settings an update was trying to apply.
    pub(crate) fn with_settings(self, applied: Settings) -> Self {
        match self {
            Error::Transmission {
                command_id, reason, ..
            } => Error::Transmission {
                command_id,
                settings: Some(applied),
                reason,
            },
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(e) => write!(f, "validation error: {e}"),
            Error::Lookup {
                mode,
                fan_speed,
                temp,
            } => write!(
                f,
                "no command for mode {mode}, fan speed {fan_speed}, temperature {temp}"
            ),
            Error::Transmission {
                command_id,
                settings: Some(s),
                reason,
            } => write!(
                f,
                "sending command {command_id} (mode {}, fan speed {}, temperature {}) failed: {reason}",
                s.mode, s.fan_speed, s.temp
            ),
            Error::Transmission {
                command_id, reason, ..
            } => write!(f, "sending command {command_id} failed: {reason}"),
            Error::Setup(msg) => write!(f, "gateway setup failed: {msg}"),
            Error::NotSetUp => write!(f, "gateway not set up"),
            Error::CommandFile(msg) => write!(f, "invalid command file: {msg}"),
            Error::Config(msg) => write!(f, "invalid configuration: {msg}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Validation(e) => Some(e),
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Validation(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
