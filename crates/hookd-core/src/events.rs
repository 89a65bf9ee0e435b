//! Asynchronous event stream pushed to front-door subscribers

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Console severity extracted from a `console.<level>` type tag.
///
/// Unknown level tags fall back to [`ConsoleLevel::Log`] rather than dropping
/// the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Debug,
    Log,
    Info,
    Warn,
    Error,
}

impl ConsoleLevel {
    /// Parse the `<level>` part of a `console.<level>` tag
    pub fn parse(level: &str) -> Self {
        match level {
            "debug" => ConsoleLevel::Debug,
            "info" => ConsoleLevel::Info,
            "warn" | "warning" => ConsoleLevel::Warn,
            "error" => ConsoleLevel::Error,
            _ => ConsoleLevel::Log,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleLevel::Debug => "debug",
            ConsoleLevel::Log => "log",
            ConsoleLevel::Info => "info",
            ConsoleLevel::Warn => "warn",
            ConsoleLevel::Error => "error",
        }
    }
}

/// One event on the push channel to subscribers.
///
/// Variant tags keep the historical wire names (`frida_*`) so existing
/// front-door clients keep working unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Informational / diagnostic status line
    Status { message: String },

    /// Structured console output intercepted from the target process
    #[serde(rename = "frida_console")]
    Console {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "appId")]
        app_id: String,
        level: ConsoleLevel,
        message: String,
    },

    /// Payload-defined message forwarded unchanged
    #[serde(rename = "frida_message")]
    Message {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "appId")]
        app_id: String,
        payload: Value,
    },

    /// Engine-reported error for an attached session
    #[serde(rename = "frida_error")]
    Error {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "appId")]
        app_id: String,
        error: String,
    },
}

impl EngineEvent {
    pub fn status(message: impl Into<String>) -> Self {
        EngineEvent::Status {
            message: message.into(),
        }
    }

    /// Device this event relates to, if any
    pub fn device_id(&self) -> Option<&str> {
        match self {
            EngineEvent::Status { .. } => None,
            EngineEvent::Console { device_id, .. }
            | EngineEvent::Message { device_id, .. }
            | EngineEvent::Error { device_id, .. } => Some(device_id),
        }
    }
}
