//! Domain types shared across the workspace

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection status of a device as tracked by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// An installed application as enumerated by the instrumentation engine.
///
/// Also the shape of resolver suggestions and `searchApps` results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationInfo {
    pub name: String,
    pub identifier: String,
}

impl ApplicationInfo {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
        }
    }
}

/// A running process as enumerated by the instrumentation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

/// Per-device status row returned by `listDevices`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    /// Device serial / identifier
    pub id: String,

    /// Bridge-reported state ("device", "offline", "unauthorized", ...)
    pub status: String,

    /// Whether this engine holds a live connection to the device
    pub connected: bool,

    /// Identifiers of applications with an active session, in hook order
    #[serde(default)]
    pub apps: Vec<String>,

    /// Whether the on-device instrumentation server appears to be running
    #[serde(default)]
    pub instrumentation_server_running: bool,
}

/// Result of a pass-through shell execution on a device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Outcome of a successful `hook` operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutcome {
    pub device_id: String,

    /// Canonical identifier after resolution (on-device casing preserved)
    pub app_id: String,

    /// Pid the session attached to, when attachment went through a pid
    #[serde(default)]
    pub pid: Option<u32>,
}

/// Connection info returned by the device connection manager's `status`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusInfo {
    pub id: String,
    pub status: ConnectionStatus,
    pub connected_at: DateTime<Utc>,
}
