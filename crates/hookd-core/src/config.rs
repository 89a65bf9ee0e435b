//! Engine configuration values.
//!
//! The engine only consumes these values; how they are loaded (environment,
//! dotfile, flags) is the embedding process's concern. The `hookd` binary
//! reads them from `HOOKD_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Default on-device location of the instrumentation server binary
pub const DEFAULT_SERVER_PATH: &str = "/data/local/tmp/frida-server";

/// Configuration consumed by the engine and the device bridge
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the device-bridge executable (adb)
    pub bridge_path: PathBuf,

    /// On-device path of the instrumentation server binary
    pub server_path: String,

    /// Expected instrumentation-server version. Mismatches produce a status
    /// warning only and never block a connection.
    pub expected_server_version: Option<String>,

    /// Grace period between a successful spawn and the first attach attempt,
    /// letting the target initialize enough to accept agent injection
    pub spawn_grace: Duration,

    /// Grace period after an out-of-band launcher command before querying
    /// the OS for the resulting pid
    pub launch_grace: Duration,

    /// Bounded wait applied to each individual attach strategy
    pub attach_timeout: Duration,

    /// Bounded wait applied to bridge shell commands
    pub shell_timeout: Duration,

    /// Capacity of the subscriber event channel
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bridge_path: PathBuf::from("adb"),
            server_path: DEFAULT_SERVER_PATH.to_string(),
            expected_server_version: None,
            spawn_grace: Duration::from_secs(2),
            launch_grace: Duration::from_secs(3),
            attach_timeout: Duration::from_secs(10),
            shell_timeout: Duration::from_secs(15),
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// File name of the on-device server binary, used for liveness probes
    pub fn server_binary_name(&self) -> &str {
        self.server_path
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.server_path)
    }
}
