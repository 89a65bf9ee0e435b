//! Test utilities for bridge consumers
//!
//! Provides a scripted [`FakeBridge`] so engine and provisioning tests can
//! run without adb or a device.

use std::path::Path;
use std::sync::Mutex;

use hookd_core::prelude::*;
use hookd_core::ShellOutput;

use crate::adb::{BridgeDevice, DeviceBridge};

/// A scripted in-memory device bridge.
///
/// Shell rules are matched by substring against the command, first match
/// wins; unmatched commands succeed with empty output. All shell commands
/// and pushes are recorded for assertions.
#[derive(Debug, Default)]
pub struct FakeBridge {
    devices: Vec<BridgeDevice>,
    shell_rules: Vec<(String, ShellOutput)>,
    fail_substrings: Vec<String>,
    shell_log: Mutex<Vec<String>>,
    push_log: Mutex<Vec<(String, String)>>,
}

impl FakeBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device row to `list_devices` output
    pub fn with_device(mut self, serial: &str, state: &str) -> Self {
        self.devices.push(BridgeDevice {
            serial: serial.to_string(),
            state: state.to_string(),
        });
        self
    }

    /// Respond to shell commands containing `needle` with `stdout`, exit 0
    pub fn on_shell(self, needle: &str, stdout: &str) -> Self {
        self.on_shell_status(needle, stdout, 0)
    }

    /// Respond to shell commands containing `needle` with a full result
    pub fn on_shell_status(mut self, needle: &str, stdout: &str, exit_code: i32) -> Self {
        self.shell_rules.push((
            needle.to_string(),
            ShellOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code,
            },
        ));
        self
    }

    /// Make shell commands containing `needle` return a bridge error
    pub fn fail_shell(mut self, needle: &str) -> Self {
        self.fail_substrings.push(needle.to_string());
        self
    }

    /// Every shell command issued so far, in order
    pub fn shell_commands(&self) -> Vec<String> {
        self.shell_log.lock().unwrap().clone()
    }

    /// Every (local, remote) push issued so far, in order
    pub fn pushes(&self) -> Vec<(String, String)> {
        self.push_log.lock().unwrap().clone()
    }
}

impl DeviceBridge for FakeBridge {
    async fn list_devices(&self) -> Result<Vec<BridgeDevice>> {
        Ok(self.devices.clone())
    }

    async fn shell(&self, _device_id: &str, command: &str) -> Result<ShellOutput> {
        self.shell_log.lock().unwrap().push(command.to_string());

        if self
            .fail_substrings
            .iter()
            .any(|needle| command.contains(needle.as_str()))
        {
            return Err(Error::bridge(format!("scripted failure for: {}", command)));
        }

        let response = self
            .shell_rules
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or(ShellOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            });

        Ok(response)
    }

    async fn push(&self, _device_id: &str, local: &Path, remote: &str) -> Result<()> {
        self.push_log
            .lock()
            .unwrap()
            .push((local.to_string_lossy().to_string(), remote.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_bridge_rules_match_by_substring() {
        let bridge = FakeBridge::new()
            .on_shell("getprop", "arm64-v8a\n")
            .on_shell_status("pidof", "", 1);

        let abi = bridge.shell("d", "getprop ro.product.cpu.abi").await.unwrap();
        assert_eq!(abi.stdout.trim(), "arm64-v8a");

        let pidof = bridge.shell("d", "pidof com.example").await.unwrap();
        assert_eq!(pidof.exit_code, 1);

        // Unmatched commands succeed with empty output
        let other = bridge.shell("d", "true").await.unwrap();
        assert!(other.success());
        assert!(other.stdout.is_empty());

        assert_eq!(bridge.shell_commands().len(), 3);
    }

    #[tokio::test]
    async fn test_fake_bridge_records_pushes() {
        let bridge = FakeBridge::new();
        bridge
            .push("d", Path::new("/tmp/server"), "/data/local/tmp/server")
            .await
            .unwrap();

        assert_eq!(
            bridge.pushes(),
            vec![("/tmp/server".to_string(), "/data/local/tmp/server".to_string())]
        );
    }
}
