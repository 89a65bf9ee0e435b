//! adb-backed device bridge

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;

use hookd_core::prelude::*;
use hookd_core::{EngineConfig, ShellOutput};

/// Default timeout for bridge commands
const BRIDGE_TIMEOUT: Duration = Duration::from_secs(15);

/// Command-line capability against devices: list them, run shell commands,
/// push files. The engine only ever sees this trait.
#[trait_variant::make(DeviceBridge: Send)]
pub trait LocalDeviceBridge {
    /// List devices visible to the bridge daemon
    async fn list_devices(&self) -> Result<Vec<BridgeDevice>>;

    /// Run a shell command on one device and capture its output
    async fn shell(&self, device_id: &str, command: &str) -> Result<ShellOutput>;

    /// Push a local file to a path on the device
    async fn push(&self, device_id: &str, local: &Path, remote: &str) -> Result<()>;
}

/// A device row as reported by `adb devices`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeDevice {
    /// Device serial
    pub serial: String,

    /// Bridge-reported state ("device", "offline", "unauthorized", ...)
    pub state: String,
}

impl BridgeDevice {
    /// Whether the bridge considers the device usable
    pub fn is_ready(&self) -> bool {
        self.state == "device"
    }
}

/// [`DeviceBridge`] implementation shelling out to the adb executable
#[derive(Debug, Clone)]
pub struct AdbBridge {
    adb_path: PathBuf,
    command_timeout: Duration,
}

impl AdbBridge {
    pub fn new(adb_path: impl Into<PathBuf>) -> Self {
        Self {
            adb_path: adb_path.into(),
            command_timeout: BRIDGE_TIMEOUT,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            adb_path: config.bridge_path.clone(),
            command_timeout: config.shell_timeout,
        }
    }

    pub fn with_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    /// Run adb with the given arguments, capturing output with a bounded wait
    async fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        debug!("Running {} {}", self.adb_path.display(), args.join(" "));

        let result = timeout(
            self.command_timeout,
            Command::new(&self.adb_path)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| {
            Error::bridge(format!(
                "bridge command timed out after {:?}: adb {}",
                self.command_timeout,
                args.join(" ")
            ))
        })?;

        result.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::BridgeToolNotFound {
                    path: self.adb_path.clone(),
                }
            } else {
                Error::bridge(format!("failed to run adb: {}", e))
            }
        })
    }
}

impl DeviceBridge for AdbBridge {
    async fn list_devices(&self) -> Result<Vec<BridgeDevice>> {
        let output = self.run(&["devices"]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::bridge(format!(
                "adb devices failed with exit code {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_devices_output(&stdout))
    }

    async fn shell(&self, device_id: &str, command: &str) -> Result<ShellOutput> {
        let output = self.run(&["-s", device_id, "shell", command]).await?;

        Ok(ShellOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn push(&self, device_id: &str, local: &Path, remote: &str) -> Result<()> {
        let local_str = local.to_string_lossy();
        let output = self
            .run(&["-s", device_id, "push", local_str.as_ref(), remote])
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::bridge(format!(
                "push to {} failed: {}",
                remote,
                stderr.trim()
            )))
        }
    }
}

/// Parse the output of `adb devices`.
///
/// The header line and daemon-startup noise lines are skipped; anything that
/// does not look like a `serial<TAB>state` row is ignored.
fn parse_devices_output(output: &str) -> Vec<BridgeDevice> {
    output
        .lines()
        .skip_while(|line| !line.starts_with("List of devices"))
        .skip(1)
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('*') {
                return None;
            }
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            Some(BridgeDevice {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devices_output() {
        let output = "List of devices attached\n\
                      emulator-5554\tdevice\n\
                      0123456789ABCDEF\tunauthorized\n";

        let devices = parse_devices_output(output);

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].serial, "emulator-5554");
        assert!(devices[0].is_ready());
        assert_eq!(devices[1].state, "unauthorized");
        assert!(!devices[1].is_ready());
    }

    #[test]
    fn test_parse_devices_skips_daemon_noise() {
        let output = "* daemon not running; starting now at tcp:5037\n\
                      * daemon started successfully\n\
                      List of devices attached\n\
                      emulator-5554\tdevice\n";

        let devices = parse_devices_output(output);

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].serial, "emulator-5554");
    }

    #[test]
    fn test_parse_devices_empty() {
        let devices = parse_devices_output("List of devices attached\n\n");
        assert!(devices.is_empty());
    }

    #[test]
    fn test_parse_devices_no_header() {
        // Garbage with no header yields nothing rather than bogus rows
        let devices = parse_devices_output("error: cannot connect to daemon\n");
        assert!(devices.is_empty());
    }

    #[cfg(unix)]
    mod fake_adb {
        use super::*;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        /// Write an executable stand-in for adb into a temp dir
        fn write_fake_adb(dir: &tempfile::TempDir, script: &str) -> PathBuf {
            let path = dir.path().join("adb");
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "#!/bin/sh\n{}", script).unwrap();
            let mut perms = file.metadata().unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        #[tokio::test]
        async fn test_shell_captures_output_and_exit_code() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_fake_adb(&dir, "echo out-line; echo err-line >&2; exit 3");
            let bridge = AdbBridge::new(path);

            let result = DeviceBridge::shell(&bridge, "emulator-5554", "id")
                .await
                .unwrap();

            assert_eq!(result.stdout.trim(), "out-line");
            assert_eq!(result.stderr.trim(), "err-line");
            assert_eq!(result.exit_code, 3);
            assert!(!result.success());
        }

        #[tokio::test]
        async fn test_list_devices_parses_fake_output() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_fake_adb(
                &dir,
                "printf 'List of devices attached\\nemulator-5554\\tdevice\\n'",
            );
            let bridge = AdbBridge::new(path);

            let devices = DeviceBridge::list_devices(&bridge).await.unwrap();

            assert_eq!(devices.len(), 1);
            assert_eq!(devices[0].serial, "emulator-5554");
        }

        #[tokio::test]
        async fn test_missing_executable_is_reported() {
            let bridge = AdbBridge::new("/nonexistent/path/to/adb");
            let err = DeviceBridge::list_devices(&bridge).await.unwrap_err();
            assert!(matches!(err, Error::BridgeToolNotFound { .. }));
        }

        #[tokio::test]
        async fn test_command_timeout() {
            let dir = tempfile::tempdir().unwrap();
            let path = write_fake_adb(&dir, "sleep 10");
            let bridge = AdbBridge::new(path).with_timeout(Duration::from_millis(100));

            let err = DeviceBridge::shell(&bridge, "d", "true").await.unwrap_err();
            assert!(err.to_string().contains("timed out"));
        }
    }
}
