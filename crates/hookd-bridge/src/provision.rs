//! On-device instrumentation-server provisioning.
//!
//! These are the per-device preparation steps that must have happened before
//! the engine records a connection: make sure the server binary is present
//! and running, and report (never enforce) its version.

use std::path::Path;
use std::time::Duration;

use tokio::time::sleep;

use hookd_core::prelude::*;

use crate::adb::DeviceBridge;

/// Wait after starting the server before the device is considered usable
const SERVER_BOOT_GRACE: Duration = Duration::from_secs(2);

/// Device ABI as reported by `ro.product.cpu.abi`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerAbi {
    Arm64,
    Arm,
    X86_64,
    X86,
}

impl ServerAbi {
    /// Map a `getprop ro.product.cpu.abi` value to a server ABI.
    ///
    /// Unknown or missing values fall back to [`ServerAbi::Arm64`]; modern
    /// Android hardware is overwhelmingly arm64 and a wrong guess surfaces
    /// immediately when the pushed binary fails to start.
    pub fn from_abi_string(abi: Option<&str>) -> Self {
        match abi.map(str::trim) {
            Some("arm64-v8a") => ServerAbi::Arm64,
            Some("armeabi-v7a") | Some("armeabi") => ServerAbi::Arm,
            Some("x86_64") => ServerAbi::X86_64,
            Some("x86") => ServerAbi::X86,
            other => {
                warn!("Unrecognized device ABI {:?}, defaulting to arm64", other);
                ServerAbi::Arm64
            }
        }
    }

    /// Suffix of the matching server release artifact
    pub fn artifact_suffix(&self) -> &'static str {
        match self {
            ServerAbi::Arm64 => "android-arm64",
            ServerAbi::Arm => "android-arm",
            ServerAbi::X86_64 => "android-x86_64",
            ServerAbi::X86 => "android-x86",
        }
    }
}

/// Outcome of [`ensure_server`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    AlreadyRunning,
    Started,
}

/// Result of a server version probe. Mismatches are informational only.
#[derive(Debug, Clone)]
pub struct VersionCheck {
    pub reported: Option<String>,
    pub expected: Option<String>,
}

impl VersionCheck {
    /// The (reported, expected) pair when both are known and differ
    pub fn mismatch(&self) -> Option<(&str, &str)> {
        match (self.reported.as_deref(), self.expected.as_deref()) {
            (Some(reported), Some(expected)) if reported != expected => {
                Some((reported, expected))
            }
            _ => None,
        }
    }
}

/// Check whether the server process is present in the device's process list
pub async fn server_running<B: DeviceBridge + Sync>(
    bridge: &B,
    device_id: &str,
    server_binary: &str,
) -> Result<bool> {
    let output = bridge.shell(device_id, "ps -A").await?;

    // Toybox ps on old builds rejects -A; retry plain ps before giving up
    let listing = if output.success() && !output.stdout.trim().is_empty() {
        output.stdout
    } else {
        bridge.shell(device_id, "ps").await?.stdout
    };

    Ok(listing
        .lines()
        .any(|line| line.split_whitespace().last() == Some(server_binary)))
}

/// Start the server in the background under su
pub async fn start_server<B: DeviceBridge + Sync>(
    bridge: &B,
    device_id: &str,
    server_path: &str,
) -> Result<()> {
    info!("Starting instrumentation server on {}", device_id);

    let command = format!("su -c \"{} &\"", server_path);
    let output = bridge.shell(device_id, &command).await?;

    if !output.success() {
        return Err(Error::provisioning(format!(
            "failed to start {} on {}: {}",
            server_path,
            device_id,
            output.stderr.trim()
        )));
    }

    sleep(SERVER_BOOT_GRACE).await;
    Ok(())
}

/// Make sure the server is running, starting it if necessary
pub async fn ensure_server<B: DeviceBridge + Sync>(
    bridge: &B,
    device_id: &str,
    server_path: &str,
    server_binary: &str,
) -> Result<ProvisionOutcome> {
    if server_running(bridge, device_id, server_binary).await? {
        debug!("Instrumentation server already running on {}", device_id);
        return Ok(ProvisionOutcome::AlreadyRunning);
    }

    start_server(bridge, device_id, server_path).await?;
    Ok(ProvisionOutcome::Started)
}

/// Detect the device ABI, falling back to arm64 when the query fails
pub async fn detect_abi<B: DeviceBridge + Sync>(bridge: &B, device_id: &str) -> ServerAbi {
    match bridge.shell(device_id, "getprop ro.product.cpu.abi").await {
        Ok(output) if output.success() => ServerAbi::from_abi_string(Some(output.stdout.trim())),
        Ok(output) => {
            warn!(
                "ABI query on {} failed ({}), defaulting to arm64",
                device_id,
                output.stderr.trim()
            );
            ServerAbi::Arm64
        }
        Err(e) => {
            warn!("ABI query on {} errored ({}), defaulting to arm64", device_id, e);
            ServerAbi::Arm64
        }
    }
}

/// Push a server binary to the device and mark it executable
pub async fn install_server<B: DeviceBridge + Sync>(
    bridge: &B,
    device_id: &str,
    local_binary: &Path,
    server_path: &str,
) -> Result<()> {
    info!(
        "Installing instrumentation server on {}: {} -> {}",
        device_id,
        local_binary.display(),
        server_path
    );

    bridge.push(device_id, local_binary, server_path).await?;

    let chmod = format!("su -c \"chmod 755 {}\"", server_path);
    let output = bridge.shell(device_id, &chmod).await?;
    if !output.success() {
        return Err(Error::provisioning(format!(
            "chmod of {} failed: {}",
            server_path,
            output.stderr.trim()
        )));
    }

    Ok(())
}

/// Query the server's version string for an informational compatibility check
pub async fn check_server_version<B: DeviceBridge + Sync>(
    bridge: &B,
    device_id: &str,
    server_path: &str,
    expected: Option<&str>,
) -> VersionCheck {
    let reported = match bridge
        .shell(device_id, &format!("{} --version", server_path))
        .await
    {
        Ok(output) if output.success() => {
            let version = output.stdout.trim().to_string();
            (!version.is_empty()).then_some(version)
        }
        Ok(_) | Err(_) => None,
    };

    VersionCheck {
        reported,
        expected: expected.map(str::to_string),
    }
}
