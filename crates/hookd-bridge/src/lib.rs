//! # hookd-bridge - Device Bridge
//!
//! The command-line side of device management: listing devices through adb,
//! running shell commands against one device, pushing files, and the
//! on-device instrumentation-server provisioning workflows.
//!
//! The orchestration engine consumes only the [`DeviceBridge`] trait; the
//! adb-backed [`AdbBridge`] is the production implementation.
//!
//! Depends on [`hookd_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Bridge
//! - [`DeviceBridge`] - Capability trait `{list_devices, shell, push}`
//! - [`AdbBridge`] - adb-backed implementation with bounded waits
//! - [`BridgeDevice`] - A `serial`/`state` row from `adb devices`
//!
//! ### Provisioning
//! - [`ensure_server`] / [`start_server`] / [`server_running`] - Server
//!   lifecycle on a device
//! - [`install_server`] - Push + chmod of the server binary
//! - [`detect_abi`] - ABI detection with an arm64 fail-open default
//! - [`check_server_version`] - Informational version probe (never blocks)
//!
//! ### Diagnostics
//! - [`ToolAvailability`] - adb presence check for `doctor`

pub mod adb;
pub mod provision;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod tool_availability;

pub use adb::{AdbBridge, BridgeDevice, DeviceBridge, LocalDeviceBridge};
pub use provision::{
    check_server_version, detect_abi, ensure_server, install_server, server_running, start_server,
    ProvisionOutcome, ServerAbi, VersionCheck,
};
pub use tool_availability::ToolAvailability;
