//! # hookd-core - Core Domain Types
//!
//! Foundation crate for hookd. Provides domain types, the error taxonomy,
//! engine event definitions, configuration values, and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on
//! external crates (serde, chrono, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`ApplicationInfo`] - Installed app `{name, identifier}` pair
//! - [`ProcessInfo`] - Running process `{pid, name}` pair
//! - [`DeviceSummary`] - Per-device row returned by `listDevices`
//! - [`ShellOutput`] - Pass-through shell result
//! - [`ConnectionStatus`] - Connected / Disconnected
//!
//! ### Events (`events`)
//! - [`EngineEvent`] - Push-channel events (`status`, `frida_console`,
//!   `frida_message`, `frida_error`)
//! - [`ConsoleLevel`] - Severity parsed from `console.<level>` tags
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Failure taxonomy (validation, connectivity, resolution,
//!   attachment, collaborators)
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use hookd_core::prelude::*;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all hookd crates
pub mod prelude {
    pub use super::error::{Error, Result};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use config::{EngineConfig, DEFAULT_SERVER_PATH};
pub use error::{Error, Result};
pub use events::{ConsoleLevel, EngineEvent};
pub use types::{
    ApplicationInfo, ConnectionStatus, DeviceStatusInfo, DeviceSummary, HookOutcome, ProcessInfo,
    ShellOutput,
};
