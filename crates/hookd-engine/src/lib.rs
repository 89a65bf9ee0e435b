//! # hookd-engine - Session Orchestration Engine
//!
//! Given a device identifier and an application identifier, resolves the
//! correct running process, attaches an instrumentation session (spawning
//! the app if necessary), loads the payload, and keeps a consistent registry
//! of active sessions across many devices and many hooked apps per device.
//!
//! Depends on [`hookd_core`] for domain types and [`hookd_bridge`] for the
//! device-bridge capability. The instrumentation engine itself is abstract:
//! the [`Engine`] is generic over the [`InstrumentHost`] capability traits.
//!
//! ## Public API
//!
//! ### Facade (`engine`)
//! - [`Engine`] - hook/unhook, connect/disconnect, search, list, shell
//!
//! ### Capabilities (`instrument`)
//! - [`InstrumentHost`] / [`InstrumentDevice`] / [`InstrumentSession`] /
//!   [`InstrumentScript`] - What a native instrumentation backend provides
//! - [`AttachFailure`] - Closed set of attach failure reasons
//! - [`SessionMessage`] - Messages delivered by an attached session
//!
//! ### Orchestration pieces
//! - [`resolver`] - Identifier resolution and search ranking
//! - [`locator`] - Running-process location and spawn-with-grace
//! - [`attach`] - The attachment fallback chain
//! - [`registry`] - Per-key-serialized session table
//! - [`router`] - Message classification and the console shim
//! - [`devices`] - Device connection manager
//!
//! ## Control flow
//!
//! A hook request: connection gate → package resolver → process locator →
//! attachment fallback chain → session registry (replace previous) →
//! payload load → message router. Unhook reverses the registry mutation;
//! disconnect cascades over every app hooked on the device.

pub mod attach;
pub mod bus;
pub mod devices;
pub mod engine;
pub mod instrument;
pub mod locator;
pub mod registry;
pub mod resolver;
pub mod router;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

pub use attach::{AttachMethod, AttachOutcome, AttachTarget, AttachmentAttempt};
pub use bus::EventBus;
pub use devices::{DeviceRecord, DeviceRegistry};
pub use engine::Engine;
pub use instrument::{
    AttachFailure, InstrumentDevice, InstrumentHost, InstrumentScript, InstrumentSession,
    LocalInstrumentDevice, LocalInstrumentHost, LocalInstrumentScript, LocalInstrumentSession,
    SessionMessage, SpawnFailure,
};
pub use locator::{ensure_running, LaunchState};
pub use registry::{SessionEntry, SessionKey, SessionRegistry};
pub use resolver::{rank_applications, resolve, Resolution, MAX_SUGGESTIONS};
pub use router::{classify, wrap_payload, CONSOLE_SHIM};
