//! Instrumentation engine capability traits.
//!
//! The orchestration engine is generic over these traits; the production
//! implementation wraps the native instrumentation library, tests use the
//! scripted fakes in [`crate::test_utils`].

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use hookd_core::prelude::*;
use hookd_core::{ApplicationInfo, ProcessInfo};

/// Closed set of attachment failure reasons.
///
/// The fallback chain branches on these variants explicitly; implementations
/// must map their native errors onto this set rather than leaving callers to
/// match on error text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachFailure {
    /// No process matched the requested pid or name
    #[error("no process matched the target")]
    ProcessNotFound,

    /// The OS or target refused the attachment
    #[error("permission denied")]
    PermissionDenied,

    /// The engine stopped waiting for the device
    #[error("attach timed out")]
    TimedOut,

    /// Anything else the engine reported
    #[error("{0}")]
    Engine(String),
}

/// Spawn failure. Never fatal on its own: the locator degrades to
/// name-based attachment downstream.
#[derive(Debug, Clone, Error)]
#[error("spawn failed: {message}")]
pub struct SpawnFailure {
    pub message: String,
}

impl SpawnFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One asynchronous message delivered by an attached session's script
#[derive(Debug, Clone)]
pub enum SessionMessage {
    /// Script-emitted payload (the `send` envelope already unwrapped)
    Payload(Value),

    /// Engine-reported error, not an application payload
    Error { description: String },
}

/// Entry point into the instrumentation engine: device lookup
#[trait_variant::make(InstrumentHost: Send)]
pub trait LocalInstrumentHost: Sync {
    type Device: InstrumentDevice + Sync + 'static;

    /// Resolve a device handle by identifier.
    ///
    /// The device must already have been prepared (server provisioned and
    /// running) by the bridge-side collaborator.
    async fn device(&self, device_id: &str) -> Result<Self::Device>;
}

/// A device the engine can enumerate, spawn on, and attach to
#[trait_variant::make(InstrumentDevice: Send)]
pub trait LocalInstrumentDevice: Sync {
    type Session: InstrumentSession + Sync + 'static;

    async fn enumerate_applications(&self) -> Result<Vec<ApplicationInfo>>;

    async fn enumerate_processes(&self) -> Result<Vec<ProcessInfo>>;

    /// Spawn the app suspended, returning its pid
    async fn spawn(&self, app_id: &str) -> std::result::Result<u32, SpawnFailure>;

    /// Resume a process previously spawned suspended
    async fn resume(&self, pid: u32) -> Result<()>;

    async fn attach_pid(&self, pid: u32) -> std::result::Result<Self::Session, AttachFailure>;

    async fn attach_name(&self, name: &str)
        -> std::result::Result<Self::Session, AttachFailure>;
}

/// A live attachment to one target process
#[trait_variant::make(InstrumentSession: Send)]
pub trait LocalInstrumentSession: Sync {
    type Script: InstrumentScript + Sync + 'static;

    /// Create a script from source. Messages the script emits are delivered
    /// on `messages` in the engine's delivery order; the channel is the one
    /// handler registered for this session.
    async fn create_script(
        &self,
        source: &str,
        messages: mpsc::Sender<SessionMessage>,
    ) -> Result<Self::Script>;

    async fn detach(&self) -> Result<()>;
}

/// A script created within a session
#[trait_variant::make(InstrumentScript: Send)]
pub trait LocalInstrumentScript: Sync {
    /// Inject and run the script inside the target
    async fn load(&self) -> Result<()>;

    async fn unload(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_failure_display() {
        assert_eq!(
            AttachFailure::ProcessNotFound.to_string(),
            "no process matched the target"
        );
        assert_eq!(AttachFailure::PermissionDenied.to_string(), "permission denied");
        assert_eq!(
            AttachFailure::Engine("device rebooted".to_string()).to_string(),
            "device rebooted"
        );
    }

    #[test]
    fn test_spawn_failure_display() {
        let failure = SpawnFailure::new("no launchable activity");
        assert_eq!(failure.to_string(), "spawn failed: no launchable activity");
    }
}
