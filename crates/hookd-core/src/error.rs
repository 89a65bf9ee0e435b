//! Engine error types organized by failure class

use thiserror::Error;

use crate::types::ApplicationInfo;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the orchestration engine.
///
/// Validation and connectivity errors fail fast with no partial mutation.
/// Mid-chain attachment failures are recovered locally; only exhaustion of
/// the fallback chain surfaces as [`Error::Attach`]. Teardown failures never
/// appear here at all; they are demoted to status events.
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Request validation
    // ─────────────────────────────────────────────────────────────
    #[error("Missing required field: {field}")]
    Validation { field: String },

    // ─────────────────────────────────────────────────────────────
    // Device connectivity
    // ─────────────────────────────────────────────────────────────
    #[error("Device not connected: {device_id}")]
    DeviceNotConnected { device_id: String },

    // ─────────────────────────────────────────────────────────────
    // Package resolution
    // ─────────────────────────────────────────────────────────────
    #[error("No installed application matches '{query}' on {device_id}")]
    PackageNotFound { device_id: String, query: String },

    #[error("Ambiguous application identifier '{query}' ({} candidates)", suggestions.len())]
    PackageAmbiguous {
        query: String,
        suggestions: Vec<ApplicationInfo>,
    },

    // ─────────────────────────────────────────────────────────────
    // Attachment
    // ─────────────────────────────────────────────────────────────
    #[error(
        "Failed to attach to {app_id} on {device_id}: {reason}. \
         Verify the app is installed and the package name is correct, \
         or launch it manually and retry."
    )]
    Attach {
        device_id: String,
        app_id: String,
        reason: String,
    },

    // ─────────────────────────────────────────────────────────────
    // Collaborators
    // ─────────────────────────────────────────────────────────────
    #[error(
        "Device bridge executable not found: {path}. \
         Install Android platform tools or set HOOKD_ADB_PATH."
    )]
    BridgeToolNotFound { path: std::path::PathBuf },

    #[error("Device bridge error: {message}")]
    Bridge { message: String },

    #[error("Provisioning error: {message}")]
    Provisioning { message: String },

    #[error("Instrumentation engine error: {message}")]
    Engine { message: String },

    // ─────────────────────────────────────────────────────────────
    // Registry
    // ─────────────────────────────────────────────────────────────
    #[error("No active session for {app_id} on {device_id}")]
    SessionNotFound { device_id: String, app_id: String },

    // ─────────────────────────────────────────────────────────────
    // Infrastructure
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Channel send error: {message}")]
    ChannelSend { message: String },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn validation(field: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
        }
    }

    pub fn device_not_connected(device_id: impl Into<String>) -> Self {
        Self::DeviceNotConnected {
            device_id: device_id.into(),
        }
    }

    pub fn package_not_found(device_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self::PackageNotFound {
            device_id: device_id.into(),
            query: query.into(),
        }
    }

    pub fn attach(
        device_id: impl Into<String>,
        app_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Attach {
            device_id: device_id.into(),
            app_id: app_id.into(),
            reason: reason.into(),
        }
    }

    pub fn bridge(message: impl Into<String>) -> Self {
        Self::Bridge {
            message: message.into(),
        }
    }

    pub fn provisioning(message: impl Into<String>) -> Self {
        Self::Provisioning {
            message: message.into(),
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    pub fn session_not_found(device_id: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self::SessionNotFound {
            device_id: device_id.into(),
            app_id: app_id.into(),
        }
    }

    pub fn channel_send(message: impl Into<String>) -> Self {
        Self::ChannelSend {
            message: message.into(),
        }
    }

    /// Resolver suggestions attached to this error, if any.
    ///
    /// The front door serializes these alongside the error message so the
    /// operator can pick a candidate instead of retyping the identifier.
    pub fn suggestions(&self) -> Option<&[ApplicationInfo]> {
        match self {
            Error::PackageAmbiguous { suggestions, .. } => Some(suggestions),
            _ => None,
        }
    }

    /// Check whether this error should be rejected before touching a device
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }
}
