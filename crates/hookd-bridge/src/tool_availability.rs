//! Tool availability checking for the device bridge
//!
//! Checks that the adb executable the engine is configured with actually
//! resolves to something runnable, for a useful `doctor` report before any
//! device work is attempted.

use std::path::{Path, PathBuf};

/// Cached availability of the bridge executable
#[derive(Debug, Clone, Default)]
pub struct ToolAvailability {
    /// Resolved path to adb if found
    pub adb_path: Option<PathBuf>,
}

impl ToolAvailability {
    /// Check tool availability (run once at startup)
    pub fn check(bridge_path: &Path) -> Self {
        let adb_path = which::which(bridge_path)
            .inspect_err(|e| tracing::debug!("adb lookup failed for {:?}: {}", bridge_path, e))
            .ok();

        Self { adb_path }
    }

    pub fn adb_available(&self) -> bool {
        self.adb_path.is_some()
    }

    /// Get user-friendly message when the bridge tool is unavailable
    pub fn adb_unavailable_message(&self) -> Option<&'static str> {
        if self.adb_available() {
            None
        } else {
            Some("adb not found. Install Android platform tools or set HOOKD_ADB_PATH.")
        }
    }
}
