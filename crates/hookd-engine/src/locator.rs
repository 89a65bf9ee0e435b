//! Process location: is the target running, and if not, start it

use tokio::time::{sleep, timeout};

use hookd_core::prelude::*;
use hookd_core::EngineConfig;

use crate::bus::EventBus;
use crate::instrument::{InstrumentDevice, SpawnFailure};

/// How the target process came to be (or failed to come to be) running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    /// Already running; attachment goes by name, no pid needed
    Running,

    /// Spawned by us, suspended, pid known
    Spawned { pid: u32 },

    /// Not running and spawn failed; attachment falls back to name
    NotStarted,
}

impl LaunchState {
    pub fn pid(&self) -> Option<u32> {
        match self {
            LaunchState::Spawned { pid } => Some(*pid),
            _ => None,
        }
    }
}

/// Make sure the target application is running.
///
/// Never errors on spawn failure: a failed or timed-out spawn degrades to
/// name-based attachment downstream and is reported on the status stream.
/// Enumeration failures do propagate, since nothing can be attached without
/// them.
pub async fn ensure_running<D>(
    device: &D,
    app_id: &str,
    config: &EngineConfig,
    bus: &EventBus,
) -> Result<LaunchState>
where
    D: InstrumentDevice + Sync,
{
    let processes = device.enumerate_processes().await?;

    if processes.iter().any(|p| p.name == app_id) {
        debug!("{} is already running", app_id);
        return Ok(LaunchState::Running);
    }

    bus.status(format!("{} is not running, spawning it", app_id));

    let spawned = timeout(config.attach_timeout, device.spawn(app_id))
        .await
        .unwrap_or_else(|_| Err(SpawnFailure::new("spawn timed out")));

    match spawned {
        Ok(pid) => {
            bus.status(format!("Spawned {} with pid {}", app_id, pid));
            // Let the process initialize far enough to accept injection
            sleep(config.spawn_grace).await;
            Ok(LaunchState::Spawned { pid })
        }
        Err(failure) => {
            warn!("Spawn of {} failed: {}", app_id, failure);
            bus.status(format!(
                "Spawn of {} failed ({}), will attach by name",
                app_id, failure
            ));
            Ok(LaunchState::NotStarted)
        }
    }
}
