//! Attachment fallback chain.
//!
//! Turns a process handle (or the lack of one) into an attached session by
//! trying successively weaker matching strategies. A step runs only if the
//! previous one failed because no process matched (or timed out); any other
//! failure aborts the chain and propagates.

use std::fmt;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use hookd_bridge::DeviceBridge;
use hookd_core::prelude::*;
use hookd_core::EngineConfig;

use crate::bus::EventBus;
use crate::instrument::{AttachFailure, InstrumentDevice, InstrumentSession};

/// Attachment strategy, in fallback order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMethod {
    /// Attach to the pid we just spawned, then resume it
    SpawnedPid,
    /// Attach by process name
    Name,
    /// Re-enumerated exact name match, attached by pid
    ExactProcessMatch,
    /// First process whose name contains the app id
    SubstringProcessMatch,
    /// Launched out-of-band through the platform launcher, then by pid
    ShellLaunch,
}

impl AttachMethod {
    pub fn describe(&self) -> &'static str {
        match self {
            AttachMethod::SpawnedPid => "spawned pid",
            AttachMethod::Name => "process name",
            AttachMethod::ExactProcessMatch => "exact process match",
            AttachMethod::SubstringProcessMatch => "substring process match",
            AttachMethod::ShellLaunch => "shell launch",
        }
    }
}

/// Target of one attachment attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachTarget {
    Pid(u32),
    Name(String),
}

impl fmt::Display for AttachTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachTarget::Pid(pid) => write!(f, "pid {}", pid),
            AttachTarget::Name(name) => write!(f, "name {}", name),
        }
    }
}

/// Ephemeral record of one attachment try; drives the fallback decision and
/// the diagnostic status stream, never persisted
#[derive(Debug, Clone)]
pub struct AttachmentAttempt {
    pub method: AttachMethod,
    pub target: AttachTarget,
    /// `None` on success
    pub failure: Option<AttachFailure>,
}

/// A successful walk of the chain
#[derive(Debug)]
pub struct AttachOutcome<S> {
    pub session: S,
    /// Pid the session is attached to, when the winning strategy knew one
    pub pid: Option<u32>,
    pub method: AttachMethod,
    pub attempts: Vec<AttachmentAttempt>,
}

enum StepResult<S> {
    Attached(S),
    Fallthrough,
}

/// Produce an attached session for `app_id`, strongest strategy first.
///
/// `spawned_pid` is the pid from a spawn performed by the process locator,
/// if any. Every attempt and its outcome is emitted on the status stream in
/// issuance order, independent of whether the chain ultimately succeeds.
pub async fn attach_with_fallback<D, B>(
    device: &D,
    bridge: &B,
    device_id: &str,
    app_id: &str,
    spawned_pid: Option<u32>,
    config: &EngineConfig,
    bus: &EventBus,
) -> Result<AttachOutcome<D::Session>>
where
    D: InstrumentDevice + Sync,
    B: DeviceBridge + Sync,
{
    let mut attempts = Vec::new();
    let wait = config.attach_timeout;

    // 1. Pid from spawn. Spawned processes start suspended, so a successful
    //    attach is followed by an explicit resume.
    if let Some(pid) = spawned_pid {
        let step = run_step(
            device,
            AttachMethod::SpawnedPid,
            AttachTarget::Pid(pid),
            wait,
            device_id,
            app_id,
            bus,
            &mut attempts,
        )
        .await?;

        if let StepResult::Attached(session) = step {
            if let Err(e) = device.resume(pid).await {
                let _ = session.detach().await;
                return Err(Error::attach(
                    device_id,
                    app_id,
                    format!("resume of pid {} failed: {}", pid, e),
                ));
            }
            bus.status(format!("Resumed pid {}", pid));
            return Ok(AttachOutcome {
                session,
                pid: Some(pid),
                method: AttachMethod::SpawnedPid,
                attempts,
            });
        }
    }

    // 2. By name
    let step = run_step(
        device,
        AttachMethod::Name,
        AttachTarget::Name(app_id.to_string()),
        wait,
        device_id,
        app_id,
        bus,
        &mut attempts,
    )
    .await?;
    if let StepResult::Attached(session) = step {
        return Ok(AttachOutcome {
            session,
            pid: None,
            method: AttachMethod::Name,
            attempts,
        });
    }

    // 3 + 4 work from a fresh process listing
    let processes = device.enumerate_processes().await?;

    // 3. Exact name match, attached by pid
    if let Some(process) = processes.iter().find(|p| p.name == app_id) {
        let step = run_step(
            device,
            AttachMethod::ExactProcessMatch,
            AttachTarget::Pid(process.pid),
            wait,
            device_id,
            app_id,
            bus,
            &mut attempts,
        )
        .await?;
        if let StepResult::Attached(session) = step {
            return Ok(AttachOutcome {
                session,
                pid: Some(process.pid),
                method: AttachMethod::ExactProcessMatch,
                attempts,
            });
        }
    }

    // 4. Weak match: first process whose name contains the app id
    if let Some(process) = processes
        .iter()
        .find(|p| p.name != app_id && p.name.contains(app_id))
    {
        bus.status(format!(
            "No process named {}, substituting {} (pid {})",
            app_id, process.name, process.pid
        ));
        let step = run_step(
            device,
            AttachMethod::SubstringProcessMatch,
            AttachTarget::Pid(process.pid),
            wait,
            device_id,
            app_id,
            bus,
            &mut attempts,
        )
        .await?;
        if let StepResult::Attached(session) = step {
            return Ok(AttachOutcome {
                session,
                pid: Some(process.pid),
                method: AttachMethod::SubstringProcessMatch,
                attempts,
            });
        }
    }

    // 5. Out-of-band launch through the platform launcher, then by pid
    bus.status(format!(
        "Launching {} through the platform launcher on {}",
        app_id, device_id
    ));
    match launch_via_shell(bridge, device_id, app_id, config.launch_grace).await {
        Ok(Some(pid)) => {
            let step = run_step(
                device,
                AttachMethod::ShellLaunch,
                AttachTarget::Pid(pid),
                wait,
                device_id,
                app_id,
                bus,
                &mut attempts,
            )
            .await?;
            if let StepResult::Attached(session) = step {
                return Ok(AttachOutcome {
                    session,
                    pid: Some(pid),
                    method: AttachMethod::ShellLaunch,
                    attempts,
                });
            }
        }
        Ok(None) => {
            bus.status(format!("{} did not appear after launcher start", app_id));
        }
        Err(e) => {
            warn!("Launcher fallback for {} failed: {}", app_id, e);
            bus.status(format!("Launcher fallback failed: {}", e));
        }
    }

    Err(Error::attach(
        device_id,
        app_id,
        format!(
            "all {} attachment strategies exhausted",
            attempts.len().max(1)
        ),
    ))
}

/// Run one attach attempt with a bounded wait, record it, and report it.
///
/// `ProcessNotFound` and a timeout fall through to the next strategy; any
/// other failure aborts the chain.
#[allow(clippy::too_many_arguments)]
async fn run_step<D>(
    device: &D,
    method: AttachMethod,
    target: AttachTarget,
    wait: Duration,
    device_id: &str,
    app_id: &str,
    bus: &EventBus,
    attempts: &mut Vec<AttachmentAttempt>,
) -> Result<StepResult<D::Session>>
where
    D: InstrumentDevice + Sync,
{
    bus.status(format!(
        "Attaching to {} via {} ({})",
        app_id,
        method.describe(),
        target
    ));

    let result = match &target {
        AttachTarget::Pid(pid) => timeout(wait, device.attach_pid(*pid))
            .await
            .unwrap_or(Err(AttachFailure::TimedOut)),
        AttachTarget::Name(name) => timeout(wait, device.attach_name(name))
            .await
            .unwrap_or(Err(AttachFailure::TimedOut)),
    };

    match result {
        Ok(session) => {
            bus.status(format!(
                "Attached to {} via {} ({})",
                app_id,
                method.describe(),
                target
            ));
            attempts.push(AttachmentAttempt {
                method,
                target,
                failure: None,
            });
            Ok(StepResult::Attached(session))
        }
        Err(failure) => {
            bus.status(format!(
                "Attach via {} ({}) failed: {}",
                method.describe(),
                target,
                failure
            ));
            let fallthrough = matches!(
                failure,
                AttachFailure::ProcessNotFound | AttachFailure::TimedOut
            );
            attempts.push(AttachmentAttempt {
                method,
                target,
                failure: Some(failure.clone()),
            });
            if fallthrough {
                Ok(StepResult::Fallthrough)
            } else {
                Err(Error::attach(device_id, app_id, failure.to_string()))
            }
        }
    }
}

/// Launch the app through the platform's activity/launcher mechanism, wait a
/// fixed grace period, and ask the OS for the resulting pid.
async fn launch_via_shell<B>(
    bridge: &B,
    device_id: &str,
    app_id: &str,
    launch_grace: Duration,
) -> Result<Option<u32>>
where
    B: DeviceBridge + Sync,
{
    let launch = format!("monkey -p {} -c android.intent.category.LAUNCHER 1", app_id);
    let output = bridge.shell(device_id, &launch).await?;
    if !output.success() {
        debug!("Launcher command failed for {}: {}", app_id, output.stderr.trim());
        return Ok(None);
    }

    sleep(launch_grace).await;

    let pidof = bridge
        .shell(device_id, &format!("pidof {}", app_id))
        .await?;
    Ok(parse_first_pid(&pidof.stdout))
}

fn parse_first_pid(stdout: &str) -> Option<u32> {
    stdout.split_whitespace().next()?.parse().ok()
}
