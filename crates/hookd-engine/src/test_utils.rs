//! Test utilities for engine consumers
//!
//! Scripted fakes for the instrumentation capability traits, so the
//! orchestration paths can be exercised without a native engine or device.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use hookd_core::prelude::*;
use hookd_core::{ApplicationInfo, ProcessInfo};

use crate::instrument::{
    AttachFailure, InstrumentDevice, InstrumentHost, InstrumentScript, InstrumentSession,
    SessionMessage, SpawnFailure,
};

/// Shared observation point for one fake session and its script.
///
/// The registry consumes sessions on teardown, so tests keep the probe to
/// assert what happened to them afterwards.
#[derive(Debug, Default)]
pub struct SessionProbe {
    detached: AtomicBool,
    loaded: AtomicBool,
    unloaded: AtomicBool,
    teardown_fails: AtomicBool,
    load_fails: AtomicBool,
    source: Mutex<Option<String>>,
    message_tx: Mutex<Option<mpsc::Sender<SessionMessage>>>,
}

impl SessionProbe {
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::SeqCst)
    }

    /// Make detach and unload return errors
    pub fn fail_teardown(&self) {
        self.teardown_fails.store(true, Ordering::SeqCst);
    }

    /// Make script load return an error
    pub fn fail_load(&self) {
        self.load_fails.store(true, Ordering::SeqCst);
    }

    /// Source passed to `create_script`, shim included
    pub fn loaded_source(&self) -> Option<String> {
        self.source.lock().unwrap().clone()
    }

    /// The message channel the engine registered for this session
    pub fn message_sender(&self) -> Option<mpsc::Sender<SessionMessage>> {
        self.message_tx.lock().unwrap().clone()
    }
}

/// Fake attached session
#[derive(Debug)]
pub struct FakeSession {
    probe: Arc<SessionProbe>,
}

impl FakeSession {
    pub fn with_probe(probe: Arc<SessionProbe>) -> Self {
        Self { probe }
    }

    pub fn probe(&self) -> Arc<SessionProbe> {
        Arc::clone(&self.probe)
    }
}

impl InstrumentSession for FakeSession {
    type Script = FakeScript;

    async fn create_script(
        &self,
        source: &str,
        messages: mpsc::Sender<SessionMessage>,
    ) -> Result<FakeScript> {
        *self.probe.source.lock().unwrap() = Some(source.to_string());
        *self.probe.message_tx.lock().unwrap() = Some(messages);
        Ok(FakeScript {
            probe: Arc::clone(&self.probe),
        })
    }

    async fn detach(&self) -> Result<()> {
        if self.probe.teardown_fails.load(Ordering::SeqCst) {
            return Err(Error::engine("detach refused"));
        }
        self.probe.detached.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Fake loaded script
#[derive(Debug)]
pub struct FakeScript {
    probe: Arc<SessionProbe>,
}

impl FakeScript {
    pub fn with_probe(probe: Arc<SessionProbe>) -> Self {
        Self { probe }
    }
}

impl InstrumentScript for FakeScript {
    async fn load(&self) -> Result<()> {
        if self.probe.load_fails.load(Ordering::SeqCst) {
            return Err(Error::engine("script compilation failed"));
        }
        self.probe.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn unload(&self) -> Result<()> {
        if self.probe.teardown_fails.load(Ordering::SeqCst) {
            return Err(Error::engine("unload refused"));
        }
        self.probe.unloaded.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DeviceInner {
    apps: Mutex<Vec<ApplicationInfo>>,
    processes: Mutex<Vec<ProcessInfo>>,
    spawn_error: Mutex<Option<String>>,
    spawn_counter: AtomicU32,
    resume_fails: AtomicBool,
    attach_pid_failures: Mutex<HashMap<u32, AttachFailure>>,
    attach_name_failure: Mutex<Option<AttachFailure>>,
    hang_attach_name: AtomicBool,
    script_load_fails: AtomicBool,
    calls: Mutex<Vec<String>>,
    probes: Mutex<Vec<Arc<SessionProbe>>>,
}

/// Scripted fake device. Cloning shares state, mirroring a real engine
/// handle to one physical device.
#[derive(Debug, Clone, Default)]
pub struct FakeDevice {
    inner: Arc<DeviceInner>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_app(&self, name: &str, identifier: &str) {
        self.inner
            .apps
            .lock()
            .unwrap()
            .push(ApplicationInfo::new(name, identifier));
    }

    pub fn add_process(&self, pid: u32, name: &str) {
        self.inner.processes.lock().unwrap().push(ProcessInfo {
            pid,
            name: name.to_string(),
        });
    }

    pub fn fail_spawn(&self, message: &str) {
        *self.inner.spawn_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_resume(&self) {
        self.inner.resume_fails.store(true, Ordering::SeqCst);
    }

    pub fn set_attach_pid_failure(&self, pid: u32, failure: AttachFailure) {
        self.inner
            .attach_pid_failures
            .lock()
            .unwrap()
            .insert(pid, failure);
    }

    pub fn set_attach_name_failure(&self, failure: AttachFailure) {
        *self.inner.attach_name_failure.lock().unwrap() = Some(failure);
    }

    /// Make attach-by-name block until the caller's bounded wait fires
    pub fn hang_attach_name(&self) {
        self.inner.hang_attach_name.store(true, Ordering::SeqCst);
    }

    /// Make every future session's script fail to load
    pub fn fail_script_load(&self) {
        self.inner.script_load_fails.store(true, Ordering::SeqCst);
    }

    /// Every call made against this device, in order
    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// Probes of every session this device handed out, in creation order
    pub fn session_probes(&self) -> Vec<Arc<SessionProbe>> {
        self.inner.probes.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.inner.calls.lock().unwrap().push(call);
    }

    fn new_session(&self) -> FakeSession {
        let probe = Arc::new(SessionProbe::default());
        if self.inner.script_load_fails.load(Ordering::SeqCst) {
            probe.fail_load();
        }
        self.inner.probes.lock().unwrap().push(Arc::clone(&probe));
        FakeSession::with_probe(probe)
    }
}

impl InstrumentDevice for FakeDevice {
    type Session = FakeSession;

    async fn enumerate_applications(&self) -> Result<Vec<ApplicationInfo>> {
        Ok(self.inner.apps.lock().unwrap().clone())
    }

    async fn enumerate_processes(&self) -> Result<Vec<ProcessInfo>> {
        Ok(self.inner.processes.lock().unwrap().clone())
    }

    async fn spawn(&self, app_id: &str) -> std::result::Result<u32, SpawnFailure> {
        self.record(format!("spawn:{}", app_id));
        if let Some(message) = self.inner.spawn_error.lock().unwrap().clone() {
            return Err(SpawnFailure::new(message));
        }
        Ok(4000 + self.inner.spawn_counter.fetch_add(1, Ordering::SeqCst))
    }

    async fn resume(&self, pid: u32) -> Result<()> {
        self.record(format!("resume:{}", pid));
        if self.inner.resume_fails.load(Ordering::SeqCst) {
            return Err(Error::engine("resume refused"));
        }
        Ok(())
    }

    async fn attach_pid(&self, pid: u32) -> std::result::Result<FakeSession, AttachFailure> {
        self.record(format!("attach_pid:{}", pid));
        if let Some(failure) = self.inner.attach_pid_failures.lock().unwrap().get(&pid) {
            return Err(failure.clone());
        }
        Ok(self.new_session())
    }

    async fn attach_name(&self, name: &str) -> std::result::Result<FakeSession, AttachFailure> {
        self.record(format!("attach_name:{}", name));
        if self.inner.hang_attach_name.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if let Some(failure) = self.inner.attach_name_failure.lock().unwrap().clone() {
            return Err(failure);
        }
        Ok(self.new_session())
    }
}

/// Scripted fake instrumentation host
#[derive(Debug, Default)]
pub struct FakeHost {
    devices: Mutex<HashMap<String, FakeDevice>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device and return its handle for scripting
    pub fn add_device(&self, device_id: &str) -> FakeDevice {
        let device = FakeDevice::new();
        self.devices
            .lock()
            .unwrap()
            .insert(device_id.to_string(), device.clone());
        device
    }
}

impl InstrumentHost for FakeHost {
    type Device = FakeDevice;

    async fn device(&self, device_id: &str) -> Result<FakeDevice> {
        self.devices
            .lock()
            .unwrap()
            .get(device_id)
            .cloned()
            .ok_or_else(|| Error::engine(format!("no such device: {}", device_id)))
    }
}
