//! The session orchestration engine facade.
//!
//! One instance is constructed at startup and shared by reference with the
//! front door's request handlers; there is no process-wide singleton state.

use tokio::sync::{broadcast, mpsc};

use hookd_bridge::{provision, DeviceBridge};
use hookd_core::prelude::*;
use hookd_core::{
    ApplicationInfo, DeviceStatusInfo, DeviceSummary, EngineConfig, EngineEvent, HookOutcome,
    ShellOutput,
};

use crate::attach;
use crate::bus::EventBus;
use crate::devices::DeviceRegistry;
use crate::instrument::{InstrumentDevice, InstrumentHost, InstrumentScript, InstrumentSession};
use crate::locator;
use crate::registry::SessionRegistry;
use crate::resolver::{self, Resolution};
use crate::router;

/// Buffered messages per attached session before backpressure
const MESSAGE_CHANNEL_CAPACITY: usize = 64;

type SessionOf<H> = <<H as InstrumentHost>::Device as InstrumentDevice>::Session;
type ScriptOf<H> = <SessionOf<H> as InstrumentSession>::Script;

/// Session orchestration engine.
///
/// Generic over the instrumentation host `H` and the device bridge `B`;
/// owns the device and session registries and the subscriber event bus.
pub struct Engine<H, B>
where
    H: InstrumentHost,
{
    host: H,
    bridge: B,
    config: EngineConfig,
    devices: DeviceRegistry<H::Device>,
    sessions: SessionRegistry<SessionOf<H>, ScriptOf<H>>,
    bus: EventBus,
}

impl<H, B> Engine<H, B>
where
    H: InstrumentHost,
    B: DeviceBridge + Sync,
{
    pub fn new(host: H, bridge: B, config: EngineConfig) -> Self {
        let bus = EventBus::new(config.event_capacity);
        Self {
            host,
            bridge,
            config,
            devices: DeviceRegistry::new(),
            sessions: SessionRegistry::new(),
            bus,
        }
    }

    /// Subscribe to the engine's push event stream
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    // ─────────────────────────────────────────────────────────
    // Device connection management
    // ─────────────────────────────────────────────────────────

    /// Record a connection to an already-provisioned device
    pub async fn connect_device(&self, device_id: &str) -> Result<()> {
        require(device_id, "deviceId")?;

        let handle = self.host.device(device_id).await?;
        self.devices.connect(device_id, handle).await;
        self.bus.status(format!("Connected to {}", device_id));

        // Informational compatibility check; a mismatch never blocks
        if let Some(expected) = self.config.expected_server_version.as_deref() {
            let check = provision::check_server_version(
                &self.bridge,
                device_id,
                &self.config.server_path,
                Some(expected),
            )
            .await;
            if let Some((reported, expected)) = check.mismatch() {
                self.bus.status(format!(
                    "Warning: instrumentation server on {} reports version {} but {} was expected",
                    device_id, reported, expected
                ));
            }
        }

        Ok(())
    }

    /// Tear down every session on the device, then forget it
    pub async fn disconnect_device(&self, device_id: &str) -> Result<()> {
        require(device_id, "deviceId")?;

        if !self.devices.is_connected(device_id).await {
            return Err(Error::device_not_connected(device_id));
        }

        let removed = self.sessions.remove_device(device_id, &self.bus).await;
        if removed > 0 {
            self.bus.status(format!(
                "Tore down {} session(s) on {}",
                removed, device_id
            ));
        }

        self.devices.disconnect(device_id).await?;
        self.bus.status(format!("Disconnected from {}", device_id));
        Ok(())
    }

    pub async fn is_connected(&self, device_id: &str) -> bool {
        self.devices.is_connected(device_id).await
    }

    pub async fn device_status(&self, device_id: &str) -> Result<DeviceStatusInfo> {
        self.devices.status(device_id).await
    }

    /// All devices visible to the bridge, merged with this engine's state
    pub async fn list_devices(&self) -> Result<Vec<DeviceSummary>> {
        let bridge_devices = self.bridge.list_devices().await?;

        let mut summaries = Vec::with_capacity(bridge_devices.len());
        for device in bridge_devices {
            let connected = self.devices.is_connected(&device.serial).await;
            let apps = self.sessions.list_apps(&device.serial).await;
            let server_running = if device.is_ready() {
                provision::server_running(
                    &self.bridge,
                    &device.serial,
                    self.config.server_binary_name(),
                )
                .await
                .unwrap_or(false)
            } else {
                false
            };

            summaries.push(DeviceSummary {
                id: device.serial,
                status: device.state,
                connected,
                apps,
                instrumentation_server_running: server_running,
            });
        }

        Ok(summaries)
    }

    // ─────────────────────────────────────────────────────────
    // Application search
    // ─────────────────────────────────────────────────────────

    /// Installed applications ranked for a search query.
    ///
    /// An empty query returns the full enumeration unfiltered.
    pub async fn search_apps(&self, device_id: &str, query: &str) -> Result<Vec<ApplicationInfo>> {
        require(device_id, "deviceId")?;

        let device = self.devices.handle(device_id).await?;
        let apps = device.enumerate_applications().await?;
        Ok(resolver::rank_applications(apps, query))
    }

    // ─────────────────────────────────────────────────────────
    // Hook / unhook
    // ─────────────────────────────────────────────────────────

    /// Attach an instrumentation session to an application and load the
    /// payload, replacing any previous session for the same (device, app).
    pub async fn hook(
        &self,
        device_id: &str,
        app_id: &str,
        payload_source: &str,
    ) -> Result<HookOutcome> {
        require(device_id, "deviceId")?;
        require(app_id, "appId")?;
        require(payload_source, "payload")?;

        let device = self.devices.handle(device_id).await?;

        let canonical = match resolver::resolve(device.as_ref(), app_id).await? {
            Resolution::Canonical(identifier) => identifier,
            Resolution::Suggestions(suggestions) => {
                return Err(Error::PackageAmbiguous {
                    query: app_id.to_string(),
                    suggestions,
                });
            }
            Resolution::NotFound => {
                return Err(Error::package_not_found(device_id, app_id));
            }
        };

        // Exclusive section for this key, held across the whole sequence so
        // a concurrent hook/unhook observes only completed state
        let _guard = self.sessions.lock_key(device_id, &canonical).await;

        self.bus
            .status(format!("Hooking {} on {}", canonical, device_id));

        let launch =
            locator::ensure_running(device.as_ref(), &canonical, &self.config, &self.bus).await?;

        let attached = attach::attach_with_fallback(
            device.as_ref(),
            &self.bridge,
            device_id,
            &canonical,
            launch.pid(),
            &self.config,
            &self.bus,
        )
        .await?;
        debug!(
            "Attached to {} after {} attempt(s)",
            canonical,
            attached.attempts.len()
        );

        let (message_tx, message_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let wrapped = router::wrap_payload(payload_source);

        let script = match attached.session.create_script(&wrapped, message_tx).await {
            Ok(script) => script,
            Err(e) => {
                let _ = attached.session.detach().await;
                return Err(e);
            }
        };
        if let Err(e) = script.load().await {
            let _ = attached.session.detach().await;
            return Err(e);
        }

        tokio::spawn(router::route_messages(
            device_id.to_string(),
            canonical.clone(),
            message_rx,
            self.bus.clone(),
        ));

        self.sessions
            .put(device_id, &canonical, attached.session, script, &self.bus)
            .await;

        self.bus.status(format!(
            "Loaded payload into {} on {}",
            canonical, device_id
        ));

        Ok(HookOutcome {
            device_id: device_id.to_string(),
            app_id: canonical,
            pid: attached.pid,
        })
    }

    /// Unload the payload, detach the session, and forget the entry
    pub async fn unhook(&self, device_id: &str, app_id: &str) -> Result<()> {
        require(device_id, "deviceId")?;
        require(app_id, "appId")?;

        if !self.devices.is_connected(device_id).await {
            return Err(Error::device_not_connected(device_id));
        }

        let _guard = self.sessions.lock_key(device_id, app_id).await;

        self.sessions.remove(device_id, app_id, &self.bus).await?;
        self.bus
            .status(format!("Unhooked {} on {}", app_id, device_id));
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // Shell pass-through
    // ─────────────────────────────────────────────────────────

    /// Run a shell command on a connected device. Output is not interpreted.
    pub async fn execute_shell(&self, device_id: &str, command: &str) -> Result<ShellOutput> {
        require(device_id, "deviceId")?;
        require(command, "command")?;

        if !self.devices.is_connected(device_id).await {
            return Err(Error::device_not_connected(device_id));
        }

        self.bridge.shell(device_id, command).await
    }
}

fn require(value: &str, field: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::validation(field))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use crate::instrument::{AttachFailure, SessionMessage};
    use crate::test_utils::{FakeDevice, FakeHost};
    use hookd_bridge::test_utils::FakeBridge;
    use hookd_core::ConsoleLevel;

    fn test_config() -> EngineConfig {
        EngineConfig {
            spawn_grace: Duration::ZERO,
            launch_grace: Duration::from_millis(5),
            attach_timeout: Duration::from_secs(2),
            ..EngineConfig::default()
        }
    }

    fn engine_with(bridge: FakeBridge) -> (Engine<FakeHost, FakeBridge>, FakeDevice) {
        let host = FakeHost::new();
        let device = host.add_device("d1");
        device.add_app("Example", "com.Example.App");
        device.add_app("Gallery", "com.example.gallery");
        let engine = Engine::new(host, bridge, test_config());
        (engine, device)
    }

    async fn connected_engine() -> (Engine<FakeHost, FakeBridge>, FakeDevice) {
        let (engine, device) = engine_with(FakeBridge::new());
        engine.connect_device("d1").await.unwrap();
        (engine, device)
    }

    // ─────────────────────────────────────────────────────────
    // Validation and connectivity
    // ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_missing_fields_rejected_before_device_interaction() {
        let (engine, device) = connected_engine().await;

        let err = engine.hook("", "com.Example.App", "send(1);").await.unwrap_err();
        assert!(matches!(err, Error::Validation { ref field } if field == "deviceId"));

        let err = engine.hook("d1", "", "send(1);").await.unwrap_err();
        assert!(matches!(err, Error::Validation { ref field } if field == "appId"));

        let err = engine.hook("d1", "com.Example.App", "").await.unwrap_err();
        assert!(matches!(err, Error::Validation { ref field } if field == "payload"));

        // No device interaction happened
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_operations_on_unknown_device_fail_without_mutation() {
        let (engine, _device) = engine_with(FakeBridge::new()); // never connected

        assert!(matches!(
            engine.hook("d1", "com.Example.App", "send(1);").await.unwrap_err(),
            Error::DeviceNotConnected { .. }
        ));
        assert!(matches!(
            engine.unhook("d1", "com.Example.App").await.unwrap_err(),
            Error::DeviceNotConnected { .. }
        ));
        assert!(matches!(
            engine.search_apps("d1", "example").await.unwrap_err(),
            Error::DeviceNotConnected { .. }
        ));
        assert!(matches!(
            engine.execute_shell("d1", "id").await.unwrap_err(),
            Error::DeviceNotConnected { .. }
        ));
        assert!(matches!(
            engine.disconnect_device("d1").await.unwrap_err(),
            Error::DeviceNotConnected { .. }
        ));

        assert!(engine.sessions.is_empty().await);
    }

    // ─────────────────────────────────────────────────────────
    // Resolution
    // ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_hook_resolves_canonical_identifier() {
        let (engine, device) = connected_engine().await;
        device.add_process(101, "com.Example.App");

        let outcome = engine
            .hook("d1", "com.example.app", "send(1);")
            .await
            .unwrap();

        // On-device casing preserved
        assert_eq!(outcome.app_id, "com.Example.App");
        assert!(engine.sessions.contains("d1", "com.Example.App").await);
    }

    #[tokio::test]
    async fn test_ambiguous_identifier_returns_suggestions_never_auto_selects() {
        let (engine, _device) = connected_engine().await;

        let err = engine.hook("d1", "example", "send(1);").await.unwrap_err();

        match &err {
            Error::PackageAmbiguous { suggestions, .. } => {
                assert_eq!(suggestions.len(), 2);
                assert_eq!(suggestions[0].identifier, "com.Example.App");
            }
            other => panic!("expected ambiguous, got {:?}", other),
        }
        assert!(err.suggestions().is_some());
        assert!(engine.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_package_not_found() {
        let (engine, _device) = connected_engine().await;

        let err = engine.hook("d1", "org.mozilla", "send(1);").await.unwrap_err();
        assert!(matches!(err, Error::PackageNotFound { .. }));
        assert!(engine.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_search_apps_ranked() {
        let (engine, device) = connected_engine().await;
        device.add_app("Example", "example"); // exact identifier match

        let results = engine.search_apps("d1", "example").await.unwrap();

        assert_eq!(results[0].identifier, "example");
        // Exact name match outranks the identifier substring match
        assert_eq!(results[1].identifier, "com.Example.App");
        assert_eq!(results[2].identifier, "com.example.gallery");
    }

    // ─────────────────────────────────────────────────────────
    // Hook lifecycle
    // ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_end_to_end_spawn_attach_resume_load_unhook() {
        let bridge = FakeBridge::new()
            .with_device("d1", "device")
            .on_shell("ps -A", "root 99 1 frida-server\n");
        let (engine, device) = engine_with(bridge);
        engine.connect_device("d1").await.unwrap();

        // Not running: hook spawns, attaches by pid, resumes, loads
        let outcome = engine
            .hook("d1", "com.Example.App", "send('ready');")
            .await
            .unwrap();

        assert_eq!(outcome.device_id, "d1");
        assert_eq!(outcome.app_id, "com.Example.App");
        assert!(outcome.pid.is_some());

        let calls = device.calls();
        let pid = outcome.pid.unwrap();
        assert!(calls.contains(&"spawn:com.Example.App".to_string()));
        assert!(calls.contains(&format!("attach_pid:{}", pid)));
        assert!(calls.contains(&format!("resume:{}", pid)));

        let probes = device.session_probes();
        assert_eq!(probes.len(), 1);
        assert!(probes[0].is_loaded());

        // Listed under the device while hooked
        let listed = engine.list_devices().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].connected);
        assert!(listed[0].instrumentation_server_running);
        assert_eq!(listed[0].apps, vec!["com.Example.App"]);

        // Unhook tears down and delists
        engine.unhook("d1", "com.Example.App").await.unwrap();
        assert!(probes[0].is_unloaded());
        assert!(probes[0].is_detached());

        let listed = engine.list_devices().await.unwrap();
        assert!(listed[0].apps.is_empty());
    }

    #[tokio::test]
    async fn test_rehook_is_idempotent_on_replace() {
        let (engine, device) = connected_engine().await;
        device.add_process(101, "com.Example.App");

        engine.hook("d1", "com.Example.App", "payload-one").await.unwrap();
        engine.hook("d1", "com.Example.App", "payload-two").await.unwrap();

        assert_eq!(engine.sessions.len().await, 1);

        let probes = device.session_probes();
        assert_eq!(probes.len(), 2);

        // First session torn down, second active with the new payload
        assert!(probes[0].is_unloaded());
        assert!(probes[0].is_detached());
        assert!(!probes[1].is_detached());
        assert!(probes[1].loaded_source().unwrap().contains("payload-two"));
    }

    #[tokio::test]
    async fn test_rehook_survives_teardown_failure_of_previous() {
        let (engine, device) = connected_engine().await;
        device.add_process(101, "com.Example.App");

        engine.hook("d1", "com.Example.App", "payload-one").await.unwrap();
        device.session_probes()[0].fail_teardown();

        engine.hook("d1", "com.Example.App", "payload-two").await.unwrap();

        // Teardown failures never block the new hook
        assert_eq!(engine.sessions.len().await, 1);
        let probes = device.session_probes();
        assert!(probes[1].loaded_source().unwrap().contains("payload-two"));
    }

    #[tokio::test]
    async fn test_spawn_failure_degrades_to_name_attach() {
        let (engine, device) = connected_engine().await;
        device.fail_spawn("not installed for user 0");

        let outcome = engine
            .hook("d1", "com.Example.App", "send(1);")
            .await
            .unwrap();

        // Attached by name, so no pid on the outcome
        assert!(outcome.pid.is_none());
        assert!(device
            .calls()
            .contains(&"attach_name:com.Example.App".to_string()));
    }

    #[tokio::test]
    async fn test_payload_is_prefixed_with_console_shim() {
        let (engine, device) = connected_engine().await;
        device.add_process(101, "com.Example.App");

        engine
            .hook("d1", "com.Example.App", "send('user payload');")
            .await
            .unwrap();

        let source = device.session_probes()[0].loaded_source().unwrap();
        assert!(source.starts_with(router::CONSOLE_SHIM));
        assert!(source.ends_with("send('user payload');"));
    }

    #[tokio::test]
    async fn test_script_load_failure_detaches_session() {
        let (engine, device) = connected_engine().await;
        device.add_process(101, "com.Example.App");
        device.fail_script_load();

        let err = engine
            .hook("d1", "com.Example.App", "send(1);")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("script compilation failed"));
        assert!(engine.sessions.is_empty().await);
        assert!(device.session_probes()[0].is_detached());
    }

    #[tokio::test]
    async fn test_attach_abort_propagates_to_hook() {
        let (engine, device) = connected_engine().await;
        device.add_process(101, "com.Example.App");
        device.set_attach_pid_failure(101, AttachFailure::PermissionDenied);
        device.set_attach_name_failure(AttachFailure::PermissionDenied);

        let err = engine
            .hook("d1", "com.Example.App", "send(1);")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Attach { .. }));
        assert!(engine.sessions.is_empty().await);
    }

    // ─────────────────────────────────────────────────────────
    // Disconnect cascade
    // ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_disconnect_tears_down_all_sessions_and_device() {
        let (engine, device) = connected_engine().await;
        device.add_process(101, "com.Example.App");
        device.add_process(102, "com.example.gallery");

        engine.hook("d1", "com.Example.App", "p1").await.unwrap();
        engine.hook("d1", "com.example.gallery", "p2").await.unwrap();
        assert_eq!(engine.sessions.len().await, 2);

        engine.disconnect_device("d1").await.unwrap();

        assert!(engine.sessions.is_empty().await);
        for probe in device.session_probes() {
            assert!(probe.is_detached());
        }

        // Subsequent per-device operations are rejected
        assert!(matches!(
            engine.hook("d1", "com.Example.App", "p3").await.unwrap_err(),
            Error::DeviceNotConnected { .. }
        ));
    }

    // ─────────────────────────────────────────────────────────
    // Message flow
    // ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_session_messages_are_classified_and_forwarded() {
        let (engine, device) = connected_engine().await;
        device.add_process(101, "com.Example.App");

        let mut events = engine.subscribe();
        engine.hook("d1", "com.Example.App", "send(1);").await.unwrap();

        let sender = device.session_probes()[0].message_sender().unwrap();
        sender
            .send(SessionMessage::Payload(json!({
                "type": "console.error",
                "message": "x"
            })))
            .await
            .unwrap();
        sender
            .send(SessionMessage::Payload(json!({"foo": 1})))
            .await
            .unwrap();
        sender
            .send(SessionMessage::Error {
                description: "script threw".to_string(),
            })
            .await
            .unwrap();

        let mut console = None;
        let mut generic = None;
        let mut error = None;
        for _ in 0..64 {
            match tokio::time::timeout(Duration::from_secs(1), events.recv()).await {
                Ok(Ok(EngineEvent::Console { level, message, app_id, .. })) => {
                    console = Some((level, message, app_id));
                }
                Ok(Ok(EngineEvent::Message { payload, .. })) => {
                    generic = Some(payload);
                }
                Ok(Ok(EngineEvent::Error { error: e, .. })) => {
                    error = Some(e);
                    break;
                }
                Ok(Ok(_)) => continue,
                _ => break,
            }
        }

        let (level, message, app_id) = console.expect("console event not received");
        assert_eq!(level, ConsoleLevel::Error);
        assert_eq!(message, "x");
        assert_eq!(app_id, "com.Example.App");

        assert_eq!(generic.expect("generic event not received"), json!({"foo": 1}));
        assert_eq!(error.expect("error event not received"), "script threw");
    }

    // ─────────────────────────────────────────────────────────
    // Shell pass-through and status
    // ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_execute_shell_passes_through() {
        let bridge = FakeBridge::new().on_shell("id", "uid=0(root)\n");
        let (engine, _device) = engine_with(bridge);
        engine.connect_device("d1").await.unwrap();

        let output = engine.execute_shell("d1", "id").await.unwrap();
        assert_eq!(output.stdout.trim(), "uid=0(root)");
        assert_eq!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn test_version_mismatch_warns_but_never_blocks_connect() {
        let host = FakeHost::new();
        host.add_device("d1");
        let bridge = FakeBridge::new().on_shell("--version", "16.1.0\n");
        let config = EngineConfig {
            expected_server_version: Some("16.2.0".to_string()),
            ..test_config()
        };
        let engine = Engine::new(host, bridge, config);

        let mut events = engine.subscribe();
        engine.connect_device("d1").await.unwrap();
        assert!(engine.is_connected("d1").await);

        let mut saw_warning = false;
        while let Ok(event) = events.try_recv() {
            if let EngineEvent::Status { message } = event {
                if message.contains("16.1.0") && message.contains("16.2.0") {
                    saw_warning = true;
                }
            }
        }
        assert!(saw_warning);
    }

    #[tokio::test]
    async fn test_device_status_reports_connection() {
        let (engine, _device) = connected_engine().await;

        let info = engine.device_status("d1").await.unwrap();
        assert_eq!(info.id, "d1");
        assert!(info.status.is_connected());
        assert!(engine.is_connected("d1").await);
    }

    #[tokio::test]
    async fn test_concurrent_hooks_on_same_key_leave_one_entry() {
        let (engine, device) = connected_engine().await;
        device.add_process(101, "com.Example.App");
        let engine = Arc::new(engine);

        let e1 = Arc::clone(&engine);
        let e2 = Arc::clone(&engine);
        let (r1, r2) = tokio::join!(
            e1.hook("d1", "com.Example.App", "payload-a"),
            e2.hook("d1", "com.Example.App", "payload-b"),
        );

        r1.unwrap();
        r2.unwrap();

        // Serialized: exactly one live entry, the loser was torn down
        assert_eq!(engine.sessions.len().await, 1);
        let probes = device.session_probes();
        assert_eq!(probes.len(), 2);
        assert_eq!(probes.iter().filter(|p| p.is_detached()).count(), 1);
    }
}
