//! Message routing from attached sessions to subscribers.
//!
//! Classifies each asynchronous message from a session into exactly one of
//! the console, generic-payload, or engine-error event channels.

use tokio::sync::mpsc;

use hookd_core::prelude::*;
use hookd_core::{ConsoleLevel, EngineEvent};

use crate::bus::EventBus;
use crate::instrument::SessionMessage;

/// Interception shim prefixed to every payload.
///
/// Redirects the target's own `console.*` calls into structured
/// `console.<level>` messages on the payload transport, so operator-visible
/// logs and application-emitted messages share one channel while remaining
/// distinguishable. Must run before any operator-supplied top-level
/// statement, hence the prefix position.
pub const CONSOLE_SHIM: &str = r#"(function () {
    ['log', 'info', 'warn', 'error', 'debug'].forEach(function (level) {
        var original = console[level];
        console[level] = function () {
            var text = Array.prototype.slice.call(arguments).map(function (arg) {
                if (typeof arg === 'string') { return arg; }
                try { return JSON.stringify(arg); } catch (e) { return String(arg); }
            }).join(' ');
            send({ type: 'console.' + level, message: text });
            if (typeof original === 'function') { original.apply(console, arguments); }
        };
    });
})();"#;

/// Prefix the operator payload with the console interception shim
pub fn wrap_payload(source: &str) -> String {
    format!("{}\n{}", CONSOLE_SHIM, source)
}

/// Classify one session message into its event
pub fn classify(device_id: &str, app_id: &str, message: SessionMessage) -> EngineEvent {
    match message {
        SessionMessage::Payload(payload) => {
            let console_tag = payload
                .get("type")
                .and_then(|v| v.as_str())
                .and_then(|tag| tag.strip_prefix("console."));

            match console_tag {
                Some(level) => EngineEvent::Console {
                    device_id: device_id.to_string(),
                    app_id: app_id.to_string(),
                    level: ConsoleLevel::parse(level),
                    message: payload
                        .get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                },
                None => EngineEvent::Message {
                    device_id: device_id.to_string(),
                    app_id: app_id.to_string(),
                    payload,
                },
            }
        }
        SessionMessage::Error { description } => EngineEvent::Error {
            device_id: device_id.to_string(),
            app_id: app_id.to_string(),
            error: description,
        },
    }
}

/// Forward an attached session's messages until its channel closes.
///
/// One router runs per session, registered at attach time; delivery order
/// matches the engine's delivery order.
pub async fn route_messages(
    device_id: String,
    app_id: String,
    mut rx: mpsc::Receiver<SessionMessage>,
    bus: EventBus,
) {
    while let Some(message) = rx.recv().await {
        bus.emit(classify(&device_id, &app_id, message));
    }
    debug!("Message router for {} on {} finished", app_id, device_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_console_tagged_payload_routes_to_console() {
        let message = SessionMessage::Payload(json!({
            "type": "console.error",
            "message": "x"
        }));

        match classify("d1", "com.a", message) {
            EngineEvent::Console {
                device_id,
                app_id,
                level,
                message,
            } => {
                assert_eq!(device_id, "d1");
                assert_eq!(app_id, "com.a");
                assert_eq!(level, ConsoleLevel::Error);
                assert_eq!(message, "x");
            }
            other => panic!("expected console event, got {:?}", other),
        }
    }

    #[test]
    fn test_non_console_payload_routes_generic_unchanged() {
        let message = SessionMessage::Payload(json!({"foo": 1}));

        match classify("d1", "com.a", message) {
            EngineEvent::Message { payload, .. } => {
                assert_eq!(payload, json!({"foo": 1}));
            }
            other => panic!("expected generic event, got {:?}", other),
        }
    }

    #[test]
    fn test_payload_with_unrelated_type_tag_stays_generic() {
        let message = SessionMessage::Payload(json!({
            "type": "trace",
            "message": "not console output"
        }));

        assert!(matches!(
            classify("d1", "com.a", message),
            EngineEvent::Message { .. }
        ));
    }

    #[test]
    fn test_engine_error_routes_to_error_event() {
        let message = SessionMessage::Error {
            description: "ReferenceError: boom".to_string(),
        };

        match classify("d1", "com.a", message) {
            EngineEvent::Error { error, .. } => {
                assert_eq!(error, "ReferenceError: boom");
            }
            other => panic!("expected error event, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_console_level_degrades_to_log() {
        let message = SessionMessage::Payload(json!({
            "type": "console.verbose",
            "message": "m"
        }));

        match classify("d1", "com.a", message) {
            EngineEvent::Console { level, .. } => assert_eq!(level, ConsoleLevel::Log),
            other => panic!("expected console event, got {:?}", other),
        }
    }

    #[test]
    fn test_shim_precedes_payload() {
        let wrapped = wrap_payload("send({ type: 'ready' });");

        assert!(wrapped.starts_with(CONSOLE_SHIM));
        assert!(wrapped.ends_with("send({ type: 'ready' });"));
        // The shim rewires console before any payload statement runs
        let shim_end = wrapped.find("send({ type: 'ready' });").unwrap();
        assert!(wrapped[..shim_end].contains("console[level]"));
    }

    #[tokio::test]
    async fn test_route_messages_forwards_in_order() {
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let (tx, rx) = mpsc::channel(8);

        let router = tokio::spawn(route_messages(
            "d1".to_string(),
            "com.a".to_string(),
            rx,
            bus,
        ));

        tx.send(SessionMessage::Payload(json!({"seq": 1})))
            .await
            .unwrap();
        tx.send(SessionMessage::Error {
            description: "e".to_string(),
        })
        .await
        .unwrap();
        drop(tx);
        router.await.unwrap();

        match events.recv().await.unwrap() {
            EngineEvent::Message { payload, .. } => assert_eq!(payload["seq"], 1),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            events.recv().await.unwrap(),
            EngineEvent::Error { .. }
        ));
    }
}
