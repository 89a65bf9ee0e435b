//! Push channel carrying engine events to front-door subscribers

use tokio::sync::broadcast;

use hookd_core::prelude::*;
use hookd_core::EngineEvent;

/// Broadcast bus for [`EngineEvent`]s.
///
/// Sending never fails: events emitted with no subscriber are dropped, and
/// slow subscribers observe `Lagged` on their receiver rather than blocking
/// the engine.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    /// Emit a status line, mirrored to the log
    pub fn status(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.emit(EngineEvent::Status { message });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
