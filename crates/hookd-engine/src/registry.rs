//! Authoritative table of per-device, per-application sessions.
//!
//! Owns creation, replacement, and teardown of session entries. Teardown of
//! a replaced or removed entry is always best-effort: failures are reported
//! on the status stream and never fail the operation, because the
//! operation's commitment is to the new state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use hookd_core::prelude::*;

use crate::bus::EventBus;
use crate::instrument::{InstrumentScript, InstrumentSession};

/// Registry key: one entry per (device, app) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub device_id: String,
    pub app_id: String,
}

impl SessionKey {
    pub fn new(device_id: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            app_id: app_id.into(),
        }
    }
}

/// An active session and its loaded payload
#[derive(Debug)]
pub struct SessionEntry<S, L> {
    pub session: S,
    pub script: L,
}

#[derive(Debug)]
struct Tables<S, L> {
    entries: HashMap<SessionKey, SessionEntry<S, L>>,
    /// Insertion order of keys, for stable status reporting
    order: Vec<SessionKey>,
}

impl<S, L> Default for Tables<S, L> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }
}

/// Concurrency-safe session table.
///
/// Mutations for the same key are serialized by the per-key locks handed out
/// by [`SessionRegistry::lock_key`]; the engine holds that guard across the
/// whole hook/unhook sequence. The inner table lock is never held across an
/// await of session teardown.
#[derive(Debug)]
pub struct SessionRegistry<S, L> {
    tables: RwLock<Tables<S, L>>,
    locks: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl<S, L> Default for SessionRegistry<S, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, L> SessionRegistry<S, L> {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<S, L> SessionRegistry<S, L>
where
    S: InstrumentSession + Sync + 'static,
    L: InstrumentScript + Sync + 'static,
{
    /// Acquire the exclusive section for one (device, app) key.
    ///
    /// Held by the caller for the duration of a hook/unhook so that two
    /// concurrent operations on the same key cannot interleave; the second
    /// caller observes the first's completed state.
    pub async fn lock_key(&self, device_id: &str, app_id: &str) -> OwnedMutexGuard<()> {
        let key = SessionKey::new(device_id, app_id);
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(key).or_default())
        };
        lock.lock_owned().await
    }

    /// Store an entry, tearing down any previous entry for the key first.
    ///
    /// After return the table holds exactly the new entry for this key.
    pub async fn put(&self, device_id: &str, app_id: &str, session: S, script: L, bus: &EventBus) {
        let key = SessionKey::new(device_id, app_id);

        let previous = {
            let mut tables = self.tables.write().await;
            tables.entries.remove(&key)
        };

        if let Some(entry) = previous {
            bus.status(format!(
                "Replacing existing session for {} on {}",
                app_id, device_id
            ));
            teardown_entry(entry, &key, bus).await;
        }

        let mut tables = self.tables.write().await;
        if !tables.order.contains(&key) {
            tables.order.push(key.clone());
        }
        tables.entries.insert(key, SessionEntry { session, script });
    }

    /// Tear down and delete the entry for a key
    pub async fn remove(&self, device_id: &str, app_id: &str, bus: &EventBus) -> Result<()> {
        let key = SessionKey::new(device_id, app_id);

        let entry = {
            let mut tables = self.tables.write().await;
            let entry = tables.entries.remove(&key);
            if entry.is_some() {
                tables.order.retain(|k| k != &key);
            }
            entry
        };

        match entry {
            Some(entry) => {
                teardown_entry(entry, &key, bus).await;
                Ok(())
            }
            None => Err(Error::session_not_found(device_id, app_id)),
        }
    }

    /// Tear down every entry for a device, tolerating per-entry failures
    pub async fn remove_device(&self, device_id: &str, bus: &EventBus) -> usize {
        let removed: Vec<(SessionKey, SessionEntry<S, L>)> = {
            let mut tables = self.tables.write().await;
            let keys: Vec<SessionKey> = tables
                .order
                .iter()
                .filter(|k| k.device_id == device_id)
                .cloned()
                .collect();
            tables.order.retain(|k| k.device_id != device_id);
            keys.into_iter()
                .filter_map(|k| tables.entries.remove(&k).map(|e| (k, e)))
                .collect()
        };

        let count = removed.len();
        for (key, entry) in removed {
            teardown_entry(entry, &key, bus).await;
        }
        count
    }

    /// App identifiers with an active session on a device, in hook order
    pub async fn list_apps(&self, device_id: &str) -> Vec<String> {
        let tables = self.tables.read().await;
        tables
            .order
            .iter()
            .filter(|k| k.device_id == device_id)
            .map(|k| k.app_id.clone())
            .collect()
    }

    pub async fn contains(&self, device_id: &str, app_id: &str) -> bool {
        let tables = self.tables.read().await;
        tables
            .entries
            .contains_key(&SessionKey::new(device_id, app_id))
    }

    pub async fn len(&self) -> usize {
        self.tables.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tables.read().await.entries.is_empty()
    }
}

/// Best-effort unload + detach. Failures become status events, never errors:
/// teardown always precedes a replacement or removal that must complete.
async fn teardown_entry<S, L>(entry: SessionEntry<S, L>, key: &SessionKey, bus: &EventBus)
where
    S: InstrumentSession,
    L: InstrumentScript,
{
    if let Err(e) = entry.script.unload().await {
        warn!("Unload failed for {} on {}: {}", key.app_id, key.device_id, e);
        bus.status(format!(
            "Warning: unload of previous payload for {} failed: {}",
            key.app_id, e
        ));
    }

    if let Err(e) = entry.session.detach().await {
        warn!("Detach failed for {} on {}: {}", key.app_id, key.device_id, e);
        bus.status(format!(
            "Warning: detach of previous session for {} failed: {}",
            key.app_id, e
        ));
    }
}
