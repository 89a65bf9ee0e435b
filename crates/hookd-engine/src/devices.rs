//! Device connection manager.
//!
//! Tracks which devices are connected to this engine and gates every
//! per-device operation. Connection requires the bridge-side provisioning to
//! have already prepared the device; this component only records the
//! resulting handle and status.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use hookd_core::prelude::*;
use hookd_core::{ConnectionStatus, DeviceStatusInfo};

/// A connected device and its externally-owned engine handle
#[derive(Debug)]
pub struct DeviceRecord<D> {
    pub id: String,
    pub status: ConnectionStatus,
    pub connected_at: DateTime<Utc>,
    pub handle: Arc<D>,
}

/// Table of devices currently connected to this engine
#[derive(Debug)]
pub struct DeviceRegistry<D> {
    devices: RwLock<HashMap<String, DeviceRecord<D>>>,
}

impl<D> Default for DeviceRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> DeviceRegistry<D> {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Record a device as connected, replacing any previous record
    pub async fn connect(&self, device_id: &str, handle: D) {
        let record = DeviceRecord {
            id: device_id.to_string(),
            status: ConnectionStatus::Connected,
            connected_at: Utc::now(),
            handle: Arc::new(handle),
        };
        self.devices
            .write()
            .await
            .insert(device_id.to_string(), record);
    }

    /// Handle for a connected device; the gate for all per-device operations
    pub async fn handle(&self, device_id: &str) -> Result<Arc<D>> {
        self.devices
            .read()
            .await
            .get(device_id)
            .map(|record| Arc::clone(&record.handle))
            .ok_or_else(|| Error::device_not_connected(device_id))
    }

    /// Remove a device record
    pub async fn disconnect(&self, device_id: &str) -> Result<()> {
        self.devices
            .write()
            .await
            .remove(device_id)
            .map(|_| ())
            .ok_or_else(|| Error::device_not_connected(device_id))
    }

    pub async fn is_connected(&self, device_id: &str) -> bool {
        self.devices.read().await.contains_key(device_id)
    }

    pub async fn status(&self, device_id: &str) -> Result<DeviceStatusInfo> {
        self.devices
            .read()
            .await
            .get(device_id)
            .map(|record| DeviceStatusInfo {
                id: record.id.clone(),
                status: record.status,
                connected_at: record.connected_at,
            })
            .ok_or_else(|| Error::device_not_connected(device_id))
    }

    /// Identifiers of all connected devices
    pub async fn connected_ids(&self) -> Vec<String> {
        self.devices.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_then_handle() {
        let registry: DeviceRegistry<&'static str> = DeviceRegistry::new();
        registry.connect("d1", "handle-1").await;

        assert!(registry.is_connected("d1").await);
        let handle = registry.handle("d1").await.unwrap();
        assert_eq!(*handle, "handle-1");
    }

    #[tokio::test]
    async fn test_unknown_device_is_rejected() {
        let registry: DeviceRegistry<()> = DeviceRegistry::new();

        assert!(!registry.is_connected("ghost").await);
        assert!(matches!(
            registry.handle("ghost").await.unwrap_err(),
            Error::DeviceNotConnected { .. }
        ));
        assert!(matches!(
            registry.status("ghost").await.unwrap_err(),
            Error::DeviceNotConnected { .. }
        ));
        assert!(matches!(
            registry.disconnect("ghost").await.unwrap_err(),
            Error::DeviceNotConnected { .. }
        ));
    }

    #[tokio::test]
    async fn test_disconnect_removes_record() {
        let registry: DeviceRegistry<()> = DeviceRegistry::new();
        registry.connect("d1", ()).await;

        registry.disconnect("d1").await.unwrap();
        assert!(!registry.is_connected("d1").await);
    }

    #[tokio::test]
    async fn test_status_reports_connected() {
        let registry: DeviceRegistry<()> = DeviceRegistry::new();
        registry.connect("d1", ()).await;

        let info = registry.status("d1").await.unwrap();
        assert_eq!(info.id, "d1");
        assert!(info.status.is_connected());
    }

    #[tokio::test]
    async fn test_reconnect_replaces_record() {
        let registry: DeviceRegistry<u32> = DeviceRegistry::new();
        registry.connect("d1", 1).await;
        registry.connect("d1", 2).await;

        assert_eq!(*registry.handle("d1").await.unwrap(), 2);
        assert_eq!(registry.connected_ids().await, vec!["d1"]);
    }
}
