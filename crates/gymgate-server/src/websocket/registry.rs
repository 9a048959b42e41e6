//! The gym ID → connection registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::connection::DeviceConnection;

/// Process-wide map of registered devices.
///
/// One lock guards all access and is held only for the map operation itself,
/// never across I/O. The registry never closes a connection: `register` hands
/// any displaced handle back to the caller, and sessions remove themselves
/// through `unregister` when their read fails.
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Arc<DeviceConnection>>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or overwrite the mapping for the connection's gym ID.
    ///
    /// Last writer wins. Returns the displaced handle when a device
    /// re-registers, so the caller can close it.
    pub async fn register(&self, conn: Arc<DeviceConnection>) -> Option<Arc<DeviceConnection>> {
        let gym_id = conn.gym_id().to_owned();
        let displaced = {
            let mut devices = self.devices.write().await;
            devices.insert(gym_id.clone(), conn)
        };
        debug!(gym_id, displaced = displaced.is_some(), "device registered");
        displaced
    }

    /// Remove the mapping for `gym_id` if it still points at `conn`.
    ///
    /// A no-op when the ID is absent or already re-registered by a newer
    /// connection; a superseded session's cleanup must not evict its
    /// successor. Returns whether an entry was removed.
    pub async fn unregister(&self, gym_id: &str, conn: &Arc<DeviceConnection>) -> bool {
        let removed = {
            let mut devices = self.devices.write().await;
            match devices.get(gym_id) {
                Some(current) if Arc::ptr_eq(current, conn) => {
                    let _ = devices.remove(gym_id);
                    true
                }
                _ => false,
            }
        };
        debug!(gym_id, removed, "device unregistered");
        removed
    }

    /// The currently registered handle for `gym_id`, if any.
    ///
    /// The handle may close between this returning and a subsequent send;
    /// that surfaces as a normal send failure, not a logic error.
    pub async fn lookup(&self, gym_id: &str) -> Option<Arc<DeviceConnection>> {
        self.devices.read().await.get(gym_id).cloned()
    }

    /// Number of registered devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Whether no devices are registered.
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
