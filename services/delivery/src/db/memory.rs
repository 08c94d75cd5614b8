//! In-memory store backend.
//!
//! Backs the test suite. Mutation semantics mirror the
//! Postgres backend exactly: one update call sets the status, appends the
//! progress entry, optionally arms the resend deadline, and bumps the
//! resend counter. Applied updates are additionally journaled in arrival
//! order so tests can assert the drain ordering guarantee.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{Action, PendingUpdate};

use super::store::{ActionStore, Application, Device, DirectoryStore, OpsStore};
use super::StoreError;

#[derive(Default)]
struct Faults {
    actions: bool,
    devices: bool,
    applications: bool,
    writes: bool,
}

#[derive(Default)]
struct Inner {
    actions: HashMap<String, Action>,
    devices: HashMap<String, Device>,
    applications: HashMap<String, Application>,
    heartbeats: HashMap<(String, String), i64>,
    applied: Vec<PendingUpdate>,
    faults: Faults,
}

/// In-memory store backend implementing all three store traits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_action(&self, action: Action) {
        let mut inner = self.inner.lock().expect("store lock");
        inner.actions.insert(action.id.clone(), action);
    }

    pub fn insert_device(&self, device: Device) {
        let mut inner = self.inner.lock().expect("store lock");
        inner.devices.insert(device.id.clone(), device);
    }

    pub fn insert_application(&self, application: Application) {
        let mut inner = self.inner.lock().expect("store lock");
        inner
            .applications
            .insert(application.id.clone(), application);
    }

    /// Snapshot one action by id.
    pub fn action(&self, id: &str) -> Option<Action> {
        self.inner.lock().expect("store lock").actions.get(id).cloned()
    }

    /// Updates applied so far, in arrival order.
    pub fn applied_updates(&self) -> Vec<PendingUpdate> {
        self.inner.lock().expect("store lock").applied.clone()
    }

    /// Last recorded heartbeat for a process/server pair.
    pub fn heartbeat(&self, process_name: &str, server_name: &str) -> Option<i64> {
        self.inner
            .lock()
            .expect("store lock")
            .heartbeats
            .get(&(process_name.to_string(), server_name.to_string()))
            .copied()
    }

    /// Make actions reads fail until cleared.
    pub fn fail_actions(&self, fail: bool) {
        self.inner.lock().expect("store lock").faults.actions = fail;
    }

    /// Make device reads fail until cleared.
    pub fn fail_devices(&self, fail: bool) {
        self.inner.lock().expect("store lock").faults.devices = fail;
    }

    /// Make application reads fail until cleared.
    pub fn fail_applications(&self, fail: bool) {
        self.inner.lock().expect("store lock").faults.applications = fail;
    }

    /// Make update writes fail until cleared.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().expect("store lock").faults.writes = fail;
    }
}

#[async_trait]
impl ActionStore for MemoryStore {
    async fn candidate_actions(
        &self,
        device_id: &str,
        tokencard_id: &str,
        limit: i64,
    ) -> Result<Vec<Action>, StoreError> {
        let inner = self.inner.lock().expect("store lock");
        if inner.faults.actions {
            return Err(StoreError::Unavailable("actions read fault".to_string()));
        }

        let mut candidates: Vec<Action> = inner
            .actions
            .values()
            .filter(|action| {
                action.device_id == device_id
                    && action.tokencard_id == tokencard_id
                    && action.status.is_open()
            })
            .cloned()
            .collect();

        // Earliest first-progress timestamp first; entries without a trail
        // sort last, matching the Postgres NULLS LAST ordering.
        candidates.sort_by_key(|action| (action.first_progress_timestamp().is_none(), action.first_progress_timestamp()));
        candidates.truncate(limit.max(0) as usize);
        Ok(candidates)
    }

    async fn apply_update(&self, update: &PendingUpdate) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        if inner.faults.writes {
            return Err(StoreError::Unavailable("write fault".to_string()));
        }

        if let Some(action) = inner.actions.get_mut(&update.action_id) {
            action.status = update.status;
            action.progress.push(update.progress.clone());
            if let Some(resend_after) = update.resend_after {
                action.resends.resend_after = Some(resend_after);
            }
            if update.increments_resends() {
                action.resends.num_resends += 1;
            }
        }

        inner.applied.push(update.clone());
        Ok(())
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn device(&self, device_id: &str) -> Result<Option<Device>, StoreError> {
        let inner = self.inner.lock().expect("store lock");
        if inner.faults.devices {
            return Err(StoreError::Unavailable("devices read fault".to_string()));
        }
        Ok(inner.devices.get(device_id).cloned())
    }

    async fn application(&self, tokencard_id: &str) -> Result<Option<Application>, StoreError> {
        let inner = self.inner.lock().expect("store lock");
        if inner.faults.applications {
            return Err(StoreError::Unavailable(
                "applications read fault".to_string(),
            ));
        }
        Ok(inner.applications.get(tokencard_id).cloned())
    }
}

#[async_trait]
impl OpsStore for MemoryStore {
    async fn record_heartbeat(
        &self,
        process_name: &str,
        server_name: &str,
        at_ms: i64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        if inner.faults.writes {
            return Err(StoreError::Unavailable("write fault".to_string()));
        }
        inner
            .heartbeats
            .insert((process_name.to_string(), server_name.to_string()), at_ms);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Build a registered device with one installed application, the shape the
/// poll handler expects. Test helper.
pub fn registered_device(device_id: &str, tokencard_id: &str) -> Device {
    let install: Value = serde_json::json!({
        "name": "test-app",
        "version": { "major": 1, "minor": 0 },
        "status": "registered",
        "session": { "id": "sess-1", "timeoutAt": i64::MAX },
        "lastRequest": 0
    });

    let mut apps = serde_json::Map::new();
    apps.insert(tokencard_id.to_string(), install);

    Device {
        id: device_id.to_string(),
        apps,
    }
}
