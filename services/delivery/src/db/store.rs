//! Store traits and directory record types.
//!
//! The delivery core reads and writes through these seams so the evaluator,
//! queue, and coordinator can be exercised against the in-memory backend
//! while production runs on Postgres.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{Action, PendingUpdate};

use super::StoreError;

/// A device record: identity plus the applications installed on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: String,

    /// tokencardId -> app-install document. Kept as raw JSON so the poll
    /// handler can shape-check the install record itself.
    pub apps: Map<String, Value>,
}

/// An application record: identity plus token material.
#[derive(Debug, Clone, PartialEq)]
pub struct Application {
    pub id: String,

    /// Token material consumed by the reply encoder. `None` when the
    /// record predates token provisioning.
    pub tokens: Option<Vec<Value>>,
}

/// Registration state of an app install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppInstallStatus {
    Pending,
    Registered,
}

/// Session block on an app install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSession {
    pub id: String,
    pub timeout_at: i64,
}

/// Version block on an app install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppVersion {
    pub major: i64,
    pub minor: i64,
}

/// The per-device install record for one application.
///
/// The poll handler deserializes this out of [`Device::apps`]; a document
/// that fails to take this shape rejects the poll as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInstall {
    pub name: String,
    pub version: AppVersion,
    pub status: AppInstallStatus,
    pub session: AppSession,
    pub last_request: i64,
}

/// Read/write access to the actions collection.
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Fetch the delivery candidates for one device+tokencard pair:
    /// open actions (status below the terminal threshold), ordered by
    /// earliest first-progress timestamp, bounded to `limit`.
    async fn candidate_actions(
        &self,
        device_id: &str,
        tokencard_id: &str,
        limit: i64,
    ) -> Result<Vec<Action>, StoreError>;

    /// Apply one queued update as a single mutation: set status, append
    /// the progress entry, optionally arm the resend deadline, and bump
    /// the resend counter when the update says so.
    async fn apply_update(&self, update: &PendingUpdate) -> Result<(), StoreError>;
}

/// Read-only access to the device and application directories.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn device(&self, device_id: &str) -> Result<Option<Device>, StoreError>;

    async fn application(&self, tokencard_id: &str) -> Result<Option<Application>, StoreError>;
}

/// Operational plumbing: liveness records and readiness probes.
#[async_trait]
pub trait OpsStore: Send + Sync {
    /// Upsert the worker's liveness record.
    async fn record_heartbeat(
        &self,
        process_name: &str,
        server_name: &str,
        at_ms: i64,
    ) -> Result<(), StoreError>;

    /// Cheap reachability check for readiness probes.
    async fn ping(&self) -> Result<(), StoreError>;
}
