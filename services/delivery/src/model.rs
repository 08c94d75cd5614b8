//! Domain records for action delivery.
//!
//! An [`Action`] is a queued command awaiting delivery to a device. Its
//! `status` advances forward only, its `progress` trail is append-only, and
//! its resend counter only grows; every transition is applied through a
//! [`PendingUpdate`] drained by the update queue, never in place.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use dmp_proto::EncryptionMethod;

/// Status codes at or above this value are out of delivery consideration.
pub const TERMINAL_STATUS_THRESHOLD: i32 = 10;

/// Delivery status of an action.
///
/// The integer codes are the stored representation: `0` pending, `1` sent,
/// `2` resent, `30` timed out, `31` resends exhausted. Codes at or above
/// [`TERMINAL_STATUS_THRESHOLD`] that this worker does not produce itself
/// (delivery acknowledgements and the like) are carried as `Terminal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionStatus {
    /// Queued, never handed to the device.
    Pending,
    /// Handed to the device once.
    Sent,
    /// Handed to the device again after a resend timeout.
    Resent,
    /// The absolute deadline passed before delivery completed.
    TimedOut,
    /// The maximum resend count was reached.
    ResendsExhausted,
    /// Any other closed status owned by a different worker.
    Terminal(i32),
}

impl ActionStatus {
    /// The stored integer code.
    pub fn code(self) -> i32 {
        match self {
            ActionStatus::Pending => 0,
            ActionStatus::Sent => 1,
            ActionStatus::Resent => 2,
            ActionStatus::TimedOut => 30,
            ActionStatus::ResendsExhausted => 31,
            ActionStatus::Terminal(code) => code,
        }
    }

    /// Decode a stored integer code.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ActionStatus::Pending,
            1 => ActionStatus::Sent,
            2 => ActionStatus::Resent,
            30 => ActionStatus::TimedOut,
            31 => ActionStatus::ResendsExhausted,
            other => ActionStatus::Terminal(other),
        }
    }

    /// Whether the action is still a delivery candidate.
    pub fn is_open(self) -> bool {
        self.code() < TERMINAL_STATUS_THRESHOLD
    }
}

impl Serialize for ActionStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for ActionStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(ActionStatus::from_code(i32::deserialize(deserializer)?))
    }
}

/// One entry in an action's append-only progress trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    /// Epoch milliseconds of the transition.
    pub timestamp: i64,

    /// Human-readable status label ("sent to device", "timed out", ...).
    pub status: String,
}

/// Retry cadence bookkeeping for an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resends {
    /// Milliseconds a delivery stays outstanding before a resend is due.
    pub resend_timeout: i64,

    /// Resends performed so far; only ever increases.
    pub num_resends: u32,

    /// Resend budget for this action.
    pub max_resends: u32,

    /// Earliest epoch-millisecond instant a resend may fire. Unset until
    /// the first send.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resend_after: Option<i64>,
}

/// Encryption descriptor attached to an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEncryption {
    pub method: EncryptionMethod,

    #[serde(rename = "tokencardId")]
    pub tokencard_id: String,
}

/// A queued command awaiting delivery to a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Opaque stable identifier.
    pub id: String,

    pub device_id: String,

    pub tokencard_id: String,

    pub encryption: ActionEncryption,

    /// Command name.
    pub action: String,

    /// Correlation id of the originating request.
    pub request_id: String,

    /// Optional command parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    pub status: ActionStatus,

    /// Absolute deadline, epoch milliseconds. Once passed the action is
    /// void regardless of status.
    pub timeout_at: i64,

    pub resends: Resends,

    /// Append-only audit trail, earliest entry first.
    pub progress: Vec<ProgressEntry>,
}

impl Action {
    /// Timestamp of the earliest progress entry, the candidate sort key.
    pub fn first_progress_timestamp(&self) -> Option<i64> {
        self.progress.first().map(|entry| entry.timestamp)
    }
}

/// An intended status mutation, consumed exactly once by the update queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdate {
    /// Target action id.
    pub action_id: String,

    /// New status to set.
    pub status: ActionStatus,

    /// Progress entry to append.
    pub progress: ProgressEntry,

    /// New resend deadline, when the transition arms one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resend_after: Option<i64>,
}

/// A malformed queued update, logged and dropped by the drain worker.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpdateShapeError {
    #[error("target action id is empty")]
    EmptyActionId,

    #[error("status code {0} is negative")]
    NegativeStatus(i32),

    #[error("progress timestamp {0} is not positive")]
    BadProgressTimestamp(i64),

    #[error("progress label is empty")]
    EmptyProgressLabel,
}

impl PendingUpdate {
    /// Validate the shape before issuing a store mutation.
    pub fn validate(&self) -> Result<(), UpdateShapeError> {
        if self.action_id.is_empty() {
            return Err(UpdateShapeError::EmptyActionId);
        }
        if self.status.code() < 0 {
            return Err(UpdateShapeError::NegativeStatus(self.status.code()));
        }
        if self.progress.timestamp <= 0 {
            return Err(UpdateShapeError::BadProgressTimestamp(
                self.progress.timestamp,
            ));
        }
        if self.progress.status.is_empty() {
            return Err(UpdateShapeError::EmptyProgressLabel);
        }
        Ok(())
    }

    /// Whether applying this update also increments the resend counter.
    ///
    /// Only the resent transition does; the counter never moves otherwise.
    pub fn increments_resends(&self) -> bool {
        self.status == ActionStatus::Resent
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
