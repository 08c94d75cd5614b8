//! The poll reply payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::encryption::EncryptionMethod;

/// One delivered action.
///
/// The delivery payload carries only the command itself; status, timing,
/// and encryption bookkeeping never leak to the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyAction {
    /// Command name.
    pub action: String,

    /// Correlation id of the originating request.
    pub request_id: String,

    /// Optional command parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// The reply emitted for one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollReply {
    /// Always `"response"`.
    pub group: String,

    /// Always `"poll"`.
    #[serde(rename = "type")]
    pub message_type: String,

    pub device_id: String,

    /// Reply-wide negotiated cipher label.
    pub encryption_method: EncryptionMethod,

    pub tokencard_id: String,

    pub nonce: u64,

    /// Deliverable actions, possibly empty.
    pub actions: Vec<ReplyAction>,
}

impl PollReply {
    /// Build a reply for the given device and token card.
    pub fn new(
        device_id: impl Into<String>,
        tokencard_id: impl Into<String>,
        encryption_method: EncryptionMethod,
        nonce: u64,
        actions: Vec<ReplyAction>,
    ) -> Self {
        Self {
            group: "response".to_string(),
            message_type: "poll".to_string(),
            device_id: device_id.into(),
            encryption_method,
            tokencard_id: tokencard_id.into(),
            nonce,
            actions,
        }
    }
}
