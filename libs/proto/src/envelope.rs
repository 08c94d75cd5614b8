//! The poll request envelope.
//!
//! Devices long-poll by sending this envelope over the request channel.
//! The envelope is immutable for the duration of one poll cycle except
//! `body.timeout`, which the long-poll coordinator zeroes after the single
//! wait it performs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encryption::EncryptionMethod;

/// The only message type accepted on the poll channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Poll,
}

/// Encryption descriptor on the poll header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollEncryption {
    /// Cipher label the device expects for the reply.
    pub method: EncryptionMethod,

    /// Token card (application) identifier the device polls for.
    #[serde(rename = "tokencardId")]
    pub tokencard_id: String,
}

/// Poll message header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollHeader {
    /// Correlation id for the request/reply pair.
    pub request_id: String,

    /// Polling device.
    pub device_id: String,

    /// Message type; must be `poll`.
    #[serde(rename = "type")]
    pub message_type: MessageType,

    /// Client-side send time, epoch milliseconds.
    pub timestamp: u64,

    /// Message time-to-live in seconds.
    pub ttl: u64,

    /// Encryption descriptor.
    pub encryption: PollEncryption,
}

/// Poll message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollBody {
    /// Long-poll wait budget in seconds. Zero requests an immediate reply.
    pub timeout: u64,
}

/// A device poll request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollRequest {
    pub header: PollHeader,
    pub body: PollBody,
    pub nonce: u64,
}

/// Structural violation in a poll envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("header.requestId must not be empty")]
    EmptyRequestId,

    #[error("header.deviceId must not be empty")]
    EmptyDeviceId,

    #[error("header.encryption.tokencardId must not be empty")]
    EmptyTokencardId,
}

impl PollRequest {
    /// Check the structural constraints typed deserialization cannot express.
    ///
    /// Scalar typing, required fields, and the `type: "poll"` enum are
    /// already enforced by serde; this rejects empty identifier strings.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.header.request_id.is_empty() {
            return Err(EnvelopeError::EmptyRequestId);
        }
        if self.header.device_id.is_empty() {
            return Err(EnvelopeError::EmptyDeviceId);
        }
        if self.header.encryption.tokencard_id.is_empty() {
            return Err(EnvelopeError::EmptyTokencardId);
        }
        Ok(())
    }
}
