//! Rejection payloads for refused poll requests.
//!
//! A rejection carries either an `error` or a `warning` message plus a
//! numeric `errorCode` from [`crate::codes`]. Warnings cover conditions the
//! device can fix itself (register first, poll an installed application);
//! errors cover malformed requests and store failures.

use serde::{Deserialize, Serialize};

/// Severity of a rejection, controlling which message field is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    Error,
    Warning,
}

/// A refused poll request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub message: String,
    pub error_code: u32,
}

impl Rejection {
    pub fn error(error_code: u32, message: impl Into<String>) -> Self {
        Self {
            kind: RejectionKind::Error,
            message: message.into(),
            error_code,
        }
    }

    pub fn warning(error_code: u32, message: impl Into<String>) -> Self {
        Self {
            kind: RejectionKind::Warning,
            message: message.into(),
            error_code,
        }
    }
}

// The wire form keys the message by severity, so Serialize/Deserialize are
// written against an internal tagged representation.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RejectionWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
    error_code: u32,
}

impl Serialize for Rejection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self.kind {
            RejectionKind::Error => RejectionWire {
                error: Some(self.message.clone()),
                warning: None,
                error_code: self.error_code,
            },
            RejectionKind::Warning => RejectionWire {
                error: None,
                warning: Some(self.message.clone()),
                error_code: self.error_code,
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Rejection {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = RejectionWire::deserialize(deserializer)?;
        match (wire.error, wire.warning) {
            (Some(message), _) => Ok(Rejection::error(wire.error_code, message)),
            (None, Some(message)) => Ok(Rejection::warning(wire.error_code, message)),
            (None, None) => Err(serde::de::Error::custom(
                "rejection must carry an error or a warning",
            )),
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            RejectionKind::Error => "error",
            RejectionKind::Warning => "warning",
        };
        write!(f, "{} {}: {}", kind, self.error_code, self.message)
    }
}
