//! Notifications delivered to the application consuming a live timing
//! connection.
//!
//! Every lifecycle transition produces exactly one notification; failure is
//! never signalled by silence.

use serde::{Deserialize, Serialize};

/// Category of an error notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// The transport reported a fault. Closure, if any, is reported separately.
    Transport,
    /// An inbound frame could not be decoded. The connection stays open.
    Decode,
    /// The connection could not be initiated (malformed or unsupported URL).
    InvalidAddress,
    /// An outbound frame was issued with no open connection.
    NotConnected,
}

/// Why an error notification was raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReason {
    /// Category.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

/// Tagged notification, serialized with a `type` discriminant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    /// The connection opened.
    Connected {
        /// Receipt time, Unix epoch milliseconds.
        timestamp: u64,
    },
    /// A frame arrived and decoded.
    Data {
        /// Decoded frame.
        payload: serde_json::Value,
        /// Receipt time, Unix epoch milliseconds.
        timestamp: u64,
    },
    /// Something went wrong.
    Error {
        /// What went wrong.
        reason: ErrorReason,
        /// Time of the fault, Unix epoch milliseconds.
        timestamp: u64,
    },
    /// The connection closed.
    Disconnected {
        /// Close code (1000 normal, 1006 abnormal).
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
        /// Time of closure, Unix epoch milliseconds.
        timestamp: u64,
    },
}

impl Notification {
    /// Build an error notification.
    pub fn error(kind: ErrorKind, message: impl Into<String>, timestamp: u64) -> Self {
        Self::Error { reason: ErrorReason { kind, message: message.into() }, timestamp }
    }

    /// Timestamp carried by any variant.
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Connected { timestamp }
            | Self::Data { timestamp, .. }
            | Self::Error { timestamp, .. }
            | Self::Disconnected { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn notifications_carry_type_tag() {
        assert_eq!(
            serde_json::to_value(Notification::Connected { timestamp: 5 }).unwrap(),
            json!({"type": "connected", "timestamp": 5})
        );
        assert_eq!(
            serde_json::to_value(Notification::error(ErrorKind::Decode, "bad frame", 7)).unwrap(),
            json!({
                "type": "error",
                "reason": {"kind": "decode", "message": "bad frame"},
                "timestamp": 7
            })
        );
        assert_eq!(
            serde_json::to_value(Notification::Disconnected {
                code: 1006,
                reason: String::new(),
                timestamp: 9
            })
            .unwrap(),
            json!({"type": "disconnected", "code": 1006, "reason": "", "timestamp": 9})
        );
    }
}
