//! Connection manager errors.

use chequer_proto::ErrorKind;
use thiserror::Error;

/// Errors raised by the connection manager and its handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// The address cannot be connected to at all. Never retried.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress {
        /// Address as given by the caller.
        address: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A frame was sent with no open connection.
    #[error("not connected")]
    NotConnected,

    /// The task driving the manager has stopped.
    #[error("connection manager stopped")]
    Stopped,
}

impl ConnectError {
    /// Notification category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAddress { .. } => ErrorKind::InvalidAddress,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::Stopped => ErrorKind::Transport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_notification_kinds() {
        let invalid = ConnectError::InvalidAddress {
            address: "http://example.com".to_string(),
            reason: "scheme must be ws or wss".to_string(),
        };

        assert_eq!(invalid.kind(), ErrorKind::InvalidAddress);
        assert_eq!(
            invalid.to_string(),
            "invalid address 'http://example.com': scheme must be ws or wss"
        );
        assert_eq!(ConnectError::NotConnected.kind(), ErrorKind::NotConnected);
    }
}
