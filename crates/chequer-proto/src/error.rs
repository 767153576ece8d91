//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding chequer data.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON text could not be decoded into the expected type.
    #[error("decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// A race-clock string was malformed.
    #[error("invalid race clock value: {0:?}")]
    InvalidClock(String),

    /// A race log violated a structural requirement.
    #[error("invalid race log: {0}")]
    InvalidLog(String),
}

impl ProtocolError {
    /// Returns true if the error came from malformed JSON rather than a
    /// structurally invalid (but well-formed) document.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}
