//! Server error types.

use chequer_core::{CatalogError, ReplayError};
use chequer_proto::ProtocolError;

/// Errors that can occur in the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error (invalid bind address, unreadable log file, etc.).
    ///
    /// Fatal at startup. Fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport error (accept failure, WebSocket handshake, send failure).
    ///
    /// Fatal for that connection; the server keeps serving others.
    #[error("transport error: {0}")]
    Transport(String),

    /// Encoding or decoding of a frame or log file failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Session catalog failure other than a missing session.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Socket or file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ReplayError> for ServerError {
    fn from(err: ReplayError) -> Self {
        match err {
            ReplayError::Log(err) => Self::Protocol(err),
            err @ ReplayError::InvalidSpeed(_) => Self::Config(err.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ServerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
