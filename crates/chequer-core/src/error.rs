//! Error types for generation and replay.

use chequer_proto::ProtocolError;
use thiserror::Error;

/// Errors from the session query interface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No session is registered under this id.
    ///
    /// Callers skip the current tick and try again on the next one.
    #[error("session not found: {race_id}")]
    NotFound {
        /// Requested id
        race_id: String,
    },

    /// The catalog could not be read.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Errors setting up a replay.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Playback speed must be a finite number greater than zero.
    #[error("invalid playback speed {0}: must be greater than zero")]
    InvalidSpeed(f64),

    /// The race log cannot be replayed.
    #[error("invalid race log: {0}")]
    Log(#[from] ProtocolError),
}
