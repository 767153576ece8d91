//! Client
//!
//! Reconnecting live timing client. Keeps one streaming connection to a
//! timing server alive and turns everything that happens on it into
//! [`Notification`]s for the consuming application.
//!
//! # Architecture
//!
//! The manager follows the Sans-IO and action-based pattern of
//! [`chequer_core`]. It receives events ([`ManagerEvent`]), decides what
//! happens in pure state machine logic, and returns actions
//! ([`ManagerAction`]) for a driver to execute.
//!
//! # Components
//!
//! - [`ConnectionManager`]: lifecycle state machine with exponential backoff
//! - [`ReconnectPolicy`]: initial delay and retry ceiling
//! - [`ManagerEvent`]: commands and transport reports fed into the manager
//! - [`ManagerAction`]: actions produced by the manager
//!
//! # Transport (optional)
//!
//! With the `transport` feature (on by default), this crate also provides:
//! - [`transport::spawn`]: run a manager over tokio-tungstenite
//! - [`transport::ConnectionHandle`]: issue commands to a running manager

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod manager;

#[cfg(feature = "transport")]
pub mod transport;

pub use chequer_core::env::Environment;
pub use chequer_proto::{ErrorKind, ErrorReason, Notification};
pub use error::ConnectError;
pub use manager::{
    ABNORMAL_CLOSURE, CLIENT_CLOSE_REASON, ConnectionId, ConnectionManager, DEFAULT_INITIAL_DELAY,
    DEFAULT_MAX_ATTEMPTS, ManagerAction, ManagerEvent, ManagerState, NORMAL_CLOSURE,
    ReconnectPolicy, TimerToken,
};
