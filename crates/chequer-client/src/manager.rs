//! Connection manager state machine.
//!
//! Owns the lifecycle of one outbound streaming connection: opening it,
//! classifying how it closed, and scheduling reconnection with exponential
//! backoff. Uses the action pattern: [`ConnectionManager::handle`] takes an
//! event and the current wall-clock time and returns actions for the driver
//! to execute. No I/O and no timers live here.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ Connect ┌────────────┐ Opened ┌──────┐ Disconnect ┌─────────┐
//! │ Idle │────────>│ Connecting │───────>│ Open │───────────>│ Closing │
//! └──────┘         └────────────┘        └──────┘            └─────────┘
//!    ↑                  │  ↑                 │                    │
//!    │   unclean close  │  │ ReconnectDue    │ unclean close      │ Closed
//!    │                  ↓  │                 ↓                    │
//!    │             ┌──────────────┐<─────────┘                    │
//!    │<────────────│ Reconnecting │                               │
//!    │ Disconnect  └──────────────┘                               │
//!    └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every connection the manager asks for gets a fresh [`ConnectionId`].
//! Events carrying any other id belong to a superseded connection and are
//! ignored, as are reconnection timers whose token is no longer pending.
//!
//! An address that cannot be dialed at all is a configuration fault, not a
//! lost connection: `Connect` rejects it up front, and a transport that
//! refuses it later reports [`ManagerEvent::Rejected`]. Either way the
//! manager reports `InvalidAddress` and goes idle without scheduling a retry.

use std::time::Duration;

use chequer_proto::{ErrorKind, Notification};
use serde_json::Value;
use url::Url;

use crate::error::ConnectError;

/// Delay before the first reconnection attempt.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1_000);

/// Reconnection attempts allowed per run of unclean closures.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Close code for a deliberate shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code for a connection lost without a closing handshake.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close reason sent when the application disconnects.
pub const CLIENT_CLOSE_REASON: &str = "Client disconnected";

/// Identifies one transport connection opened on behalf of the manager.
pub type ConnectionId = u64;

/// Identifies one scheduled reconnection timer.
pub type TimerToken = u64;

/// Exponential backoff policy, without cap or jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry; doubles for each retry after it.
    pub initial_delay: Duration,
    /// Retries allowed before the manager gives up and goes idle.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { initial_delay: DEFAULT_INITIAL_DELAY, max_attempts: DEFAULT_MAX_ATTEMPTS }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt`, counting from zero.
    ///
    /// `initial_delay * 2^attempt`, saturating rather than overflowing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }
}

/// Manager state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// No connection and no pending retry.
    Idle,
    /// Transport asked to open, not yet open.
    Connecting,
    /// Connection open; frames flow both ways.
    Open,
    /// Deliberate close requested, waiting for the transport to finish.
    Closing,
    /// Connection lost; a reconnection timer is pending.
    Reconnecting,
}

/// Events fed into the manager.
///
/// Application commands (`Connect`, `Disconnect`, `Send`) come from the
/// consuming application; the rest are reported by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    /// Open a connection to `url`, replacing any current one.
    Connect {
        /// WebSocket URL (`ws://` or `wss://`).
        url: String,
    },

    /// Close the connection deliberately. Never followed by a retry.
    Disconnect,

    /// Send a structured value to the server.
    Send(Value),

    /// The transport finished opening.
    Opened {
        /// Connection that opened.
        connection: ConnectionId,
    },

    /// A data frame arrived.
    FrameReceived {
        /// Connection the frame arrived on.
        connection: ConnectionId,
        /// Raw frame payload, expected to be UTF-8 JSON.
        payload: Vec<u8>,
    },

    /// The transport reported a fault. Closure is reported separately.
    TransportError {
        /// Connection that faulted.
        connection: ConnectionId,
        /// Transport's description of the fault.
        message: String,
    },

    /// The transport refused the address before any connection attempt.
    /// Never retried.
    Rejected {
        /// Connection that was refused.
        connection: ConnectionId,
        /// Transport's description of the problem.
        message: String,
    },

    /// The transport closed, or failed to open.
    Closed {
        /// Connection that closed.
        connection: ConnectionId,
        /// Close code (peer's, or 1006 without a handshake).
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
        /// Whether the closing handshake completed.
        clean: bool,
    },

    /// A reconnection timer elapsed.
    ReconnectDue {
        /// Token from the matching [`ManagerAction::ScheduleReconnect`].
        token: TimerToken,
    },
}

/// Actions produced by the manager for the driver to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerAction {
    /// Open a transport connection.
    OpenTransport {
        /// Id to report back in events for this connection.
        connection: ConnectionId,
        /// Target URL.
        url: String,
    },

    /// Close a transport connection with a closing handshake.
    CloseTransport {
        /// Connection to close.
        connection: ConnectionId,
        /// Close code to send.
        code: u16,
        /// Close reason to send.
        reason: String,
    },

    /// Start a timer; report [`ManagerEvent::ReconnectDue`] when it fires.
    ScheduleReconnect {
        /// Token identifying the timer.
        token: TimerToken,
        /// How long to wait.
        delay: Duration,
    },

    /// Stop a pending timer. Firing it anyway is harmless.
    CancelReconnect {
        /// Token of the timer to stop.
        token: TimerToken,
    },

    /// Send a text frame.
    SendFrame {
        /// Connection to send on.
        connection: ConnectionId,
        /// Frame text.
        text: String,
    },

    /// Deliver a notification to the consuming application.
    Notify(Notification),
}

/// Connection manager.
///
/// Holds at most one live connection and at most one pending reconnection
/// timer. The retry counter resets when a connection opens and on every
/// explicit connect or disconnect.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    state: ManagerState,
    policy: ReconnectPolicy,
    url: Option<String>,
    attempts: u32,
    connection: Option<ConnectionId>,
    next_connection: ConnectionId,
    timer: Option<TimerToken>,
    next_timer: TimerToken,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

impl ConnectionManager {
    /// Create an idle manager.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ManagerState::Idle,
            policy,
            url: None,
            attempts: 0,
            connection: None,
            next_connection: 0,
            timer: None,
            next_timer: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ManagerState {
        self.state
    }

    /// Retries scheduled since the last open, connect or disconnect.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Current connection, if one is live.
    #[must_use]
    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    /// Target of the last successful `Connect`.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Backoff policy.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Process one event. `now_ms` stamps any notification produced.
    pub fn handle(&mut self, event: ManagerEvent, now_ms: u64) -> Vec<ManagerAction> {
        match event {
            ManagerEvent::Connect { url } => self.handle_connect(url, now_ms),
            ManagerEvent::Disconnect => self.handle_disconnect(),
            ManagerEvent::Send(value) => self.handle_send(&value, now_ms),
            ManagerEvent::Opened { connection } => {
                // A close is already on its way to a connection opened late.
                if !self.is_current(connection) || self.state == ManagerState::Closing {
                    return Vec::new();
                }
                tracing::info!(connection, url = self.url(), "connected");
                self.state = ManagerState::Open;
                self.attempts = 0;
                vec![ManagerAction::Notify(Notification::Connected { timestamp: now_ms })]
            },
            ManagerEvent::FrameReceived { connection, payload } => {
                if !self.is_current(connection) {
                    return Vec::new();
                }
                let notification = match serde_json::from_slice::<Value>(&payload) {
                    Ok(payload) => Notification::Data { payload, timestamp: now_ms },
                    Err(e) => {
                        tracing::debug!(connection, "undecodable frame: {}", e);
                        Notification::error(ErrorKind::Decode, e.to_string(), now_ms)
                    },
                };
                vec![ManagerAction::Notify(notification)]
            },
            ManagerEvent::TransportError { connection, message } => {
                if !self.is_current(connection) {
                    return Vec::new();
                }
                tracing::warn!(connection, %message, "transport error");
                vec![ManagerAction::Notify(Notification::error(
                    ErrorKind::Transport,
                    message,
                    now_ms,
                ))]
            },
            ManagerEvent::Rejected { connection, message } => {
                if !self.is_current(connection) {
                    return Vec::new();
                }
                self.handle_rejected(message, now_ms)
            },
            ManagerEvent::Closed { connection, code, reason, clean } => {
                if !self.is_current(connection) {
                    return Vec::new();
                }
                self.handle_closed(code, reason, clean, now_ms)
            },
            ManagerEvent::ReconnectDue { token } => {
                if self.timer != Some(token) {
                    return Vec::new();
                }
                self.timer = None;
                match self.url.clone() {
                    Some(url) => {
                        tracing::info!(attempt = self.attempts, %url, "reconnecting");
                        vec![self.open(url)]
                    },
                    None => {
                        self.state = ManagerState::Idle;
                        Vec::new()
                    },
                }
            },
        }
    }

    /// Check that `address` is something the transport can dial.
    ///
    /// # Errors
    ///
    /// - `ConnectError::InvalidAddress` if the address does not parse as a
    ///   URL (bad port, forbidden host characters), uses a scheme other than
    ///   `ws`/`wss`, or has no host
    pub fn validate_address(address: &str) -> Result<(), ConnectError> {
        let invalid =
            |reason: String| ConnectError::InvalidAddress { address: address.to_string(), reason };

        let url = Url::parse(address).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(invalid("scheme must be ws or wss".to_string()));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }

        Ok(())
    }

    fn handle_connect(&mut self, url: String, now_ms: u64) -> Vec<ManagerAction> {
        if let Err(e) = Self::validate_address(&url) {
            tracing::warn!("connect rejected: {}", e);
            return vec![ManagerAction::Notify(Notification::error(
                e.kind(),
                e.to_string(),
                now_ms,
            ))];
        }

        let mut actions = self.cancel_timer();
        if let Some(connection) = self.connection.take() {
            actions.push(close_action(connection));
            // The old connection's own close report will be stale.
            if matches!(self.state, ManagerState::Open | ManagerState::Closing) {
                actions.push(ManagerAction::Notify(Notification::Disconnected {
                    code: NORMAL_CLOSURE,
                    reason: CLIENT_CLOSE_REASON.to_string(),
                    timestamp: now_ms,
                }));
            }
        }

        tracing::info!(%url, "connecting");
        self.attempts = 0;
        self.url = Some(url.clone());
        actions.push(self.open(url));
        actions
    }

    fn handle_disconnect(&mut self) -> Vec<ManagerAction> {
        let mut actions = self.cancel_timer();
        self.attempts = 0;

        match (self.state, self.connection) {
            (ManagerState::Connecting | ManagerState::Open, Some(connection)) => {
                tracing::info!(connection, "disconnecting");
                self.state = ManagerState::Closing;
                actions.push(close_action(connection));
            },
            (ManagerState::Reconnecting, _) => self.state = ManagerState::Idle,
            _ => {},
        }

        actions
    }

    fn handle_send(&mut self, value: &Value, now_ms: u64) -> Vec<ManagerAction> {
        match (self.state, self.connection) {
            (ManagerState::Open, Some(connection)) => {
                vec![ManagerAction::SendFrame { connection, text: value.to_string() }]
            },
            _ => {
                let e = ConnectError::NotConnected;
                vec![ManagerAction::Notify(Notification::error(e.kind(), e.to_string(), now_ms))]
            },
        }
    }

    fn handle_rejected(&mut self, message: String, now_ms: u64) -> Vec<ManagerAction> {
        // A deliberate close was already requested; finish it as one.
        if self.state == ManagerState::Closing {
            let reason = CLIENT_CLOSE_REASON.to_string();
            return self.handle_closed(NORMAL_CLOSURE, reason, true, now_ms);
        }

        tracing::warn!(url = self.url(), %message, "address rejected by transport");
        self.connection = None;
        self.attempts = 0;
        self.state = ManagerState::Idle;
        vec![ManagerAction::Notify(Notification::error(ErrorKind::InvalidAddress, message, now_ms))]
    }

    fn handle_closed(
        &mut self,
        code: u16,
        reason: String,
        clean: bool,
        now_ms: u64,
    ) -> Vec<ManagerAction> {
        let deliberate = self.state == ManagerState::Closing;
        self.connection = None;

        let mut actions = vec![ManagerAction::Notify(Notification::Disconnected {
            code,
            reason,
            timestamp: now_ms,
        })];

        if deliberate || clean {
            tracing::info!(code, "disconnected");
            self.state = ManagerState::Idle;
            return actions;
        }

        if self.attempts >= self.policy.max_attempts {
            tracing::warn!(code, attempts = self.attempts, "giving up on reconnection");
            self.state = ManagerState::Idle;
            return actions;
        }

        let delay = self.policy.delay_for(self.attempts);
        self.attempts += 1;
        let token = self.next_timer;
        self.next_timer += 1;
        self.timer = Some(token);
        self.state = ManagerState::Reconnecting;

        tracing::info!(
            code,
            attempt = self.attempts,
            delay_ms = delay.as_millis() as u64,
            "connection lost, scheduling reconnection"
        );
        actions.push(ManagerAction::ScheduleReconnect { token, delay });
        actions
    }

    fn open(&mut self, url: String) -> ManagerAction {
        let connection = self.next_connection;
        self.next_connection += 1;
        self.connection = Some(connection);
        self.state = ManagerState::Connecting;
        ManagerAction::OpenTransport { connection, url }
    }

    fn cancel_timer(&mut self) -> Vec<ManagerAction> {
        let token = self.timer.take();
        token.map(|token| ManagerAction::CancelReconnect { token }).into_iter().collect()
    }

    fn is_current(&self, connection: ConnectionId) -> bool {
        self.connection == Some(connection)
    }
}

fn close_action(connection: ConnectionId) -> ManagerAction {
    ManagerAction::CloseTransport {
        connection,
        code: NORMAL_CLOSURE,
        reason: CLIENT_CLOSE_REASON.to_string(),
    }
}
