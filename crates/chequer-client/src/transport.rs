//! WebSocket transport for the connection manager.
//!
//! [`spawn`] starts a driver task that owns a [`ConnectionManager`], executes
//! its actions with tokio-tungstenite and the environment's timers, and feeds
//! the results back in as events. The application talks to it through a
//! [`ConnectionHandle`] and a notification channel; protocol decisions stay
//! in the Sans-IO manager.

use std::{collections::HashMap, time::Duration};

use chequer_core::Environment;
use chequer_proto::Notification;
use futures_util::{SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::{
    sync::mpsc,
    task::{AbortHandle, JoinHandle},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self, Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};

use crate::{
    error::ConnectError,
    manager::{
        ABNORMAL_CLOSURE, CLIENT_CLOSE_REASON, ConnectionId, ConnectionManager, ManagerAction,
        ManagerEvent, NORMAL_CLOSURE, ReconnectPolicy, TimerToken,
    },
};

/// Capacity of the command, notification and per-connection channels.
pub const CHANNEL_CAPACITY: usize = 64;

/// How long to wait for the peer to answer our close frame.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands the application sends to the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Open a connection, replacing any current one.
    Connect(String),
    /// Close the connection deliberately.
    Disconnect,
    /// Send a structured value.
    Send(Value),
}

/// Handle to a running connection manager.
///
/// Dropping the handle stops the driver and closes any open connection.
pub struct ConnectionHandle {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Connect to `url`, replacing any current connection.
    ///
    /// Success means the command was queued; the outcome arrives as a
    /// notification.
    ///
    /// # Errors
    ///
    /// - `ConnectError::Stopped` if the driver is gone
    pub async fn connect(&self, url: impl Into<String>) -> Result<(), ConnectError> {
        self.command(Command::Connect(url.into())).await
    }

    /// Close the connection. No reconnection follows.
    ///
    /// # Errors
    ///
    /// - `ConnectError::Stopped` if the driver is gone
    pub async fn disconnect(&self) -> Result<(), ConnectError> {
        self.command(Command::Disconnect).await
    }

    /// Send a structured value over the open connection.
    ///
    /// # Errors
    ///
    /// - `ConnectError::Stopped` if the driver is gone
    pub async fn send(&self, value: Value) -> Result<(), ConnectError> {
        self.command(Command::Send(value)).await
    }

    /// Queue a raw command.
    ///
    /// # Errors
    ///
    /// - `ConnectError::Stopped` if the driver is gone
    pub async fn command(&self, command: Command) -> Result<(), ConnectError> {
        self.commands.send(command).await.map_err(|_| ConnectError::Stopped)
    }

    /// Stop the driver and wait for it to close its connection.
    pub async fn shutdown(self) {
        let Self { commands, task } = self;
        drop(commands);
        let _ = task.await;
    }
}

/// Start a connection manager on the current tokio runtime.
///
/// Returns the command handle and the receiving end of the notification
/// stream. The manager starts idle.
pub fn spawn<E: Environment>(
    env: E,
    policy: ReconnectPolicy,
) -> (ConnectionHandle, mpsc::Receiver<Notification>) {
    let (commands_tx, commands_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (notifications_tx, notifications_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let driver = Driver {
        env,
        manager: ConnectionManager::new(policy),
        commands: commands_rx,
        notifications: notifications_tx,
        events_tx,
        events_rx,
        connections: HashMap::new(),
        timer: None,
    };
    let task = tokio::spawn(driver.run());

    (ConnectionHandle { commands: commands_tx, task }, notifications_rx)
}

/// Instruction for a connection task.
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

struct Driver<E: Environment> {
    env: E,
    manager: ConnectionManager,
    commands: mpsc::Receiver<Command>,
    notifications: mpsc::Sender<Notification>,
    events_tx: mpsc::Sender<ManagerEvent>,
    events_rx: mpsc::Receiver<ManagerEvent>,
    connections: HashMap<ConnectionId, mpsc::Sender<Outbound>>,
    timer: Option<(TimerToken, AbortHandle)>,
}

impl<E: Environment> Driver<E> {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Connect(url)) => ManagerEvent::Connect { url },
                    Some(Command::Disconnect) => ManagerEvent::Disconnect,
                    Some(Command::Send(value)) => ManagerEvent::Send(value),
                    None => break,
                },
                Some(event) = self.events_rx.recv() => event,
            };

            if let ManagerEvent::Closed { connection, .. }
            | ManagerEvent::Rejected { connection, .. } = &event
            {
                self.connections.remove(connection);
            }

            let actions = self.manager.handle(event, self.env.wall_clock_ms());
            for action in actions {
                self.execute(action).await;
            }
        }

        tracing::debug!("connection handle dropped, stopping");
        if let Some((_, timer)) = self.timer.take() {
            timer.abort();
        }
        for (_, outbound) in self.connections.drain() {
            let _ = outbound
                .send(Outbound::Close {
                    code: NORMAL_CLOSURE,
                    reason: CLIENT_CLOSE_REASON.to_string(),
                })
                .await;
        }
    }

    async fn execute(&mut self, action: ManagerAction) {
        match action {
            ManagerAction::OpenTransport { connection, url } => {
                let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
                self.connections.insert(connection, outbound_tx);
                tokio::spawn(run_connection(connection, url, outbound_rx, self.events_tx.clone()));
            },
            ManagerAction::CloseTransport { connection, code, reason } => {
                if let Some(outbound) = self.connections.remove(&connection)
                    && outbound.try_send(Outbound::Close { code, reason }).is_err()
                {
                    tracing::debug!(connection, "connection already gone");
                }
            },
            ManagerAction::SendFrame { connection, text } => {
                let sent = self
                    .connections
                    .get(&connection)
                    .is_some_and(|outbound| outbound.try_send(Outbound::Text(text)).is_ok());
                if !sent {
                    tracing::warn!(connection, "outbound frame dropped");
                }
            },
            ManagerAction::ScheduleReconnect { token, delay } => {
                let env = self.env.clone();
                let events = self.events_tx.clone();
                let task = tokio::spawn(async move {
                    env.sleep(delay).await;
                    let _ = events.send(ManagerEvent::ReconnectDue { token }).await;
                });
                if let Some((_, previous)) = self.timer.replace((token, task.abort_handle())) {
                    previous.abort();
                }
            },
            ManagerAction::CancelReconnect { token } => {
                if let Some((pending, timer)) = self.timer.take() {
                    if pending == token {
                        timer.abort();
                    } else {
                        self.timer = Some((pending, timer));
                    }
                }
            },
            ManagerAction::Notify(notification) => {
                if self.notifications.send(notification).await.is_err() {
                    tracing::debug!("notification receiver dropped");
                }
            },
        }
    }
}

/// Open one WebSocket and bridge it to the driver until it closes.
///
/// Always ends by reporting exactly one `Closed` or `Rejected` event for
/// `connection`. An address the handshake cannot even be built from is
/// `Rejected`; every other failure to connect is an abnormal close.
async fn run_connection(
    connection: ConnectionId,
    url: String,
    mut outbound: mpsc::Receiver<Outbound>,
    events: mpsc::Sender<ManagerEvent>,
) {
    let report = |event: ManagerEvent| {
        let events = events.clone();
        async move {
            let _ = events.send(event).await;
        }
    };

    let socket = tokio::select! {
        biased;
        request = outbound.recv() => {
            // Closed before the handshake finished; nothing reached the peer.
            let (code, reason) = match request {
                Some(Outbound::Close { code, reason }) => (code, reason),
                _ => (NORMAL_CLOSURE, String::new()),
            };
            report(ManagerEvent::Closed { connection, code, reason, clean: true }).await;
            return;
        },
        result = connect_async(url.as_str()) => match result {
            Ok((socket, _response)) => socket,
            Err(e @ (tungstenite::Error::Url(_) | tungstenite::Error::HttpFormat(_))) => {
                tracing::debug!(connection, %url, "address rejected: {}", e);
                report(ManagerEvent::Rejected { connection, message: e.to_string() }).await;
                return;
            },
            Err(e) => {
                tracing::debug!(connection, %url, "connect failed: {}", e);
                let message = e.to_string();
                report(ManagerEvent::TransportError { connection, message }).await;
                report(lost(connection)).await;
                return;
            },
        },
    };

    report(ManagerEvent::Opened { connection }).await;
    let (mut write, mut read) = socket.split();
    let mut peer_close: Option<(u16, String)> = None;

    loop {
        tokio::select! {
            biased;
            request = outbound.recv() => {
                let (code, reason) = match request {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = write.send(Message::text(text)).await {
                            let message = e.to_string();
                            report(ManagerEvent::TransportError { connection, message }).await;
                        }
                        continue;
                    },
                    Some(Outbound::Close { code, reason }) => (code, reason),
                    None => (NORMAL_CLOSURE, String::new()),
                };

                let frame =
                    CloseFrame { code: CloseCode::from(code), reason: reason.clone().into() };
                let _ = write.send(Message::Close(Some(frame))).await;
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, drain(&mut read)).await;
                report(ManagerEvent::Closed { connection, code, reason, clean: true }).await;
                return;
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let payload = text.as_str().as_bytes().to_vec();
                    report(ManagerEvent::FrameReceived { connection, payload }).await;
                },
                Some(Ok(Message::Binary(bytes))) => {
                    // Decoded like text; invalid UTF-8 surfaces as a decode error.
                    let payload = bytes.to_vec();
                    report(ManagerEvent::FrameReceived { connection, payload }).await;
                },
                Some(Ok(Message::Close(frame))) => {
                    peer_close = Some(match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_string()),
                        None => (NORMAL_CLOSURE, String::new()),
                    });
                },
                Some(Ok(_)) => {},
                Some(Err(e)) if peer_close.is_none() => {
                    let message = e.to_string();
                    report(ManagerEvent::TransportError { connection, message }).await;
                    report(lost(connection)).await;
                    return;
                },
                Some(Err(_)) | None => {
                    let event = match peer_close.take() {
                        Some((code, reason)) => {
                            ManagerEvent::Closed { connection, code, reason, clean: true }
                        },
                        None => lost(connection),
                    };
                    report(event).await;
                    return;
                },
            },
        }
    }
}

/// Read until the peer finishes the closing handshake.
async fn drain<S>(read: &mut S)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(Ok(_)) = read.next().await {}
}

fn lost(connection: ConnectionId) -> ManagerEvent {
    ManagerEvent::Closed { connection, code: ABNORMAL_CLOSURE, reason: String::new(), clean: false }
}
