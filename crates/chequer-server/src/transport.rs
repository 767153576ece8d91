//! WebSocket transport.
//!
//! Viewers connect over plain WebSocket and receive JSON text frames. The
//! request path selects the race: `/sessions/{race_id}`, or `/` for the
//! server's default race. Viewers never need to send anything; inbound data
//! frames are ignored.
//!
//! A connection ends in one of four ways:
//! - the path names no race, which sends a close frame (1008, policy)
//! - the viewer closes it or the socket fails
//! - the server shuts down, which sends a close frame (1001, going away)
//! - the frame source ends, which drops the socket without a closing
//!   handshake so the viewer treats it as a fault and reconnects

use std::{future::Future, time::Duration};

use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    WebSocketStream, accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::ServerError,
    sink::{Frame, Subscription},
};

/// Accepted viewer socket.
pub type ViewerSocket = WebSocketStream<TcpStream>;

/// How long to wait for the viewer to answer a close frame.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Close reason sent to viewers whose path names no race.
pub const UNKNOWN_ROUTE_REASON: &str = "unknown race path";

/// Race selection from a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/`: the server's default race.
    Default,
    /// `/sessions/{race_id}`.
    Session(String),
    /// Anything else.
    Unknown,
}

/// Parse a request path.
pub fn parse_route(path: &str) -> Route {
    match path.trim_end_matches('/') {
        "" => Route::Default,
        path => match path.strip_prefix("/sessions/") {
            Some(id) if !id.is_empty() && !id.contains('/') => Route::Session(id.to_string()),
            _ => Route::Unknown,
        },
    }
}

/// Complete the WebSocket handshake, returning the socket and request path.
///
/// # Errors
///
/// - `ServerError::Transport` if the handshake fails
pub async fn accept(stream: TcpStream) -> Result<(ViewerSocket, String), ServerError> {
    let mut path = String::from("/");
    let socket = accept_hdr_async(
        stream,
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            path = request.uri().path().to_string();
            Ok(response)
        },
    )
    .await?;
    Ok((socket, path))
}

/// Refuse an accepted viewer with a policy close (1008).
///
/// A clean close tells a reconnecting client not to retry.
///
/// # Errors
///
/// - `ServerError::Transport` if the close frame cannot be sent
pub async fn reject(mut socket: ViewerSocket, reason: &'static str) -> Result<(), ServerError> {
    let frame = CloseFrame { code: CloseCode::Policy, reason: reason.into() };
    socket.close(Some(frame)).await?;

    // Let the viewer answer so the closing handshake completes.
    let drain = async { while let Some(Ok(_)) = socket.next().await {} };
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, drain).await;
    Ok(())
}

/// Anything that yields outbound frames for one connection.
pub trait FrameSource: Send {
    /// Next frame, or `None` once the source has ended.
    fn next_frame(&mut self) -> impl Future<Output = Option<Frame>> + Send;
}

impl FrameSource for Subscription {
    fn next_frame(&mut self) -> impl Future<Output = Option<Frame>> + Send {
        self.recv()
    }
}

impl FrameSource for mpsc::Receiver<Frame> {
    fn next_frame(&mut self) -> impl Future<Output = Option<Frame>> + Send {
        self.recv()
    }
}

/// Forward frames from `source` to the viewer until the connection ends.
///
/// # Errors
///
/// - `ServerError::Transport` if a send fails or the socket errors
pub async fn pump<S: FrameSource>(
    socket: ViewerSocket,
    mut source: S,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let frame =
                    CloseFrame { code: CloseCode::Away, reason: "server shutting down".into() };
                // Best effort: the viewer may already be gone.
                let _ = write.send(Message::Close(Some(frame))).await;
                return Ok(());
            },
            frame = source.next_frame() => match frame {
                Some(frame) => write.send(Message::text(frame.to_string())).await?,
                None => {
                    tracing::debug!("frame source ended, dropping connection");
                    return Ok(());
                },
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {},
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes() {
        assert_eq!(parse_route("/"), Route::Default);
        assert_eq!(parse_route(""), Route::Default);
        assert_eq!(parse_route("/sessions/spa"), Route::Session("spa".to_string()));
        assert_eq!(parse_route("/sessions/spa/"), Route::Session("spa".to_string()));
        assert_eq!(parse_route("/sessions/"), Route::Unknown);
        assert_eq!(parse_route("/sessions/spa/laps"), Route::Unknown);
        assert_eq!(parse_route("/favicon.ico"), Route::Unknown);
    }
}
