//! Chequer live timing server.
//!
//! Wraps [`chequer_core`]'s pure generator and replay logic with tokio tasks,
//! timers and a WebSocket transport.
//!
//! # Architecture
//!
//! ```text
//! SessionHost (one task per race) ──publish──> BroadcastSink ──> viewer sockets
//! ReplayService (one playback per viewer) ─────────────────────> viewer socket
//! ```
//!
//! # Components
//!
//! - [`Server`]: simulation runtime; hosts generated races and fans them out
//! - [`ReplayServer`]: replay runtime; plays a recorded race log per viewer
//! - [`BroadcastSink`]: ordered per-race fan-out with late-join snapshots
//! - [`SessionHost`]: tick loop around one race's generator
//! - [`ReplayService`]: shared race log and per-viewer playback

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod host;
mod registry;
pub mod replay;
pub mod sink;
pub mod transport;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use chequer_core::{
    Environment, GeneratorConfig, MemoryCatalog, SessionCatalog, SessionSeed, SystemEnv,
};
pub use error::ServerError;
pub use host::{SessionHost, TickOutcome};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
pub use registry::{SubscriberId, SubscriptionRegistry};
pub use replay::{ReplayEnd, ReplayService};
pub use sink::{BroadcastSink, Frame, SUBSCRIBER_BUFFER, Subscription};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_util::sync::CancellationToken;
pub use transport::{Route, parse_route};

/// Server configuration for the simulation runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080")
    pub bind_address: String,
    /// Races to host; the first is served on `/`
    pub race_ids: Vec<String>,
    /// Generator tuning, including the tick interval
    pub generator: GeneratorConfig,
    /// Fixed RNG seed; entropy when `None`
    pub seed: Option<u64>,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            race_ids: vec!["live".to_string()],
            generator: GeneratorConfig::default(),
            seed: None,
        }
    }
}

impl ServerRuntimeConfig {
    /// Set the tick interval.
    pub fn with_tick_interval(mut self, tick: Duration) -> Self {
        self.generator.tick_interval = tick;
        self
    }
}

async fn bind_listener(address: &str) -> Result<TcpListener, ServerError> {
    let addr: SocketAddr = address
        .parse()
        .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;
    TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Config(format!("cannot bind {addr}: {e}")))
}

/// Production simulation server.
pub struct Server {
    listener: TcpListener,
    config: ServerRuntimeConfig,
    env: SystemEnv,
    catalog: Arc<MemoryCatalog>,
    sink: BroadcastSink,
    cancel: CancellationToken,
}

impl Server {
    /// Create and bind a new server, registering a demo session per race.
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` if no race is configured, the tick interval is
    ///   zero, or the address cannot be bound
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        if config.race_ids.is_empty() {
            return Err(ServerError::Config("at least one race id is required".to_string()));
        }
        if config.generator.tick_interval.is_zero() {
            return Err(ServerError::Config("tick interval must be positive".to_string()));
        }

        let env = SystemEnv::new();
        let catalog = Arc::new(MemoryCatalog::new());
        for race_id in &config.race_ids {
            catalog.insert(SessionSeed::demo(race_id.clone(), env.wall_clock_ms()))?;
        }

        let listener = bind_listener(&config.bind_address).await?;
        tracing::info!("Simulation server bound to {}", listener.local_addr()?);

        Ok(Self {
            listener,
            config,
            env,
            catalog,
            sink: BroadcastSink::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Session catalog the hosts read from.
    pub fn catalog(&self) -> &Arc<MemoryCatalog> {
        &self.catalog
    }

    /// Fan-out shared by all hosts.
    pub fn sink(&self) -> &BroadcastSink {
        &self.sink
    }

    /// Token that stops the server and every task it spawned.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start one host per race, then accept viewers until shut down.
    pub async fn run(self) -> Result<(), ServerError> {
        for (index, race_id) in self.config.race_ids.iter().enumerate() {
            let seed = match self.config.seed {
                Some(seed) => seed.wrapping_add(index as u64),
                None => self.env.random_u64(),
            };
            let catalog: Arc<dyn SessionCatalog> = self.catalog.clone();
            let host = SessionHost::new(
                self.env.clone(),
                race_id.clone(),
                catalog,
                self.sink.clone(),
                self.config.generator.clone(),
                ChaCha8Rng::seed_from_u64(seed),
            );
            tokio::spawn(host.run(self.cancel.child_token()));
        }

        let default_race = self.config.race_ids.first().cloned().unwrap_or_default();

        loop {
            let accepted = tokio::select! {
                () = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let sink = self.sink.clone();
                    let default_race = default_race.clone();
                    let cancel = self.cancel.child_token();

                    tokio::spawn(async move {
                        if let Err(e) = serve_viewer(stream, sink, &default_race, cancel).await {
                            tracing::debug!(%peer, "viewer connection error: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }

        tracing::info!("Simulation server stopped");
        Ok(())
    }
}

async fn serve_viewer(
    stream: tokio::net::TcpStream,
    sink: BroadcastSink,
    default_race: &str,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let (socket, path) = transport::accept(stream).await?;

    let race_id = match parse_route(&path) {
        Route::Default => default_race.to_string(),
        Route::Session(race_id) => race_id,
        Route::Unknown => {
            tracing::debug!(%path, "unknown path, closing");
            return transport::reject(socket, transport::UNKNOWN_ROUTE_REASON).await;
        },
    };

    tracing::info!(%race_id, "viewer connected");
    let subscription = sink.subscribe(&race_id);
    let result = transport::pump(socket, subscription, cancel).await;
    tracing::info!(%race_id, "viewer disconnected");
    result
}

/// Production replay server.
pub struct ReplayServer {
    listener: TcpListener,
    service: ReplayService,
    env: SystemEnv,
    cancel: CancellationToken,
}

impl ReplayServer {
    /// Bind a replay server on `0.0.0.0:{port}`.
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` if the port cannot be bound
    pub async fn bind(port: u16, service: ReplayService) -> Result<Self, ServerError> {
        Self::bind_addr(&format!("0.0.0.0:{port}"), service).await
    }

    /// Bind a replay server on an explicit address.
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` if the address is invalid or cannot be bound
    pub async fn bind_addr(address: &str, service: ReplayService) -> Result<Self, ServerError> {
        let listener = bind_listener(address).await?;
        tracing::info!("Replay server bound to {}", listener.local_addr()?);
        Ok(Self { listener, service, env: SystemEnv::new(), cancel: CancellationToken::new() })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Token that stops the server and every playback.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Accept viewers until shut down, giving each its own playback.
    pub async fn run(self) -> Result<(), ServerError> {
        loop {
            let accepted = tokio::select! {
                () = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let service = self.service.clone();
                    let env = self.env.clone();
                    let cancel = self.cancel.child_token();

                    tokio::spawn(async move {
                        if let Err(e) = serve_replay_viewer(stream, service, env, cancel).await {
                            tracing::debug!(%peer, "viewer connection error: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }

        tracing::info!("Replay server stopped");
        Ok(())
    }
}

async fn serve_replay_viewer(
    stream: tokio::net::TcpStream,
    service: ReplayService,
    env: SystemEnv,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let (socket, _path) = transport::accept(stream).await?;
    tracing::info!(race = service.race_name(), "viewer connected, starting replay");

    // The connection keeps its own sender so it stays open after the last
    // event; playback stops when the viewer leaves.
    let (outbound, frames) = mpsc::channel(SUBSCRIBER_BUFFER);
    let playback = cancel.child_token();
    let player = tokio::spawn({
        let outbound = outbound.clone();
        let playback = playback.clone();
        async move {
            if let Err(e) = service.play(&env, outbound, playback).await {
                tracing::warn!("replay failed: {}", e);
            }
        }
    });

    let result = transport::pump(socket, frames, cancel).await;
    playback.cancel();
    drop(outbound);
    let _ = player.await;

    tracing::info!("viewer disconnected");
    result
}
