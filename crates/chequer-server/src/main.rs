//! Chequer simulation server binary.
//!
//! # Usage
//!
//! ```bash
//! # One simulated race, served on / and /sessions/live
//! chequer-server --bind 0.0.0.0:8080
//!
//! # Two races, reproducible
//! chequer-server --race-id spa --race-id lemans --seed 42
//! ```

use std::time::Duration;

use chequer_server::{Server, ServerRuntimeConfig};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Chequer simulation server
#[derive(Parser, Debug)]
#[command(name = "chequer-server")]
#[command(about = "Procedurally generated live timing over WebSocket")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Race to host (repeatable); the first is also served on /
    #[arg(long = "race-id", default_value = "live")]
    race_ids: Vec<String>,

    /// Milliseconds between snapshots
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    tick_ms: u64,

    /// Fixed RNG seed for reproducible races
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Chequer simulation server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        race_ids: args.race_ids,
        seed: args.seed,
        ..Default::default()
    }
    .with_tick_interval(Duration::from_millis(args.tick_ms));

    let server = Server::bind(config).await?;
    let shutdown = server.shutdown_token();

    tracing::info!("Server listening on {}", server.local_addr()?);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
            shutdown.cancel();
        }
    });

    server.run().await?;

    Ok(())
}
