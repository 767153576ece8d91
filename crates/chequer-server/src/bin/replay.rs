//! Chequer replay server binary.
//!
//! Plays a recorded race log to every viewer that connects, each from the
//! start, at a configurable speed.
//!
//! # Usage
//!
//! ```bash
//! chequer-replay --file race.json
//! chequer-replay --file race.json --laps-file laps.json --speed 60 --port 9000
//! ```

use std::path::PathBuf;

use chequer_core::ReplayConfig;
use chequer_server::{ReplayServer, ReplayService};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Chequer replay server
#[derive(Parser, Debug)]
#[command(name = "chequer-replay")]
#[command(about = "Replays a recorded race log as live timing over WebSocket")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Playback speed multiplier
    #[arg(long, default_value_t = 10.0, value_parser = positive_speed)]
    speed: f64,

    /// Race log (JSON)
    #[arg(long)]
    file: PathBuf,

    /// Per-lap times (JSON) used to enrich lap completions
    #[arg(long)]
    laps_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn positive_speed(value: &str) -> Result<f64, String> {
    let speed: f64 = value.parse().map_err(|e| format!("{e}"))?;
    ReplayConfig::new(speed).map(|config| config.speed()).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Chequer replay server starting");

    let config = ReplayConfig::new(args.speed)?;
    let service = ReplayService::load(&args.file, args.laps_file.as_deref(), config)?;
    let server = ReplayServer::bind(args.port, service).await?;
    let shutdown = server.shutdown_token();

    tracing::info!("Replaying at {}x on {}", args.speed, server.local_addr()?);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
            shutdown.cancel();
        }
    });

    server.run().await?;

    Ok(())
}
