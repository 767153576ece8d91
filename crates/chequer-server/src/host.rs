//! Simulation host: one generator task per race.
//!
//! The host owns the race's [`SnapshotGenerator`], its RNG and the tick timer.
//! Every tick it asks the session catalog whether the race exists. A missing
//! race skips the tick and is retried on the next one; the generator is built
//! on the first tick the race is found and kept from then on. Each produced
//! snapshot goes to the [`BroadcastSink`], whether or not anyone is
//! subscribed.

use std::sync::Arc;

use chequer_core::{
    CatalogError, Environment, GeneratorConfig, SessionCatalog, SnapshotGenerator,
};
use chequer_proto::StreamMessage;
use rand_chacha::ChaCha8Rng;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::sink::BroadcastSink;

/// Outcome of one host tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A snapshot was produced and published to this many subscribers.
    Published(usize),
    /// The race is not in the catalog; nothing was produced.
    Skipped,
}

/// Drives one race's generator.
pub struct SessionHost<E: Environment> {
    env: E,
    race_id: String,
    catalog: Arc<dyn SessionCatalog>,
    sink: BroadcastSink,
    config: GeneratorConfig,
    rng: ChaCha8Rng,
    generator: Option<SnapshotGenerator>,
}

impl<E: Environment> SessionHost<E> {
    /// Host for `race_id`. Nothing runs until [`SessionHost::run`] or
    /// [`SessionHost::tick`] is called.
    pub fn new(
        env: E,
        race_id: impl Into<String>,
        catalog: Arc<dyn SessionCatalog>,
        sink: BroadcastSink,
        config: GeneratorConfig,
        rng: ChaCha8Rng,
    ) -> Self {
        Self { env, race_id: race_id.into(), catalog, sink, config, rng, generator: None }
    }

    /// Race this host drives.
    pub fn race_id(&self) -> &str {
        &self.race_id
    }

    /// Generator, once the race has been found.
    pub fn generator(&self) -> Option<&SnapshotGenerator> {
        self.generator.as_ref()
    }

    /// Produce and publish one snapshot.
    ///
    /// # Errors
    ///
    /// - `ServerError::Catalog` if the catalog is unavailable
    /// - `ServerError::Protocol` if the snapshot cannot be encoded
    pub fn tick(&mut self) -> Result<TickOutcome, crate::ServerError> {
        let seed = match self.catalog.lookup(&self.race_id) {
            Ok(seed) => seed,
            Err(CatalogError::NotFound { race_id }) => {
                tracing::debug!(%race_id, "session not found, skipping tick");
                return Ok(TickOutcome::Skipped);
            },
            Err(err) => return Err(err.into()),
        };

        let generator = self.generator.get_or_insert_with(|| {
            tracing::info!(race_id = %seed.race_id, entries = seed.grid.len(), "session started");
            SnapshotGenerator::new(self.config.clone(), &seed)
        });

        let now_ms = self.env.wall_clock_ms();
        let snapshot = generator.tick(&mut self.rng, now_ms);
        let message = StreamMessage::snapshot(now_ms, snapshot);
        let delivered = self.sink.publish(&self.race_id, &message)?;

        Ok(TickOutcome::Published(delivered))
    }

    /// Tick at the configured interval until `cancel` fires.
    ///
    /// Tick errors are logged and do not stop the host.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately.
        interval.tick().await;

        tracing::info!(
            race_id = %self.race_id,
            tick = ?self.config.tick_interval,
            "session host running"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        tracing::warn!(race_id = %self.race_id, "tick failed: {}", e);
                    }
                },
            }
        }

        tracing::info!(race_id = %self.race_id, "session host stopped");
    }
}
