//! Deterministic driver for the snapshot generator.
//!
//! Runs a [`SnapshotGenerator`] tick by tick against a [`SimEnv`], advancing
//! the simulated wall clock by one tick interval per step and checking every
//! produced snapshot against an [`InvariantRegistry`].

use chequer_core::{Environment, GeneratorConfig, SessionSeed, SnapshotGenerator};
use chequer_proto::SessionSnapshot;
use rand_chacha::ChaCha8Rng;

use crate::{
    invariants::{InvariantRegistry, TickObservation, Violation},
    sim_env::SimEnv,
};

/// One generator session under simulation.
pub struct SimSession {
    env: SimEnv,
    rng: ChaCha8Rng,
    generator: SnapshotGenerator,
    registry: InvariantRegistry,
    last: Option<SessionSnapshot>,
}

impl SimSession {
    /// Demo session for `race_id`, fully determined by `seed`.
    pub fn demo(race_id: &str, seed: u64) -> Self {
        Self::with_config(race_id, seed, GeneratorConfig::default())
    }

    /// Demo session with custom generator tuning.
    pub fn with_config(race_id: &str, seed: u64, config: GeneratorConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        let rng = env.fork_rng();
        let session = SessionSeed::demo(race_id, env.wall_clock_ms());
        let generator = SnapshotGenerator::new(config, &session);

        Self { env, rng, generator, registry: InvariantRegistry::standard(), last: None }
    }

    /// Environment driving this session.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Generator under test.
    pub fn generator(&self) -> &SnapshotGenerator {
        &self.generator
    }

    /// Snapshot produced by the most recent step.
    pub fn last(&self) -> Option<&SessionSnapshot> {
        self.last.as_ref()
    }

    /// Advance one tick and check every invariant.
    ///
    /// # Errors
    ///
    /// Returns all violations found in the new snapshot. The session still
    /// advances, so the caller can inspect the offending state.
    pub fn step(&mut self) -> Result<SessionSnapshot, Vec<Violation>> {
        self.env.advance_wall_clock(self.generator.config().tick_interval);
        let current = self.generator.tick(&mut self.rng, self.env.wall_clock_ms());

        let observation = match self.last.take() {
            Some(previous) => TickObservation::after(previous, current.clone()),
            None => TickObservation::first(current.clone()),
        };
        self.last = Some(current.clone());

        self.registry.check_all(&observation).map(|()| current)
    }

    /// Advance `ticks` times, stopping at the first violation.
    ///
    /// # Errors
    ///
    /// Returns the tick index (starting at 1) and the violations found.
    pub fn run(&mut self, ticks: u32) -> Result<(), (u32, Vec<Violation>)> {
        for tick in 1..=ticks {
            if let Err(violations) = self.step() {
                tracing::warn!(
                    race_id = self.generator.race_id(),
                    tick,
                    count = violations.len(),
                    "invariant violation"
                );
                return Err((tick, violations));
            }
        }
        Ok(())
    }
}
