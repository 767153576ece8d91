//! Property-based tests for the snapshot generator.
//!
//! The generator is driven through the simulation harness so every case is a
//! pure function of its seed; invariants are checked after every tick.

use std::time::Duration;

use chequer_core::{GeneratorConfig, SessionSeed, SnapshotGenerator};
use chequer_harness::{InvariantRegistry, SimSession, TickObservation};
use chequer_proto::{Gap, TimingState};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn pit_heavy() -> GeneratorConfig {
    GeneratorConfig { pit_entry_probability: 0.3, pit_exit_probability: 0.5, ..Default::default() }
}

fn tie_prone() -> GeneratorConfig {
    GeneratorConfig {
        pace_step_ms: 0,
        lap_variation_ms: 1,
        sector_jitter_ms: 1,
        gap_jitter_ms: 0,
        ..Default::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: race invariants hold after every tick for any seed.
    #[test]
    fn prop_invariants_hold_under_default_tuning(seed in any::<u64>(), ticks in 1u32..300) {
        let mut session = SimSession::demo("live", seed);
        if let Err((tick, violations)) = session.run(ticks) {
            prop_assert!(false, "seed {} tick {}: {:?}", seed, tick, violations);
        }
    }

    /// Property: frequent pit stops never break pit or lap accounting.
    #[test]
    fn prop_invariants_hold_with_frequent_pit_stops(seed in any::<u64>()) {
        let mut session = SimSession::with_config("live", seed, pit_heavy());
        if let Err((tick, violations)) = session.run(150) {
            prop_assert!(false, "seed {} tick {}: {:?}", seed, tick, violations);
        }
    }

    /// Property: near-identical pace still yields one overall best holder.
    #[test]
    fn prop_single_holder_under_ties(seed in any::<u64>()) {
        let mut session = SimSession::with_config("live", seed, tie_prone());
        if let Err((tick, violations)) = session.run(120) {
            prop_assert!(false, "seed {} tick {}: {:?}", seed, tick, violations);
        }
    }

    /// Property: the global lap counter follows race time alone.
    #[test]
    fn prop_lap_counter_follows_race_time(seed in any::<u64>(), ticks in 1u32..400) {
        let mut session = SimSession::demo("live", seed);
        let start_lap = session.generator().lap();
        session.run(ticks).unwrap();

        prop_assert_eq!(session.generator().lap(), start_lap + ticks / 110);
    }
}

#[test]
fn registry_accepts_initial_state() {
    let seed = SessionSeed::demo("live", 0);
    let generator = SnapshotGenerator::new(GeneratorConfig::default(), &seed);
    let snapshot = generator.snapshot(0);

    InvariantRegistry::standard().assert_all(&TickObservation::first(snapshot), "at start");
}

#[test]
fn lapped_car_shows_lap_gap() {
    let seed = SessionSeed::demo("live", 0);
    let generator = SnapshotGenerator::new(GeneratorConfig::default(), &seed);

    let last = generator.entries().last().unwrap();
    let leader = &generator.entries()[0];
    assert_eq!(last.gap_to_leader, Gap::laps(leader.completed_laps - last.completed_laps).unwrap());
}

#[test]
fn overall_best_appears_once_laps_are_timed() {
    let seed = SessionSeed::demo("live", 0);
    let mut generator = SnapshotGenerator::new(GeneratorConfig::default(), &seed);
    let mut rng = ChaCha8Rng::seed_from_u64(3);

    let snapshot = generator.tick(&mut rng, 1_000);
    let holders = snapshot
        .entries
        .iter()
        .filter(|e| e.best_lap.is_some_and(|t| t.state == TimingState::OverallBest))
        .count();
    assert_eq!(holders, 1);
}

#[test]
fn tick_interval_drives_race_clock() {
    let config =
        GeneratorConfig { tick_interval: Duration::from_millis(500), ..Default::default() };
    let seed = SessionSeed::demo("live", 0);
    let mut generator = SnapshotGenerator::new(config, &seed);
    let mut rng = ChaCha8Rng::seed_from_u64(9);

    for _ in 0..4 {
        generator.tick(&mut rng, 0);
    }
    assert_eq!(generator.race_time_ms(), 2_000);
}
