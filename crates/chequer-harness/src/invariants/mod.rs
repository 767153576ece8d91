//! Invariant checking for generated race state.
//!
//! Invariants are properties every snapshot stream must satisfy, whatever the
//! random draws. Each check receives a [`TickObservation`] holding the current
//! snapshot and the one before it.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let observation = TickObservation::after(previous, current);
//! registry.check_all(&observation)?;
//! ```

mod checks;
mod snapshot;

pub use checks::{
    BestLapNonIncreasing, DenseRanking, GapVariantValid, LapsMonotonic, PitCountMonotonic,
    SingleOverallBest,
};
pub use snapshot::TickObservation;

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against one tick of race state.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against an observation.
    ///
    /// Returns `Ok(())` if the invariant holds, or a [`Violation`]
    /// describing what went wrong.
    fn check(&self, state: &TickObservation) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with every race invariant.
    ///
    /// Includes:
    /// - [`DenseRanking`]: positions and class positions are dense
    /// - [`LapsMonotonic`]: lap counts never decrease
    /// - [`PitCountMonotonic`]: pit stops grow by at most one per tick
    /// - [`BestLapNonIncreasing`]: best laps never get slower
    /// - [`SingleOverallBest`]: one overall best holder per metric
    /// - [`GapVariantValid`]: gap variants agree with lap deficits
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(DenseRanking);
        registry.add(LapsMonotonic);
        registry.add(PitCountMonotonic);
        registry.add(BestLapNonIncreasing);
        registry.add(SingleOverallBest);
        registry.add(GapVariantValid);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given observation.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &TickObservation) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation found.
    ///
    /// # Panics
    ///
    /// Panics if any invariant is violated.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &TickObservation, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use chequer_proto::{
        Driver, Entry, EntryIdentity, Gap, SessionSnapshot, SessionStatus, Timing, TimingState,
        Weather,
    };

    use super::*;

    fn entry(car: &str, class: &str, position: u32, laps: u32) -> Entry {
        let identity = EntryIdentity {
            id: format!("car-{car}"),
            car_number: car.to_string(),
            class: class.to_string(),
            team: "Team".to_string(),
            driver: Driver {
                first_name: "A".to_string(),
                last_name: "Driver".to_string(),
                short_name: None,
                country_code: String::new(),
                category: None,
            },
        };
        let mut entry = Entry::on_grid(identity, position);
        entry.completed_laps = laps;
        entry
    }

    fn snapshot(entries: Vec<Entry>) -> SessionSnapshot {
        SessionSnapshot {
            race_id: "test".to_string(),
            lap: entries.first().map_or(0, |e| e.completed_laps),
            entries,
            elapsed_ms: 0,
            remaining_ms: 0,
            status: SessionStatus::default(),
            weather: Weather::default(),
            sector_flags: Vec::new(),
        }
    }

    fn valid_field() -> Vec<Entry> {
        let mut leader = entry("7", "HYPERCAR", 1, 10);
        leader.position_in_class = 1;
        let mut second = entry("92", "LMGT3", 2, 10);
        second.position_in_class = 1;
        second.gap_to_leader = Gap::TimeGap { milliseconds: 1_500 };
        second.interval = Gap::TimeGap { milliseconds: 1_500 };
        let mut third = entry("46", "LMGT3", 3, 9);
        third.position_in_class = 2;
        third.gap_to_leader = Gap::Laps { lap_difference: NonZeroU32::MIN };
        third.interval = Gap::Laps { lap_difference: NonZeroU32::MIN };
        vec![leader, second, third]
    }

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert!(!registry.is_empty());
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn empty_snapshot_passes_invariants() {
        let registry = InvariantRegistry::standard();
        assert!(registry.check_all(&TickObservation::first(snapshot(Vec::new()))).is_ok());
    }

    #[test]
    fn valid_field_passes() {
        let registry = InvariantRegistry::standard();
        let observation = TickObservation::first(snapshot(valid_field()));
        assert!(registry.check_all(&observation).is_ok());
    }

    #[test]
    fn position_gap_is_caught() {
        let mut field = valid_field();
        field[2].position = 4;

        let violations = InvariantRegistry::standard()
            .check_all(&TickObservation::first(snapshot(field)))
            .unwrap_err();
        assert_eq!(violations[0].invariant, "DenseRanking");
    }

    #[test]
    fn lap_regression_is_caught() {
        let before = snapshot(valid_field());
        let mut field = valid_field();
        field[1].completed_laps = 9;
        field[1].gap_to_leader = Gap::Laps { lap_difference: NonZeroU32::MIN };
        field[1].interval = Gap::Laps { lap_difference: NonZeroU32::MIN };
        field[2].interval = Gap::TimeGap { milliseconds: 900 };

        let violations = InvariantRegistry::standard()
            .check_all(&TickObservation::after(before, snapshot(field)))
            .unwrap_err();
        assert!(violations.iter().any(|v| v.invariant == "LapsMonotonic"));
    }

    #[test]
    fn two_overall_best_holders_are_caught() {
        let mut field = valid_field();
        let best = Timing { time_ms: 108_000, state: TimingState::OverallBest };
        field[0].best_lap = Some(best);
        field[1].best_lap = Some(best);

        let violations = SingleOverallBest
            .check(&TickObservation::first(snapshot(field)))
            .unwrap_err();
        assert!(violations.message.contains("several"));
    }

    #[test]
    fn time_gap_across_laps_is_caught() {
        let mut field = valid_field();
        field[2].gap_to_leader = Gap::TimeGap { milliseconds: 90_000 };

        assert!(GapVariantValid.check(&TickObservation::first(snapshot(field))).is_err());
    }
}
