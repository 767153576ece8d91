//! Deterministic simulation harness for Chequer.
//!
//! Seeded implementations of the core [`Environment`](chequer_core::Environment)
//! trait and a driver that runs the snapshot generator tick by tick, so a
//! failing run is reproducible from its seed alone.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks behavioral properties of generated race
//! state: dense rankings, monotonic lap and pit counters, a single overall
//! best holder per metric, and gap variants consistent with lap deficits. Use
//! [`InvariantRegistry::standard()`] for the full set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_env;
pub mod sim_session;

pub use invariants::{
    BestLapNonIncreasing, DenseRanking, GapVariantValid, Invariant, InvariantRegistry,
    InvariantResult, LapsMonotonic, PitCountMonotonic, SingleOverallBest, TickObservation,
    Violation,
};
pub use sim_env::SimEnv;
pub use sim_session::SimSession;
