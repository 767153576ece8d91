//! Chequer core logic.
//!
//! Decides *what* a live timing stream contains without performing any I/O.
//! Drivers in `chequer-server` own the timers and sockets and call into these
//! types with the current time and a source of randomness.
//!
//! # Components
//!
//! - [`SnapshotGenerator`]: procedural race state, one snapshot per tick
//! - [`ReplayCursor`]: time-scaled playback of a recorded race log
//! - [`car_updates`]: per-car deltas implied by a timeline event
//! - [`SessionCatalog`]: the session query interface generators read from
//! - [`Environment`]: clock, sleep and entropy abstraction

pub mod catalog;
pub mod env;
pub mod error;
pub mod extract;
pub mod generator;
pub mod replay;
pub mod standings;

pub use catalog::{MemoryCatalog, SeedEntry, SessionCatalog, SessionSeed};
pub use env::{Environment, SystemEnv};
pub use error::{CatalogError, ReplayError};
pub use extract::{LapIndex, car_updates};
pub use generator::{GeneratorConfig, SnapshotGenerator};
pub use replay::{ReplayConfig, ReplayCursor};
