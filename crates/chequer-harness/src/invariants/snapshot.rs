//! Observable state for invariant checking.
//!
//! Invariants run against a pair of consecutive session snapshots rather than
//! live generator state, so a check sees one consistent instant and the one
//! before it.

use chequer_proto::{Entry, SessionSnapshot};

/// One tick as seen from outside the generator.
#[derive(Debug, Clone)]
pub struct TickObservation {
    /// Snapshot from the previous tick, if any.
    pub previous: Option<SessionSnapshot>,
    /// Snapshot produced by this tick.
    pub current: SessionSnapshot,
}

impl TickObservation {
    /// First observation of a session.
    pub fn first(current: SessionSnapshot) -> Self {
        Self { previous: None, current }
    }

    /// Observation following `previous`.
    pub fn after(previous: SessionSnapshot, current: SessionSnapshot) -> Self {
        Self { previous: Some(previous), current }
    }

    /// Pairs of (previous, current) state for every car present in both.
    pub fn entry_pairs(&self) -> impl Iterator<Item = (&Entry, &Entry)> {
        let previous = self.previous.as_ref();
        self.current.entries.iter().filter_map(move |current| {
            previous?.entry(current.car_number()).map(|before| (before, current))
        })
    }
}
