//! Per-car race state.
//!
//! An [`Entry`] is one competing car. Its identity is fixed for the session;
//! progress, timing, gap and pit fields are rewritten by whichever generator
//! owns the session.
//!
//! # Invariants
//!
//! - `completed_laps` and `pit.stop_count` never decrease within a session
//! - `best_lap` never increases within a session
//! - `gap_to_leader` and `interval` are always exactly one [`Gap`] variant, and
//!   the `Laps` variant always carries a lap difference of at least one
//! - `position` is dense and unique across the snapshot; `position_in_class`
//!   is dense and unique within the entry's class

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Car number as printed on the bodywork. Not necessarily numeric ("007").
pub type CarNumber = String;

/// Skill category of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DriverCategory {
    /// Professional.
    Platinum,
    /// Semi-professional.
    Gold,
    /// Amateur with racing background.
    Silver,
    /// Amateur.
    Bronze,
}

/// A driver sharing the car.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Three-letter abbreviation used on timing screens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    /// ISO 3166 alpha-3 code, empty when not published.
    #[serde(default)]
    pub country_code: String,
    /// Skill category, when published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<DriverCategory>,
}

/// Fixed identity of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryIdentity {
    /// Stable identifier, unique within the session.
    pub id: String,
    /// Car number.
    pub car_number: CarNumber,
    /// Class tag (e.g. `HYPERCAR`, `LMGT3`).
    pub class: String,
    /// Team name.
    pub team: String,
    /// Driver currently in the car.
    pub driver: Driver,
}

/// Classification of a lap or sector time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimingState {
    /// Ordinary time.
    #[default]
    Neutral,
    /// Strictly faster than the entry's previous best.
    PersonalBest,
    /// The fastest best time among all entries this session.
    OverallBest,
    /// Time not counted (track limits, pit lane).
    Invalid,
}

/// A duration with its classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    /// Duration in milliseconds.
    pub time_ms: u32,
    /// Classification.
    pub state: TimingState,
}

impl Timing {
    /// Unclassified timing.
    pub fn neutral(time_ms: u32) -> Self {
        Self { time_ms, state: TimingState::Neutral }
    }
}

/// Distance to another car.
///
/// Serialized as `{"kind":"laps","lapDifference":n}` or
/// `{"kind":"timeGap","milliseconds":n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Gap {
    /// Trailing by whole laps.
    #[serde(rename_all = "camelCase")]
    Laps {
        /// Number of laps behind, at least one.
        lap_difference: NonZeroU32,
    },
    /// Trailing on the same lap.
    TimeGap {
        /// Time behind.
        milliseconds: u32,
    },
}

impl Gap {
    /// The leader's gap to itself.
    pub const ZERO: Self = Self::TimeGap { milliseconds: 0 };

    /// Gap for a car `laps` behind, or `None` for a same-lap car.
    pub fn laps(laps: u32) -> Option<Self> {
        NonZeroU32::new(laps).map(|lap_difference| Self::Laps { lap_difference })
    }
}

impl Default for Gap {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Tire compound fitted at the last stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TireCompound {
    /// Soft slick.
    Soft,
    /// Medium slick.
    #[default]
    Medium,
    /// Hard slick.
    Hard,
    /// Wet weather tire.
    Wet,
}

/// Pit lane state of an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitState {
    /// Currently in the pit lane.
    pub in_pit: bool,
    /// Completed pit entries this session.
    pub stop_count: u32,
    /// Race time of the most recent pit entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_entry_ms: Option<u64>,
    /// Duration of the most recent completed stop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_duration_ms: Option<u64>,
    /// Fitted compound.
    pub tire: TireCompound,
}

/// Running status of a car.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CarStatus {
    /// On track.
    #[default]
    Racing,
    /// Out of the race.
    Retired,
    /// Took the chequered flag.
    Checkered,
}

/// One competing car.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Fixed identity.
    #[serde(flatten)]
    pub identity: EntryIdentity,
    /// Overall rank, 1-based.
    pub position: u32,
    /// Rank within the entry's class, 1-based.
    pub position_in_class: u32,
    /// Laps completed.
    pub completed_laps: u32,
    /// Laps since the last pit entry.
    pub stint_laps: u32,
    /// Most recent lap.
    #[serde(default)]
    pub last_lap: Option<Timing>,
    /// Fastest lap this session.
    #[serde(default)]
    pub best_lap: Option<Timing>,
    /// Sectors of the most recent lap.
    #[serde(default)]
    pub sectors: [Option<Timing>; 3],
    /// Fastest time seen per sector this session.
    #[serde(default)]
    pub best_sectors_ms: [Option<u32>; 3],
    /// Distance to the overall leader.
    pub gap_to_leader: Gap,
    /// Distance to the car one position ahead.
    pub interval: Gap,
    /// Pit lane state.
    pub pit: PitState,
    /// Running status.
    pub status: CarStatus,
}

impl Entry {
    /// A fresh entry at the given grid position with no timing yet.
    pub fn on_grid(identity: EntryIdentity, position: u32) -> Self {
        Self {
            identity,
            position,
            position_in_class: position,
            completed_laps: 0,
            stint_laps: 0,
            last_lap: None,
            best_lap: None,
            sectors: [None; 3],
            best_sectors_ms: [None; 3],
            gap_to_leader: Gap::ZERO,
            interval: Gap::ZERO,
            pit: PitState::default(),
            status: CarStatus::Racing,
        }
    }

    /// Car number shortcut.
    pub fn car_number(&self) -> &str {
        &self.identity.car_number
    }

    /// Class shortcut.
    pub fn class(&self) -> &str {
        &self.identity.class
    }

    /// Best lap time in milliseconds, if any lap has been timed.
    pub fn best_lap_ms(&self) -> Option<u32> {
        self.best_lap.map(|t| t.time_ms)
    }
}
