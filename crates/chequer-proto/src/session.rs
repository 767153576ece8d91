//! Session-level state.

use serde::{Deserialize, Serialize};

use crate::entry::Entry;

/// Track flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlagType {
    /// Racing conditions.
    #[default]
    Green,
    /// Local caution.
    Yellow,
    /// Session stopped.
    Red,
    /// Field neutralised behind the safety car.
    SafetyCar,
    /// Field neutralised by speed limit.
    VirtualSafetyCar,
}

/// Flag plus running state of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// Current track flag.
    pub flag: FlagType,
    /// Session clock is running.
    pub running: bool,
    /// Session is over and results are final.
    pub closed: bool,
}

/// Ambient conditions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Weather {
    /// Air temperature in °C.
    pub air_temp: f64,
    /// Track surface temperature in °C.
    pub track_temp: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
}

impl Default for Weather {
    fn default() -> Self {
        Self { air_temp: 25.9, track_temp: 27.0, humidity: 61.0 }
    }
}

/// Flag shown in one sector of the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorFlag {
    /// Sector number, 1-based.
    pub sector: u8,
    /// Flag shown.
    pub flag: FlagType,
}

/// Fixed start and length of a session.
///
/// Elapsed and remaining time are always derived from these two values and a
/// wall-clock reading; they are never accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClock {
    /// Session start, Unix epoch milliseconds.
    pub starts_at_ms: u64,
    /// Scheduled session length.
    pub duration_ms: u64,
}

impl SessionClock {
    /// Time since the start, zero before it.
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.starts_at_ms)
    }

    /// Time until the scheduled end, zero after it.
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.duration_ms.saturating_sub(self.elapsed_ms(now_ms))
    }

    /// Scheduled end has passed.
    pub fn is_over(&self, now_ms: u64) -> bool {
        self.remaining_ms(now_ms) == 0
    }
}

/// Full state of one race at one instant.
///
/// `entries` is ordered by rank: `entries[i].position == i + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Race identifier.
    pub race_id: String,
    /// Entries in rank order.
    pub entries: Vec<Entry>,
    /// Global lap counter.
    pub lap: u32,
    /// Time since the session start.
    pub elapsed_ms: u64,
    /// Time until the scheduled end.
    pub remaining_ms: u64,
    /// Flag and running state.
    pub status: SessionStatus,
    /// Ambient conditions.
    pub weather: Weather,
    /// Per-sector flag overlay, ordered by sector.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sector_flags: Vec<SectorFlag>,
}

impl SessionSnapshot {
    /// Find an entry by car number.
    pub fn entry(&self, car_number: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.car_number() == car_number)
    }

    /// The entry in first place.
    pub fn leader(&self) -> Option<&Entry> {
        self.entries.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_derived_from_start_and_length() {
        let clock = SessionClock { starts_at_ms: 1_000, duration_ms: 6 * 3_600_000 };

        assert_eq!(clock.elapsed_ms(500), 0);
        assert_eq!(clock.elapsed_ms(61_000), 60_000);
        assert_eq!(clock.remaining_ms(61_000), 6 * 3_600_000 - 60_000);
        assert!(!clock.is_over(61_000));
        assert!(clock.is_over(1_000 + 6 * 3_600_000));
        assert_eq!(clock.remaining_ms(u64::MAX), 0);
    }
}
