//! Precomputed race logs for replay.
//!
//! A [`RaceLog`] is loaded once and never mutated. Its events are ordered by
//! race time; loaders validate that ordering and reject logs that violate it
//! instead of sorting them.

use serde::{Deserialize, Deserializer, Serialize, de::IgnoredAny};

use crate::{
    duration,
    entry::CarNumber,
    error::{ProtocolError, Result},
};

/// Transition of a single car.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarEvent {
    /// Car took the start on the given lap.
    Start {
        /// Lap the car is on.
        #[serde(rename = "currentLap")]
        current_lap: u32,
    },
    /// Car crossed the line completing lap `n`.
    ///
    /// Accepts `{"LapCompleted": n}` as well as the older
    /// `{"LapCompleted": [n, {...}]}` form.
    LapCompleted(#[serde(deserialize_with = "lap_number")] u32),
    /// Car entered the pit lane.
    PitIn,
    /// Car left the pit lane.
    PitOut,
    /// Car retired.
    Retirement,
    /// Car took the chequered flag.
    Checkered,
}

fn lap_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lap {
        Number(u32),
        Detailed(u32, IgnoredAny),
    }

    Ok(match Lap::deserialize(deserializer)? {
        Lap::Number(n) | Lap::Detailed(n, _) => n,
    })
}

/// Event kinds this version understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceEvent {
    /// Lights out.
    RaceStart,
    /// Transition of one car.
    CarEvent(CarNumber, CarEvent),
}

/// Event payload, with unknown kinds preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventType {
    /// A recognised event.
    Known(RaceEvent),
    /// Any other shape, kept as raw JSON.
    Unknown(serde_json::Value),
}

impl From<RaceEvent> for EventType {
    fn from(event: RaceEvent) -> Self {
        Self::Known(event)
    }
}

/// Timestamped entry of a race log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Race time of the event in milliseconds; a race-clock string on the wire.
    #[serde(with = "duration::race_clock")]
    pub event_time: u64,
    /// What happened.
    pub event_type: EventType,
}

impl TimelineEvent {
    /// Build a recognised event.
    pub fn new(event_time: u64, event: RaceEvent) -> Self {
        Self { event_time, event_type: event.into() }
    }

    /// True for the `RaceStart` kind.
    pub fn is_race_start(&self) -> bool {
        matches!(self.event_type, EventType::Known(RaceEvent::RaceStart))
    }
}

/// Driver listed on a grid slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDriver {
    /// Full name as published.
    pub name: String,
    /// Driver in the car at the start.
    #[serde(default)]
    pub is_current_driver: bool,
}

/// Car listed on a grid slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCar {
    /// Car number.
    pub car_number: CarNumber,
    /// Team name.
    #[serde(default)]
    pub team: Option<String>,
    /// Class tag.
    #[serde(default)]
    pub class: Option<String>,
    /// Driver line-up.
    #[serde(default)]
    pub drivers: Vec<GridDriver>,
}

/// One slot of the starting grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSlot {
    /// Car on the slot.
    pub car: GridCar,
}

/// A complete replayable race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceLog {
    /// Display name of the race.
    pub name: String,
    /// Cars in grid order.
    #[serde(default)]
    pub starting_grid: Vec<GridSlot>,
    /// Events in race-time order.
    #[serde(alias = "timeline_events")]
    pub timeline_events: Vec<TimelineEvent>,
}

impl RaceLog {
    /// Decode and validate a race log from JSON text.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Decode` if the text is not a race log
    /// - `ProtocolError::InvalidLog` if [`RaceLog::validate`] fails
    pub fn from_json(text: &str) -> Result<Self> {
        let log: Self = serde_json::from_str(text)?;
        log.validate()?;
        Ok(log)
    }

    /// Check the structural requirements of a replayable log.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidLog` if the log has no events, does not begin
    ///   with `RaceStart`, or has an event earlier than its predecessor
    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.timeline_events.first() else {
            return Err(ProtocolError::InvalidLog("no timeline events".to_string()));
        };
        if !first.is_race_start() {
            return Err(ProtocolError::InvalidLog("first event is not RaceStart".to_string()));
        }

        for (i, pair) in self.timeline_events.windows(2).enumerate() {
            if pair[1].event_time < pair[0].event_time {
                return Err(ProtocolError::InvalidLog(format!(
                    "event {} at {} precedes event {} at {}",
                    i + 1,
                    duration::format(pair[1].event_time),
                    i,
                    duration::format(pair[0].event_time),
                )));
            }
        }

        Ok(())
    }
}

/// Timed lap of one car, as published in a laps file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapRecord {
    /// Car number.
    pub car_number: CarNumber,
    /// Lap number, 1-based.
    pub lap_number: u32,
    /// Lap time; empty when not timed.
    #[serde(default, with = "duration::optional_race_clock")]
    pub lap_time: Option<u64>,
    /// First sector.
    #[serde(default, with = "duration::optional_race_clock")]
    pub s1: Option<u64>,
    /// Second sector.
    #[serde(default, with = "duration::optional_race_clock")]
    pub s2: Option<u64>,
    /// Third sector.
    #[serde(default, with = "duration::optional_race_clock")]
    pub s3: Option<u64>,
}

/// Laps file contents: either a bare array or an object with a `laps` array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LapsFile {
    /// `[ {...}, ... ]`
    Bare(Vec<LapRecord>),
    /// `{ "laps": [ {...}, ... ] }`
    Wrapped {
        /// Lap records.
        laps: Vec<LapRecord>,
    },
}

impl LapsFile {
    /// Decode a laps file from JSON text.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Decode` if the text is neither accepted shape
    pub fn from_json(text: &str) -> Result<Vec<LapRecord>> {
        Ok(serde_json::from_str::<Self>(text)?.into_records())
    }

    /// Unwrap into the record list.
    pub fn into_records(self) -> Vec<LapRecord> {
        match self {
            Self::Bare(laps) | Self::Wrapped { laps } => laps,
        }
    }
}
