//! Streaming envelope pushed to viewers.

use serde::{Deserialize, Serialize};

use crate::{
    duration,
    entry::{CarNumber, CarStatus},
    error::Result,
    session::SessionSnapshot,
    timeline::TimelineEvent,
};

/// Sparse update for one car. Absent fields are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarUpdate {
    /// Car the update applies to.
    pub car_number: CarNumber,
    /// New overall position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    /// Lap the car is now on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_lap: Option<u32>,
    /// Laps now completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_laps: Option<u32>,
    /// Time of the lap just completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_lap_ms: Option<u64>,
    /// First sector of the lap just completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector1_ms: Option<u64>,
    /// Second sector of the lap just completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector2_ms: Option<u64>,
    /// Third sector of the lap just completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector3_ms: Option<u64>,
    /// Pit lane state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_pit: Option<bool>,
    /// Running status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CarStatus>,
}

impl CarUpdate {
    /// Update touching no fields.
    pub fn for_car(car_number: impl Into<CarNumber>) -> Self {
        Self { car_number: car_number.into(), ..Self::default() }
    }
}

/// Either a sparse delta or a complete snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageBody {
    /// Per-car deltas.
    UpdatedCars(Vec<CarUpdate>),
    /// Full session state, sufficient to initialise a viewer.
    Session(SessionSnapshot),
}

/// One frame of a live timing stream.
///
/// Flattened on the wire: `{"timestamp", "raceTime", "updatedCars" | "session",
/// "newEvents"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMessage {
    /// Wall-clock send time, Unix epoch milliseconds.
    pub timestamp: u64,
    /// Race time the frame describes.
    #[serde(with = "duration::race_clock")]
    pub race_time: u64,
    /// Delta or snapshot.
    #[serde(flatten)]
    pub body: MessageBody,
    /// Raw events that produced this frame.
    #[serde(default)]
    pub new_events: Vec<TimelineEvent>,
}

impl StreamMessage {
    /// Frame carrying a full snapshot.
    pub fn snapshot(timestamp: u64, snapshot: SessionSnapshot) -> Self {
        Self {
            timestamp,
            race_time: snapshot.elapsed_ms,
            body: MessageBody::Session(snapshot),
            new_events: Vec::new(),
        }
    }

    /// True if the frame carries a full snapshot.
    pub fn is_snapshot(&self) -> bool {
        matches!(self.body, MessageBody::Session(_))
    }

    /// Encode as JSON text.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
