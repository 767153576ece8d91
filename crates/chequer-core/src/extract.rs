//! Per-car updates derived from timeline events.
//!
//! Extraction is a total mapping over event kinds. Each known car event
//! touches only the fields it affects, and only for the car it names. Race
//! start and unknown kinds produce no updates.

use std::collections::HashMap;

use chequer_proto::{
    CarEvent, CarNumber, CarStatus, CarUpdate, EventType, LapRecord, RaceEvent, TimelineEvent,
};

/// Published lap and sector times, indexed by car and lap.
#[derive(Debug, Clone, Default)]
pub struct LapIndex {
    laps: HashMap<(CarNumber, u32), LapRecord>,
}

impl LapIndex {
    /// Index a list of lap records. Later records for the same lap win.
    pub fn new(records: impl IntoIterator<Item = LapRecord>) -> Self {
        let laps = records
            .into_iter()
            .map(|record| ((record.car_number.clone(), record.lap_number), record))
            .collect();
        Self { laps }
    }

    /// Record for a car's lap, if published.
    pub fn get(&self, car_number: &str, lap: u32) -> Option<&LapRecord> {
        self.laps.get(&(car_number.to_string(), lap))
    }

    /// Number of indexed laps.
    pub fn len(&self) -> usize {
        self.laps.len()
    }

    /// True if no laps are indexed.
    pub fn is_empty(&self) -> bool {
        self.laps.is_empty()
    }
}

/// Updates implied by one event.
pub fn car_updates(event: &TimelineEvent, laps: &LapIndex) -> Vec<CarUpdate> {
    match &event.event_type {
        EventType::Known(RaceEvent::CarEvent(car_number, kind)) => {
            vec![car_update(car_number, kind, laps)]
        },
        EventType::Known(RaceEvent::RaceStart) | EventType::Unknown(_) => Vec::new(),
    }
}

fn car_update(car_number: &str, kind: &CarEvent, laps: &LapIndex) -> CarUpdate {
    let mut update = CarUpdate::for_car(car_number);

    match kind {
        CarEvent::Start { current_lap } => update.current_lap = Some(*current_lap),
        CarEvent::LapCompleted(lap) => {
            update.completed_laps = Some(*lap);
            update.current_lap = Some(lap.saturating_add(1));
            if let Some(record) = laps.get(car_number, *lap) {
                update.last_lap_ms = record.lap_time;
                update.sector1_ms = record.s1;
                update.sector2_ms = record.s2;
                update.sector3_ms = record.s3;
            }
        },
        CarEvent::PitIn => update.in_pit = Some(true),
        CarEvent::PitOut => update.in_pit = Some(false),
        CarEvent::Retirement => update.status = Some(CarStatus::Retired),
        CarEvent::Checkered => update.status = Some(CarStatus::Checkered),
    }

    update
}
