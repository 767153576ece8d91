//! Timeline replay engine.
//!
//! A [`ReplayCursor`] is one subscriber's position in a shared, read-only
//! [`RaceLog`]. The cursor never sleeps: the driver asks it how long to wait
//! before the next emission, waits, then asks for the message. Subscribers
//! that attach at different times each get their own cursor.
//!
//! # Timing
//!
//! Event `i` is due `(t[i] - t[i-1]) / speed` after event `i-1` was sent, but
//! never sooner than [`MIN_EMISSION_SPACING`]. The first emission is the race
//! start, sent immediately with a snapshot synthesised from the starting grid.

use std::{sync::Arc, time::Duration};

use chequer_proto::{
    Driver, Entry, EntryIdentity, GridCar, MessageBody, RaceLog, SessionSnapshot, SessionStatus,
    StreamMessage, Weather,
};

use crate::{
    error::ReplayError,
    extract::{LapIndex, car_updates},
    standings,
};

/// Minimum time between two consecutive emissions.
pub const MIN_EMISSION_SPACING: Duration = Duration::from_millis(100);

/// Default playback speed multiplier.
pub const DEFAULT_SPEED: f64 = 10.0;

/// Playback settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayConfig {
    speed: f64,
    min_spacing: Duration,
}

impl ReplayConfig {
    /// Playback at `speed` times real time.
    ///
    /// # Errors
    ///
    /// - `ReplayError::InvalidSpeed` if `speed` is not finite and positive
    pub fn new(speed: f64) -> Result<Self, ReplayError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(ReplayError::InvalidSpeed(speed));
        }
        Ok(Self { speed, min_spacing: MIN_EMISSION_SPACING })
    }

    /// Playback speed multiplier.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Minimum spacing between emissions.
    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Wall-clock delay for a race-time difference.
    pub fn scaled_delay(&self, race_time_diff_ms: u64) -> Duration {
        // Rounded to whole microseconds; `as` saturates on overflow.
        let micros = (race_time_diff_ms as f64 * 1000.0 / self.speed).round() as u64;
        Duration::from_micros(micros).max(self.min_spacing)
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self { speed: DEFAULT_SPEED, min_spacing: MIN_EMISSION_SPACING }
    }
}

/// One subscriber's position in a race log.
#[derive(Debug, Clone)]
pub struct ReplayCursor {
    log: Arc<RaceLog>,
    laps: Arc<LapIndex>,
    config: ReplayConfig,
    /// Index of the next event to emit.
    next: usize,
    /// Race time of the last emitted event.
    last_event_ms: u64,
}

impl ReplayCursor {
    /// Position a new cursor before the first event.
    ///
    /// # Errors
    ///
    /// - `ReplayError::Log` if the log is empty, does not start with
    ///   `RaceStart`, or is out of order
    pub fn new(
        log: Arc<RaceLog>,
        laps: Arc<LapIndex>,
        config: ReplayConfig,
    ) -> Result<Self, ReplayError> {
        log.validate()?;
        Ok(Self { log, laps, config, next: 0, last_event_ms: 0 })
    }

    /// Events emitted so far.
    pub fn position(&self) -> usize {
        self.next
    }

    /// Total events in the log.
    pub fn len(&self) -> usize {
        self.log.timeline_events.len()
    }

    /// True if the log has no events.
    pub fn is_empty(&self) -> bool {
        self.log.timeline_events.is_empty()
    }

    /// True once every event has been emitted.
    pub fn is_finished(&self) -> bool {
        self.next >= self.len()
    }

    /// Delay before the next emission, or `None` when the replay is over.
    ///
    /// The first emission is due immediately.
    pub fn next_delay(&self) -> Option<Duration> {
        let event = self.log.timeline_events.get(self.next)?;
        if self.next == 0 {
            return Some(Duration::ZERO);
        }
        Some(self.config.scaled_delay(event.event_time.saturating_sub(self.last_event_ms)))
    }

    /// Emit the next message and advance. Returns `None` when the replay is
    /// over.
    ///
    /// `now_ms` is the wall-clock send time stamped on the message.
    pub fn advance(&mut self, now_ms: u64) -> Option<StreamMessage> {
        let event = self.log.timeline_events.get(self.next)?.clone();

        let body = if self.next == 0 {
            MessageBody::Session(self.grid_snapshot())
        } else {
            MessageBody::UpdatedCars(car_updates(&event, &self.laps))
        };

        tracing::debug!(
            index = self.next,
            total = self.len(),
            race_time = %chequer_proto::duration::format(event.event_time),
            "replay emission"
        );

        self.next += 1;
        self.last_event_ms = event.event_time;

        Some(StreamMessage {
            timestamp: now_ms,
            race_time: event.event_time,
            body,
            new_events: vec![event],
        })
    }

    /// Session state before any event: every car on the grid, no laps.
    fn grid_snapshot(&self) -> SessionSnapshot {
        let mut entries: Vec<Entry> = self
            .log
            .starting_grid
            .iter()
            .enumerate()
            .map(|(i, slot)| Entry::on_grid(grid_identity(&slot.car), i as u32 + 1))
            .collect();
        standings::assign_positions(&mut entries);

        SessionSnapshot {
            race_id: self.log.name.clone(),
            entries,
            lap: 0,
            elapsed_ms: 0,
            remaining_ms: 0,
            status: SessionStatus { running: true, ..SessionStatus::default() },
            weather: Weather::default(),
            sector_flags: Vec::new(),
        }
    }
}

fn grid_identity(car: &GridCar) -> EntryIdentity {
    let current = car.drivers.iter().find(|d| d.is_current_driver).or_else(|| car.drivers.first());
    let (first_name, last_name) = current
        .map(|d| match d.name.split_once(' ') {
            Some((first, last)) => (first.to_string(), last.to_string()),
            None => (String::new(), d.name.clone()),
        })
        .unwrap_or_default();

    EntryIdentity {
        id: format!("car-{}", car.car_number),
        car_number: car.car_number.clone(),
        class: car.class.clone().unwrap_or_default(),
        team: car.team.clone().unwrap_or_default(),
        driver: Driver {
            first_name,
            last_name,
            short_name: None,
            country_code: String::new(),
            category: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use chequer_proto::{CarEvent, GridDriver, GridSlot, RaceEvent, TimelineEvent};

    use super::*;

    fn log(times: &[u64]) -> Arc<RaceLog> {
        let mut events = vec![TimelineEvent::new(times[0], RaceEvent::RaceStart)];
        for (lap, t) in times[1..].iter().enumerate() {
            events.push(TimelineEvent::new(
                *t,
                RaceEvent::CarEvent("7".into(), CarEvent::LapCompleted(lap as u32 + 1)),
            ));
        }
        Arc::new(RaceLog {
            name: "Test".to_string(),
            starting_grid: vec![GridSlot {
                car: GridCar {
                    car_number: "7".to_string(),
                    team: Some("Toyota Gazoo Racing".to_string()),
                    class: Some("HYPERCAR".to_string()),
                    drivers: vec![
                        GridDriver { name: "Mike CONWAY".to_string(), is_current_driver: false },
                        GridDriver { name: "Kamui KOBAYASHI".to_string(), is_current_driver: true },
                    ],
                },
            }],
            timeline_events: events,
        })
    }

    fn cursor(times: &[u64], speed: f64) -> ReplayCursor {
        ReplayCursor::new(log(times), Arc::default(), ReplayConfig::new(speed).unwrap()).unwrap()
    }

    #[test]
    fn rejects_non_positive_speed() {
        for speed in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(ReplayConfig::new(speed), Err(ReplayError::InvalidSpeed(_))));
        }
    }

    #[test]
    fn delays_scale_with_speed() {
        let mut cursor = cursor(&[0, 5_000, 12_000], 10.0);

        assert_eq!(cursor.next_delay(), Some(Duration::ZERO));
        cursor.advance(0);
        assert_eq!(cursor.next_delay(), Some(Duration::from_millis(500)));
        cursor.advance(500);
        assert_eq!(cursor.next_delay(), Some(Duration::from_millis(700)));
        cursor.advance(1_200);
        assert_eq!(cursor.next_delay(), None);
        assert!(cursor.advance(1_300).is_none());
    }

    #[test]
    fn near_simultaneous_events_respect_floor() {
        let mut cursor = cursor(&[0, 10, 10, 2_000], 1.0);
        cursor.advance(0);

        assert_eq!(cursor.next_delay(), Some(MIN_EMISSION_SPACING));
        cursor.advance(100);
        assert_eq!(cursor.next_delay(), Some(MIN_EMISSION_SPACING));
        cursor.advance(200);
        assert_eq!(cursor.next_delay(), Some(Duration::from_millis(1_990)));
    }

    #[test]
    fn first_emission_is_grid_snapshot_with_race_start() {
        let mut cursor = cursor(&[0, 5_000], 10.0);

        let first = cursor.advance(42).unwrap();
        assert_eq!(first.timestamp, 42);
        assert!(first.is_snapshot());
        assert!(first.new_events[0].is_race_start());

        let MessageBody::Session(snapshot) = first.body else { panic!("expected snapshot") };
        assert_eq!(snapshot.entries.len(), 1);
        let entry = &snapshot.entries[0];
        assert_eq!(entry.position, 1);
        assert_eq!(entry.identity.driver.last_name, "KOBAYASHI");
        assert!(!entry.pit.in_pit);
    }

    #[test]
    fn later_emissions_carry_deltas_and_raw_event() {
        let mut cursor = cursor(&[0, 5_000], 10.0);
        cursor.advance(0);

        let second = cursor.advance(500).unwrap();
        assert_eq!(second.race_time, 5_000);
        assert_eq!(second.new_events.len(), 1);
        let MessageBody::UpdatedCars(updates) = second.body else { panic!("expected deltas") };
        assert_eq!(updates[0].car_number, "7");
        assert_eq!(updates[0].completed_laps, Some(1));
        assert!(cursor.is_finished());
    }
}
