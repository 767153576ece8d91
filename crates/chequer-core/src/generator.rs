//! Procedural snapshot generator.
//!
//! Produces one full [`SessionSnapshot`] per tick from the previous entry
//! state and a source of random draws. The generator owns the entry list, the
//! global lap counter and the tick-driven race clock of exactly one session;
//! nothing else writes them.
//!
//! # Per-tick algorithm
//!
//! ```text
//! race clock += tick ──> crossed nominal lap? ──> lap += n, every car +n laps
//!        │
//!        ▼
//! per entry: pit transition ──> lap time ──> sectors ──> classification
//!        │
//!        ▼
//! overall-best holders ──> rank ──> gap to leader / interval
//! ```
//!
//! All draws come from bounded ranges, so the monotonicity invariants hold for
//! any draw sequence: completed laps and pit counts only ever grow, best times
//! only ever shrink, and at most one entry holds the overall best per metric.

use std::time::Duration;

use chequer_proto::{
    Entry, FlagType, Gap, SectorFlag, SessionClock, SessionSnapshot, SessionStatus, TireCompound,
    Timing, TimingState, Weather,
};
use rand::Rng;

use crate::{catalog::SessionSeed, standings};

/// Default tick interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Nominal average lap of the simulated circuit.
pub const DEFAULT_NOMINAL_LAP: Duration = Duration::from_secs(110);

/// Tuning knobs for the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    /// Wall time between ticks; also the race clock advance per tick.
    pub tick_interval: Duration,
    /// Lap time of the car in first place.
    pub base_lap_ms: u32,
    /// Added lap time per grid position behind the first car.
    pub pace_step_ms: u32,
    /// Maximum deviation from the base lap time, either side.
    pub lap_variation_ms: u32,
    /// Share of the lap time per sector, in percent.
    pub sector_split_pct: [u32; 3],
    /// Maximum per-sector deviation, either side.
    pub sector_jitter_ms: u32,
    /// Chance per tick that a car on track enters the pits.
    pub pit_entry_probability: f64,
    /// Chance per tick that a car in the pits leaves.
    pub pit_exit_probability: f64,
    /// Race time after which the global lap counter advances.
    pub nominal_lap: Duration,
    /// Time gap per position between cars on the same lap.
    pub gap_step_ms: u32,
    /// Maximum extra time added to each same-lap gap.
    pub gap_jitter_ms: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            base_lap_ms: 108_500,
            pace_step_ms: 300,
            lap_variation_ms: 250,
            sector_split_pct: [30, 38, 32],
            sector_jitter_ms: 250,
            pit_entry_probability: 0.01,
            pit_exit_probability: 0.3,
            nominal_lap: DEFAULT_NOMINAL_LAP,
            gap_step_ms: 1_500,
            gap_jitter_ms: 1_000,
        }
    }
}

/// Holder of the fastest time for one metric.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Record {
    entry_id: String,
    time_ms: u32,
}

/// Fastest lap and sectors across the session.
#[derive(Debug, Clone, Default)]
struct Records {
    lap: Option<Record>,
    sectors: [Option<Record>; 3],
}

/// Per-session snapshot generator.
#[derive(Debug, Clone)]
pub struct SnapshotGenerator {
    config: GeneratorConfig,
    race_id: String,
    clock: SessionClock,
    weather: Weather,
    sector_flags: Vec<SectorFlag>,
    /// Entries in rank order.
    entries: Vec<Entry>,
    records: Records,
    race_time_ms: u64,
    lap: u32,
    ticks: u64,
}

impl SnapshotGenerator {
    /// Start a generator from a session seed.
    ///
    /// Entries are ranked from their seeded lap counts; the global lap counter
    /// starts at the leader's completed laps.
    pub fn new(config: GeneratorConfig, seed: &SessionSeed) -> Self {
        let mut entries: Vec<Entry> = seed
            .grid
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let mut entry = Entry::on_grid(slot.identity.clone(), i as u32 + 1);
                entry.completed_laps = slot.completed_laps;
                entry
            })
            .collect();
        standings::rank(&mut entries);

        let lap = entries.first().map_or(0, |leader| leader.completed_laps);

        let mut generator = Self {
            config,
            race_id: seed.race_id.clone(),
            clock: seed.clock,
            weather: seed.weather,
            sector_flags: seed.sector_flags.clone(),
            entries,
            records: Records::default(),
            race_time_ms: 0,
            lap,
            ticks: 0,
        };
        generator.recompute_gaps(|_| 0);
        generator
    }

    /// Configuration in effect.
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Race identifier.
    pub fn race_id(&self) -> &str {
        &self.race_id
    }

    /// Entries in rank order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Global lap counter.
    pub fn lap(&self) -> u32 {
        self.lap
    }

    /// Race time accumulated from ticks.
    pub fn race_time_ms(&self) -> u64 {
        self.race_time_ms
    }

    /// Ticks generated so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Current state as a snapshot, with clock fields derived from `now_ms`.
    pub fn snapshot(&self, now_ms: u64) -> SessionSnapshot {
        let over = self.clock.is_over(now_ms);
        SessionSnapshot {
            race_id: self.race_id.clone(),
            entries: self.entries.clone(),
            lap: self.lap,
            elapsed_ms: self.clock.elapsed_ms(now_ms),
            remaining_ms: self.clock.remaining_ms(now_ms),
            status: SessionStatus { flag: FlagType::Green, running: !over, closed: over },
            weather: self.weather,
            sector_flags: self.sector_flags.clone(),
        }
    }

    /// Advance one tick and return the resulting snapshot.
    pub fn tick<R: Rng + ?Sized>(&mut self, rng: &mut R, now_ms: u64) -> SessionSnapshot {
        self.ticks += 1;
        self.advance_race_clock();

        for index in 0..self.entries.len() {
            self.step_pit(index, rng);
            self.step_timing(index, rng);
        }

        self.update_records();
        standings::rank(&mut self.entries);
        self.recompute_gaps(|max| rng.gen_range(0..=max));

        self.snapshot(now_ms)
    }

    fn advance_race_clock(&mut self) {
        let nominal = self.config.nominal_lap.as_millis().max(1) as u64;
        let before = self.race_time_ms / nominal;
        self.race_time_ms += self.config.tick_interval.as_millis() as u64;
        let crossed = (self.race_time_ms / nominal - before) as u32;

        if crossed > 0 {
            self.lap += crossed;
            for entry in &mut self.entries {
                entry.completed_laps += crossed;
            }
            tracing::trace!(race_id = %self.race_id, lap = self.lap, "lap counter advanced");
        }
    }

    fn step_pit<R: Rng + ?Sized>(&mut self, index: usize, rng: &mut R) {
        let race_time_ms = self.race_time_ms;
        let entry_p = probability(self.config.pit_entry_probability);
        let exit_p = probability(self.config.pit_exit_probability);
        let entry = &mut self.entries[index];

        if entry.pit.in_pit {
            if rng.gen_bool(exit_p) {
                entry.pit.in_pit = false;
                entry.pit.last_duration_ms =
                    entry.pit.last_entry_ms.map(|t| race_time_ms.saturating_sub(t));
                entry.pit.tire = match rng.gen_range(0..3) {
                    0 => TireCompound::Soft,
                    1 => TireCompound::Medium,
                    _ => TireCompound::Hard,
                };
            }
        } else if rng.gen_bool(entry_p) {
            entry.pit.in_pit = true;
            entry.pit.stop_count += 1;
            entry.pit.last_entry_ms = Some(race_time_ms);
            entry.stint_laps = 0;
            tracing::debug!(
                car = %entry.identity.car_number,
                stops = entry.pit.stop_count,
                "pit entry"
            );
        } else {
            entry.stint_laps += 1;
        }
    }

    fn step_timing<R: Rng + ?Sized>(&mut self, index: usize, rng: &mut R) {
        let config = &self.config;
        let variation = i64::from(config.lap_variation_ms);
        let base = i64::from(config.base_lap_ms) + index as i64 * i64::from(config.pace_step_ms);
        let lap_ms = clamp_ms(base + rng.gen_range(-variation..=variation));

        let jitter = i64::from(config.sector_jitter_ms);
        let mut sector_ms = [0u32; 3];
        for (slot, pct) in sector_ms.iter_mut().zip(config.sector_split_pct) {
            let share = i64::from(lap_ms) * i64::from(pct) / 100;
            *slot = clamp_ms(share + rng.gen_range(-jitter..=jitter));
        }

        let entry = &mut self.entries[index];

        if entry.pit.in_pit {
            entry.last_lap = Some(Timing { time_ms: lap_ms, state: TimingState::Invalid });
            entry.sectors =
                sector_ms.map(|t| Some(Timing { time_ms: t, state: TimingState::Invalid }));
            return;
        }

        entry.last_lap = Some(classify(lap_ms, entry.best_lap_ms()));
        if entry.best_lap_ms().is_none_or(|best| lap_ms < best) {
            entry.best_lap = Some(Timing { time_ms: lap_ms, state: TimingState::PersonalBest });
        }

        for (i, time_ms) in sector_ms.into_iter().enumerate() {
            let best = entry.best_sectors_ms[i];
            entry.sectors[i] = Some(classify(time_ms, best));
            if best.is_none_or(|b| time_ms < b) {
                entry.best_sectors_ms[i] = Some(time_ms);
            }
        }
    }

    /// Move each overall record to the entry with the strictly fastest best.
    ///
    /// Ties keep the current holder; among new challengers the higher-ranked
    /// entry wins.
    fn update_records(&mut self) {
        let lap_bests: Vec<Option<u32>> = self.entries.iter().map(Entry::best_lap_ms).collect();
        let new_lap = self.challenge(self.records.lap.as_ref(), &lap_bests);

        let mut new_sectors: [Option<Record>; 3] = Default::default();
        for (sector, slot) in new_sectors.iter_mut().enumerate() {
            let bests: Vec<Option<u32>> =
                self.entries.iter().map(|e| e.best_sectors_ms[sector]).collect();
            *slot = self.challenge(self.records.sectors[sector].as_ref(), &bests);
        }

        // Only one entry may show OverallBest for each metric.
        for entry in &mut self.entries {
            if let Some(best) = entry.best_lap.as_mut() {
                best.state = TimingState::PersonalBest;
            }
            demote(&mut entry.last_lap);
            for sector in &mut entry.sectors {
                demote(sector);
            }
        }

        if let Some(record) = new_lap {
            let fresh = self.records.lap.as_ref() != Some(&record);
            if let Some(entry) = self.entry_mut(&record.entry_id) {
                if let Some(best) = entry.best_lap.as_mut() {
                    best.state = TimingState::OverallBest;
                }
                if fresh {
                    promote(&mut entry.last_lap, record.time_ms);
                }
            }
            self.records.lap = Some(record);
        }

        for (sector, record) in new_sectors.into_iter().enumerate() {
            let Some(record) = record else { continue };
            let fresh = self.records.sectors[sector].as_ref() != Some(&record);
            if fresh && let Some(entry) = self.entry_mut(&record.entry_id) {
                promote(&mut entry.sectors[sector], record.time_ms);
            }
            self.records.sectors[sector] = Some(record);
        }
    }

    fn challenge(&self, current: Option<&Record>, bests: &[Option<u32>]) -> Option<Record> {
        let mut holder = current.cloned();
        for (entry, best) in self.entries.iter().zip(bests) {
            let Some(time_ms) = *best else { continue };
            if holder.as_ref().is_none_or(|h| time_ms < h.time_ms) {
                holder = Some(Record { entry_id: entry.identity.id.clone(), time_ms });
            }
        }
        holder
    }

    fn entry_mut(&mut self, id: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.identity.id == id)
    }

    /// Rewrite gap to leader and interval for every entry. `jitter(max)` draws
    /// the extra same-lap gap in `0..=max`.
    fn recompute_gaps(&mut self, mut jitter: impl FnMut(u32) -> u32) {
        let Some(leader_laps) = self.entries.first().map(|e| e.completed_laps) else {
            return;
        };

        let max_jitter = self.config.gap_jitter_ms;
        let gap_step = self.config.gap_step_ms;
        let mut ahead: Option<(u32, u32)> = None;

        for (index, entry) in self.entries.iter_mut().enumerate() {
            let behind_ms = if index == 0 {
                0
            } else {
                (index as u32).saturating_mul(gap_step).saturating_add(jitter(max_jitter))
            };
            // Strictly increasing down the order, so intervals are never negative.
            let behind_ms = match ahead {
                Some((_, ahead_ms)) if behind_ms <= ahead_ms && index > 0 => {
                    ahead_ms.saturating_add(1)
                },
                _ => behind_ms,
            };

            let laps = entry.completed_laps;
            entry.gap_to_leader = Gap::laps(leader_laps.saturating_sub(laps))
                .unwrap_or(Gap::TimeGap { milliseconds: behind_ms });
            entry.interval = match ahead {
                None => Gap::ZERO,
                Some((ahead_laps, ahead_ms)) => Gap::laps(ahead_laps.saturating_sub(laps))
                    .unwrap_or(Gap::TimeGap { milliseconds: behind_ms.saturating_sub(ahead_ms) }),
            };

            ahead = Some((laps, behind_ms));
        }
    }
}

/// Classification of a fresh time against the entry's prior best.
fn classify(time_ms: u32, prior_best: Option<u32>) -> Timing {
    let state = match prior_best {
        Some(best) if time_ms >= best => TimingState::Neutral,
        _ => TimingState::PersonalBest,
    };
    Timing { time_ms, state }
}

fn demote(timing: &mut Option<Timing>) {
    if let Some(t) = timing.as_mut()
        && t.state == TimingState::OverallBest
    {
        t.state = TimingState::PersonalBest;
    }
}

fn promote(timing: &mut Option<Timing>, record_ms: u32) {
    if let Some(t) = timing.as_mut()
        && t.time_ms == record_ms
        && t.state == TimingState::PersonalBest
    {
        t.state = TimingState::OverallBest;
    }
}

fn probability(p: f64) -> f64 {
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
}

fn clamp_ms(ms: i64) -> u32 {
    ms.clamp(1, i64::from(u32::MAX)) as u32
}
