//! Standard race invariants.

use std::collections::HashMap;

use chequer_proto::{Entry, Gap, Timing, TimingState};

use super::{Invariant, InvariantResult, TickObservation, Violation};

/// Positions are `1..=N` in snapshot order, and class positions are `1..=k`
/// within each class in snapshot order.
pub struct DenseRanking;

impl Invariant for DenseRanking {
    fn name(&self) -> &'static str {
        "DenseRanking"
    }

    fn check(&self, state: &TickObservation) -> InvariantResult {
        let mut class_counts: HashMap<&str, u32> = HashMap::new();

        for (i, entry) in state.current.entries.iter().enumerate() {
            let expected = i as u32 + 1;
            if entry.position != expected {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "car {} at index {} has position {}",
                        entry.car_number(),
                        i,
                        entry.position
                    ),
                });
            }

            let count = class_counts.entry(entry.class()).or_insert(0);
            *count += 1;
            if entry.position_in_class != *count {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "car {} is {} in class {} but has class position {}",
                        entry.car_number(),
                        count,
                        entry.class(),
                        entry.position_in_class
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Completed laps per car and the global lap counter never decrease.
pub struct LapsMonotonic;

impl Invariant for LapsMonotonic {
    fn name(&self) -> &'static str {
        "LapsMonotonic"
    }

    fn check(&self, state: &TickObservation) -> InvariantResult {
        if let Some(previous) = &state.previous
            && state.current.lap < previous.lap
        {
            return Err(Violation {
                invariant: self.name(),
                message: format!("lap counter decreased {} → {}", previous.lap, state.current.lap),
            });
        }

        for (before, after) in state.entry_pairs() {
            if after.completed_laps < before.completed_laps {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "car {}: completed laps decreased {} → {}",
                        after.car_number(),
                        before.completed_laps,
                        after.completed_laps
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Pit stop counts never decrease and grow by at most one per tick.
pub struct PitCountMonotonic;

impl Invariant for PitCountMonotonic {
    fn name(&self) -> &'static str {
        "PitCountMonotonic"
    }

    fn check(&self, state: &TickObservation) -> InvariantResult {
        for (before, after) in state.entry_pairs() {
            let (was, now) = (before.pit.stop_count, after.pit.stop_count);
            if now < was || now > was + 1 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("car {}: pit stops {} → {}", after.car_number(), was, now),
                });
            }
            if now == was + 1 && (!after.pit.in_pit || after.stint_laps != 0) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "car {}: new stop without pit entry (in_pit={}, stint={})",
                        after.car_number(),
                        after.pit.in_pit,
                        after.stint_laps
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Best lap never gets slower, and once set is never cleared.
pub struct BestLapNonIncreasing;

impl Invariant for BestLapNonIncreasing {
    fn name(&self) -> &'static str {
        "BestLapNonIncreasing"
    }

    fn check(&self, state: &TickObservation) -> InvariantResult {
        for (before, after) in state.entry_pairs() {
            let Some(was) = before.best_lap_ms() else { continue };
            match after.best_lap_ms() {
                Some(now) if now <= was => {},
                now => {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "car {}: best lap {} → {:?}",
                            after.car_number(),
                            was,
                            now
                        ),
                    });
                },
            }
        }
        Ok(())
    }
}

/// At most one entry shows `OverallBest` per metric, and it shows the session
/// minimum.
///
/// Metrics are the lap (best and last lap fields) and each of the three
/// sectors.
pub struct SingleOverallBest;

impl SingleOverallBest {
    fn check_metric<'a>(
        &self,
        metric: &str,
        entries: &'a [Entry],
        shown: impl Fn(&'a Entry) -> Vec<Timing>,
        best: impl Fn(&'a Entry) -> Option<u32>,
    ) -> InvariantResult {
        let holders: Vec<(&Entry, u32)> = entries
            .iter()
            .filter_map(|e| {
                shown(e)
                    .into_iter()
                    .find(|t| t.state == TimingState::OverallBest)
                    .map(|t| (e, t.time_ms))
            })
            .collect();

        if holders.len() > 1 {
            let cars: Vec<_> = holders.iter().map(|(e, _)| e.car_number()).collect();
            return Err(Violation {
                invariant: self.name(),
                message: format!("{metric}: several OverallBest holders {cars:?}"),
            });
        }

        if let Some((holder, time_ms)) = holders.first() {
            let minimum = entries.iter().filter_map(&best).min();
            if minimum != Some(*time_ms) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{metric}: car {} shows {} as OverallBest but minimum is {:?}",
                        holder.car_number(),
                        time_ms,
                        minimum
                    ),
                });
            }
        }
        Ok(())
    }
}

impl Invariant for SingleOverallBest {
    fn name(&self) -> &'static str {
        "SingleOverallBest"
    }

    fn check(&self, state: &TickObservation) -> InvariantResult {
        let entries = &state.current.entries;

        self.check_metric(
            "lap",
            entries,
            |e| e.best_lap.into_iter().chain(e.last_lap).collect(),
            Entry::best_lap_ms,
        )?;

        for sector in 0..3 {
            self.check_metric(
                &format!("sector {}", sector + 1),
                entries,
                move |e| e.sectors[sector].into_iter().collect(),
                move |e| e.best_sectors_ms[sector],
            )?;
        }
        Ok(())
    }
}

/// Gap fields agree with lap counts.
///
/// The leader's gap is the zero time gap; a `Laps` gap matches the actual lap
/// deficit; a `TimeGap` only appears between cars on the same lap.
pub struct GapVariantValid;

impl GapVariantValid {
    fn check_gap(
        &self,
        entry: &Entry,
        reference_laps: u32,
        gap: Gap,
        what: &str,
    ) -> InvariantResult {
        let deficit = reference_laps.saturating_sub(entry.completed_laps);
        let ok = match gap {
            Gap::Laps { lap_difference } => lap_difference.get() == deficit,
            Gap::TimeGap { .. } => deficit == 0,
        };
        if ok {
            Ok(())
        } else {
            Err(Violation {
                invariant: self.name(),
                message: format!(
                    "car {}: {} {:?} but lap deficit is {}",
                    entry.car_number(),
                    what,
                    gap,
                    deficit
                ),
            })
        }
    }
}

impl Invariant for GapVariantValid {
    fn name(&self) -> &'static str {
        "GapVariantValid"
    }

    fn check(&self, state: &TickObservation) -> InvariantResult {
        let entries = &state.current.entries;
        let Some(leader) = entries.first() else { return Ok(()) };

        if leader.gap_to_leader != Gap::ZERO {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "leader {} has gap {:?}",
                    leader.car_number(),
                    leader.gap_to_leader
                ),
            });
        }

        for pair in entries.windows(2) {
            let (ahead, entry) = (&pair[0], &pair[1]);
            self.check_gap(entry, leader.completed_laps, entry.gap_to_leader, "gap")?;
            self.check_gap(entry, ahead.completed_laps, entry.interval, "interval")?;
        }
        Ok(())
    }
}
