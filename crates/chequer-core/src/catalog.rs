//! Session query interface.
//!
//! Generators never own the list of sessions. Each tick they ask a
//! [`SessionCatalog`] for the session they serve; an unknown id means "skip
//! this tick", which lets a session appear later without restarting anything.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chequer_proto::{
    Driver, DriverCategory, EntryIdentity, FlagType, SectorFlag, SessionClock, Weather,
};

use crate::error::CatalogError;

/// Six hours, the length of a standard endurance round.
pub const SIX_HOURS_MS: u64 = 6 * 60 * 60 * 1000;

/// Starting state of one car.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedEntry {
    /// Fixed identity.
    pub identity: EntryIdentity,
    /// Laps already completed when generation starts.
    pub completed_laps: u32,
}

/// Everything a generator needs to start a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSeed {
    /// Race identifier.
    pub race_id: String,
    /// Entries in starting order.
    pub grid: Vec<SeedEntry>,
    /// Fixed session start and length.
    pub clock: SessionClock,
    /// Ambient conditions.
    pub weather: Weather,
    /// Sector flag overlay.
    pub sector_flags: Vec<SectorFlag>,
}

/// Read access to the sessions a process knows about.
pub trait SessionCatalog: Send + Sync + 'static {
    /// Look up the seed for a session.
    ///
    /// # Errors
    ///
    /// - `CatalogError::NotFound` if no session has this id
    /// - `CatalogError::Unavailable` if the catalog cannot be read
    fn lookup(&self, race_id: &str) -> Result<SessionSeed, CatalogError>;
}

/// In-memory catalog shared between the process setup and generator tasks.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    sessions: Arc<Mutex<HashMap<String, SessionSeed>>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a session.
    pub fn insert(&self, seed: SessionSeed) -> Result<(), CatalogError> {
        let mut sessions =
            self.sessions.lock().map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        sessions.insert(seed.race_id.clone(), seed);
        Ok(())
    }

    /// Remove a session. Returns the seed if it was registered.
    pub fn remove(&self, race_id: &str) -> Result<Option<SessionSeed>, CatalogError> {
        let mut sessions =
            self.sessions.lock().map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        Ok(sessions.remove(race_id))
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().map_or(0, |s| s.len())
    }

    /// True if no session is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionCatalog for MemoryCatalog {
    fn lookup(&self, race_id: &str) -> Result<SessionSeed, CatalogError> {
        let sessions =
            self.sessions.lock().map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        sessions
            .get(race_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound { race_id: race_id.to_string() })
    }
}

impl SessionSeed {
    /// Endurance-style demo field, 3h24m into a six hour race.
    ///
    /// `now_ms` is the wall-clock time the session is being created at; the
    /// session start is placed so that the race clock reads 3:24:15 then.
    pub fn demo(race_id: impl Into<String>, now_ms: u64) -> Self {
        use DriverCategory::{Bronze, Platinum, Silver};

        const ELAPSED_MS: u64 = 12_255_000;

        let grid = [
            ("7", "HYPERCAR", "Toyota Gazoo Racing", ("Kamui", "Kobayashi", "JPN"), Platinum, 58),
            ("51", "HYPERCAR", "Ferrari AF Corse", ("James", "Calado", "GBR"), Platinum, 58),
            ("007", "HYPERCAR", "Aston Martin THOR Team", ("Tom", "Gamble", "GBR"), Platinum, 58),
            ("50", "HYPERCAR", "Ferrari AF Corse", ("Antonio", "Fuoco", "ITA"), Platinum, 58),
            ("6", "HYPERCAR", "Porsche Penske Motorsport", ("Kevin", "Estre", "FRA"), Platinum, 57),
            ("92", "LMGT3", "Manthey 1st Phorm", ("Richard", "Lietz", "AUT"), Platinum, 54),
            ("46", "LMGT3", "Team WRT", ("Valentino", "Rossi", "ITA"), Silver, 54),
            ("33", "LMGT3", "TF Sport", ("Ben", "Keating", "USA"), Bronze, 53),
        ]
        .into_iter()
        .map(|(car, class, team, (first, last, country), category, laps)| SeedEntry {
            identity: EntryIdentity {
                id: format!("entry-{car}"),
                car_number: car.to_string(),
                class: class.to_string(),
                team: team.to_string(),
                driver: Driver {
                    first_name: first.to_string(),
                    last_name: last.to_string(),
                    short_name: Some(last.chars().take(3).collect::<String>().to_uppercase()),
                    country_code: country.to_string(),
                    category: Some(category),
                },
            },
            completed_laps: laps,
        })
        .collect();

        Self {
            race_id: race_id.into(),
            grid,
            clock: SessionClock {
                starts_at_ms: now_ms.saturating_sub(ELAPSED_MS),
                duration_ms: SIX_HOURS_MS,
            },
            weather: Weather::default(),
            sector_flags: (1..=3)
                .map(|sector| SectorFlag { sector, flag: FlagType::Green })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_session_is_not_found() {
        let catalog = MemoryCatalog::new();

        assert_eq!(
            catalog.lookup("qatar"),
            Err(CatalogError::NotFound { race_id: "qatar".to_string() })
        );
    }

    #[test]
    fn session_appears_after_insert_and_disappears_after_remove() {
        let catalog = MemoryCatalog::new();
        catalog.insert(SessionSeed::demo("qatar", 20_000_000)).unwrap();

        let seed = catalog.lookup("qatar").unwrap();
        assert_eq!(seed.grid.len(), 8);
        assert_eq!(seed.clock.elapsed_ms(20_000_000), 12_255_000);

        assert!(catalog.remove("qatar").unwrap().is_some());
        assert!(catalog.is_empty());
        assert!(catalog.lookup("qatar").is_err());
    }

    #[test]
    fn demo_car_numbers_are_unique() {
        let seed = SessionSeed::demo("live", 0);
        let mut numbers: Vec<_> =
            seed.grid.iter().map(|e| e.identity.car_number.as_str()).collect();
        numbers.sort_unstable();
        numbers.dedup();
        assert_eq!(numbers.len(), seed.grid.len());
    }
}
