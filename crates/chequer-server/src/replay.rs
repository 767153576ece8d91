//! Replay service: one independent playback per connection.
//!
//! The race log and lap index are loaded once and shared. Each connection gets
//! its own [`ReplayCursor`], so viewers attaching at different times each see
//! the log from the start. Playback for a connection stops when the log ends,
//! when its outbound queue closes, or when the server shuts down.

use std::{path::Path, sync::Arc};

use chequer_core::{Environment, LapIndex, ReplayConfig, ReplayCursor};
use chequer_proto::{LapsFile, RaceLog};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{error::ServerError, sink::Frame};

/// How a playback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayEnd {
    /// Every event was sent.
    Finished,
    /// The connection went away first.
    Disconnected,
    /// The server shut down first.
    Cancelled,
}

/// Shared replay source.
#[derive(Debug, Clone)]
pub struct ReplayService {
    log: Arc<RaceLog>,
    laps: Arc<LapIndex>,
    config: ReplayConfig,
}

impl ReplayService {
    /// Service over an already loaded log.
    ///
    /// # Errors
    ///
    /// - `ServerError::Protocol` if the log is empty, does not start with
    ///   `RaceStart`, or is out of order
    pub fn new(log: RaceLog, laps: LapIndex, config: ReplayConfig) -> Result<Self, ServerError> {
        log.validate()?;
        Ok(Self { log: Arc::new(log), laps: Arc::new(laps), config })
    }

    /// Load the race log and optional laps file from disk.
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` if a file cannot be read
    /// - `ServerError::Protocol` if a file cannot be decoded or the log is
    ///   invalid
    pub fn load(
        file: &Path,
        laps_file: Option<&Path>,
        config: ReplayConfig,
    ) -> Result<Self, ServerError> {
        let log = RaceLog::from_json(&read(file)?)?;

        let laps = match laps_file {
            Some(path) => LapIndex::new(LapsFile::from_json(&read(path)?)?),
            None => LapIndex::default(),
        };

        tracing::info!(
            race = %log.name,
            events = log.timeline_events.len(),
            grid = log.starting_grid.len(),
            laps = laps.len(),
            "race log loaded"
        );

        Self::new(log, laps, config)
    }

    /// Race name from the log.
    pub fn race_name(&self) -> &str {
        &self.log.name
    }

    /// Number of events in the log.
    pub fn event_count(&self) -> usize {
        self.log.timeline_events.len()
    }

    /// Fresh cursor at the start of the log.
    ///
    /// # Errors
    ///
    /// Never fails for a service built through [`ReplayService::new`], which
    /// validates the log up front.
    pub fn cursor(&self) -> Result<ReplayCursor, ServerError> {
        Ok(ReplayCursor::new(Arc::clone(&self.log), Arc::clone(&self.laps), self.config)?)
    }

    /// Play the log into `outbound` at the configured speed.
    ///
    /// # Errors
    ///
    /// - `ServerError::Protocol` if a message cannot be encoded
    pub async fn play<E: Environment>(
        &self,
        env: &E,
        outbound: mpsc::Sender<Frame>,
        cancel: CancellationToken,
    ) -> Result<ReplayEnd, ServerError> {
        let mut cursor = self.cursor()?;

        while let Some(delay) = cursor.next_delay() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(ReplayEnd::Cancelled),
                () = outbound.closed() => {
                    tracing::debug!(position = cursor.position(), "viewer left mid-replay");
                    return Ok(ReplayEnd::Disconnected);
                },
                () = env.sleep(delay) => {},
            }

            let Some(message) = cursor.advance(env.wall_clock_ms()) else { break };
            let frame: Frame = message.to_json()?.into();
            if outbound.send(frame).await.is_err() {
                tracing::debug!(position = cursor.position(), "viewer left mid-replay");
                return Ok(ReplayEnd::Disconnected);
            }
        }

        tracing::info!(race = %self.log.name, events = cursor.len(), "replay finished");
        Ok(ReplayEnd::Finished)
    }
}

fn read(path: &Path) -> Result<String, ServerError> {
    std::fs::read_to_string(path)
        .map_err(|e| ServerError::Config(format!("cannot read {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use chequer_core::SystemEnv;
    use chequer_proto::{CarEvent, RaceEvent, StreamMessage, TimelineEvent};

    use super::*;

    fn service(times: &[u64]) -> ReplayService {
        let mut events = vec![TimelineEvent::new(0, RaceEvent::RaceStart)];
        for (lap, t) in times.iter().enumerate() {
            events.push(TimelineEvent::new(
                *t,
                RaceEvent::CarEvent("7".into(), CarEvent::LapCompleted(lap as u32 + 1)),
            ));
        }
        let log =
            RaceLog { name: "Test".into(), starting_grid: Vec::new(), timeline_events: events };
        ReplayService::new(log, LapIndex::default(), ReplayConfig::new(10.0).unwrap()).unwrap()
    }

    #[test]
    fn rejects_invalid_log() {
        let log = RaceLog {
            name: "Empty".into(),
            starting_grid: Vec::new(),
            timeline_events: Vec::new(),
        };
        let result = ReplayService::new(log, LapIndex::default(), ReplayConfig::default());
        assert!(matches!(result, Err(ServerError::Protocol(_))));
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let result =
            ReplayService::load(Path::new("/nonexistent/race.json"), None, ReplayConfig::default());
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn plays_every_event_once_then_finishes() {
        let service = service(&[5_000, 12_000]);
        let (tx, mut rx) = mpsc::channel(16);

        let end = service.play(&SystemEnv::new(), tx, CancellationToken::new()).await.unwrap();
        assert_eq!(end, ReplayEnd::Finished);

        let mut times = Vec::new();
        while let Some(frame) = rx.recv().await {
            times.push(StreamMessage::from_json(&frame).unwrap().race_time);
        }
        assert_eq!(times, vec![0, 5_000, 12_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn viewer_leaving_stops_its_playback() {
        let service = service(&[5_000, 12_000, 20_000]);
        let (tx, mut rx) = mpsc::channel(16);

        let play = tokio::spawn({
            let service = service.clone();
            async move { service.play(&SystemEnv::new(), tx, CancellationToken::new()).await }
        });

        rx.recv().await.unwrap();
        drop(rx);

        assert_eq!(play.await.unwrap().unwrap(), ReplayEnd::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_playback() {
        let service = service(&[5_000]);
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let end = service.play(&SystemEnv::new(), tx, cancel).await.unwrap();
        assert_eq!(end, ReplayEnd::Cancelled);
    }
}
