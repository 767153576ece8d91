//! Replay engine against recorded race logs.

use std::{sync::Arc, time::Duration};

use chequer_core::{LapIndex, ReplayConfig, ReplayCursor};
use chequer_proto::{CarStatus, LapsFile, MessageBody, RaceLog};
use serde_json::json;

fn race_log() -> RaceLog {
    let text = json!({
        "name": "6 Hours of Spa",
        "startingGrid": [
            {"car": {"carNumber": "7", "team": "Toyota Gazoo Racing", "class": "HYPERCAR",
                     "drivers": [{"name": "Kamui KOBAYASHI", "is_current_driver": true}]}},
            {"car": {"carNumber": "51", "class": "HYPERCAR", "drivers": []}}
        ],
        "timelineEvents": [
            {"event_time": "0.000", "event_type": "RaceStart"},
            {"event_time": "1:50.000", "event_type": {"CarEvent": ["7", {"LapCompleted": 1}]}},
            {"event_time": "1:51.200", "event_type": {"CarEvent": ["51", "PitIn"]}},
            {"event_time": "1:52.000", "event_type": {"SafetyCar": "Deployed"}},
            {"event_time": "3:40.000", "event_type": {"CarEvent": ["7", {"LapCompleted": 2}]}},
            {"event_time": "5:30.000", "event_type": {"CarEvent": ["7", {"LapCompleted": 3}]}},
            {"event_time": "5:31.000", "event_type": {"CarEvent": ["51", "Retirement"]}}
        ]
    })
    .to_string();
    RaceLog::from_json(&text).unwrap()
}

fn laps() -> LapIndex {
    let text = json!({"laps": [
        {"carNumber": "7", "lapNumber": 2, "lapTime": "1:49.812",
         "s1": "32.100", "s2": "41.512", "s3": "36.200"}
    ]})
    .to_string();
    LapIndex::new(LapsFile::from_json(&text).unwrap())
}

fn cursor(speed: f64) -> ReplayCursor {
    ReplayCursor::new(Arc::new(race_log()), Arc::new(laps()), ReplayConfig::new(speed).unwrap())
        .unwrap()
}

#[test]
fn car_seven_sees_exactly_three_lap_increments() {
    let mut cursor = cursor(10.0);
    let mut seven_laps = Vec::new();
    let mut other_lap_updates = 0;

    while let Some(message) = cursor.advance(0) {
        let MessageBody::UpdatedCars(updates) = message.body else { continue };
        for update in updates {
            match (update.car_number.as_str(), update.completed_laps) {
                ("7", Some(lap)) => seven_laps.push(lap),
                (_, Some(_)) => other_lap_updates += 1,
                _ => {},
            }
        }
    }

    assert_eq!(seven_laps, vec![1, 2, 3]);
    assert_eq!(other_lap_updates, 0);
}

#[test]
fn every_event_is_forwarded_once_in_order() {
    let mut cursor = cursor(10.0);
    let mut race_times = Vec::new();

    while let Some(message) = cursor.advance(0) {
        assert_eq!(message.new_events.len(), 1);
        race_times.push(message.race_time);
    }

    assert_eq!(race_times, vec![0, 110_000, 111_200, 112_000, 220_000, 330_000, 331_000]);
}

#[test]
fn unknown_event_is_forwarded_without_updates() {
    let mut cursor = cursor(10.0);
    for _ in 0..3 {
        cursor.advance(0);
    }

    let message = cursor.advance(0).unwrap();
    assert_eq!(message.body, MessageBody::UpdatedCars(Vec::new()));
    assert!(!message.new_events[0].is_race_start());
}

#[test]
fn lap_file_times_enrich_the_matching_lap() {
    let mut cursor = cursor(10.0);
    for _ in 0..4 {
        cursor.advance(0);
    }

    let MessageBody::UpdatedCars(updates) = cursor.advance(0).unwrap().body else {
        panic!("expected deltas");
    };
    assert_eq!(updates[0].completed_laps, Some(2));
    assert_eq!(updates[0].last_lap_ms, Some(109_812));
    assert_eq!(updates[0].sector2_ms, Some(41_512));
}

#[test]
fn retirement_sets_status() {
    let mut cursor = cursor(10.0);
    let mut last = None;
    while let Some(message) = cursor.advance(0) {
        last = Some(message);
    }

    let MessageBody::UpdatedCars(updates) = last.unwrap().body else { panic!("expected deltas") };
    assert_eq!(updates[0].car_number, "51");
    assert_eq!(updates[0].status, Some(CarStatus::Retired));
}

#[tokio::test(start_paused = true)]
async fn paced_playback_matches_scaled_race_time() {
    let mut cursor = cursor(100.0);
    let start = tokio::time::Instant::now();
    let mut sent_at = Vec::new();

    while let Some(delay) = cursor.next_delay() {
        tokio::time::sleep(delay).await;
        let elapsed = start.elapsed();
        cursor.advance(elapsed.as_millis() as u64);
        sent_at.push(elapsed);
    }

    // 110s / 100 = 1.1s, then 1.2s / 100 clamps to the 100ms floor, and so on.
    let expected: Vec<Duration> = [0, 1_100, 1_200, 1_300, 2_380, 3_480, 3_580]
        .into_iter()
        .map(Duration::from_millis)
        .collect();
    assert_eq!(sent_at, expected);
}
