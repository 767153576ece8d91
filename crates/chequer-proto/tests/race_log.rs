//! Race log and laps file decoding.
//!
//! Covers the shapes produced by the timing export pipeline: race-clock event
//! times, externally tagged event kinds, unknown kinds preserved verbatim, and
//! both laps file layouts.

use chequer_proto::{
    CarEvent, EventType, LapsFile, ProtocolError, RaceEvent, RaceLog, TimelineEvent, duration,
};
use proptest::prelude::*;
use serde_json::json;

fn qatar_log() -> serde_json::Value {
    json!({
        "name": "Qatar 1812km",
        "startingGrid": [
            {"car": {"carNumber": "7", "team": "Toyota Gazoo Racing", "class": "HYPERCAR",
                     "drivers": [{"name": "Kamui KOBAYASHI", "is_current_driver": true}]}},
            {"car": {"carNumber": "51"}}
        ],
        "timelineEvents": [
            {"event_time": "0.000", "event_type": "RaceStart"},
            {"event_time": "1:47.123", "event_type": {"CarEvent": ["7", {"LapCompleted": 1}]}},
            {"event_time": "1:48.500", "event_type": {"CarEvent": ["51", "PitIn"]}},
            {"event_time": "1:49.000",
             "event_type": {"CarEvent": ["51", {"Start": {"currentLap": 2}}]}},
            {"event_time": "9:59:59.999", "event_type": {"CarEvent": ["7", "Checkered"]}}
        ]
    })
}

#[test]
fn decodes_known_event_kinds() {
    let log = RaceLog::from_json(&qatar_log().to_string()).unwrap();

    assert_eq!(log.name, "Qatar 1812km");
    assert_eq!(log.starting_grid.len(), 2);
    assert_eq!(log.starting_grid[1].car.team, None);
    assert_eq!(log.timeline_events.len(), 5);
    assert!(log.timeline_events[0].is_race_start());
    assert_eq!(
        log.timeline_events[1],
        TimelineEvent::new(107_123, RaceEvent::CarEvent("7".into(), CarEvent::LapCompleted(1)))
    );
    assert_eq!(
        log.timeline_events[3].event_type,
        EventType::Known(RaceEvent::CarEvent("51".into(), CarEvent::Start { current_lap: 2 }))
    );
    assert_eq!(log.timeline_events[4].event_time, 35_999_999);
}

#[test]
fn accepts_snake_case_events_key_and_numeric_times() {
    let text = json!({
        "name": "Export",
        "timeline_events": [
            {"event_time": 0, "event_type": "RaceStart"},
            {"event_time": 5000,
             "event_type": {"CarEvent": ["8", {"LapCompleted": [1, {"nextLap": 2}]}]}}
        ]
    })
    .to_string();

    let log = RaceLog::from_json(&text).unwrap();
    assert!(log.starting_grid.is_empty());
    assert_eq!(
        log.timeline_events[1].event_type,
        EventType::Known(RaceEvent::CarEvent("8".into(), CarEvent::LapCompleted(1)))
    );
}

#[test]
fn unknown_event_kind_is_preserved() {
    let raw = json!({"SafetyCarDeployed": {"sector": 2}});
    let text = json!({
        "name": "Unknown",
        "timelineEvents": [
            {"event_time": "0.000", "event_type": "RaceStart"},
            {"event_time": "10.000", "event_type": raw.clone()},
            {"event_time": "11.000", "event_type": {"CarEvent": ["7", "Overtake"]}}
        ]
    })
    .to_string();

    let log = RaceLog::from_json(&text).unwrap();
    assert_eq!(log.timeline_events[1].event_type, EventType::Unknown(raw.clone()));
    assert!(matches!(log.timeline_events[2].event_type, EventType::Unknown(_)));

    let reencoded = serde_json::to_value(&log.timeline_events[1]).unwrap();
    assert_eq!(reencoded, json!({"event_time": "10.000", "event_type": raw}));
}

#[test]
fn rejects_log_without_race_start() {
    let text = json!({
        "name": "No start",
        "timelineEvents": [
            {"event_time": "1.000", "event_type": {"CarEvent": ["7", "PitIn"]}}
        ]
    })
    .to_string();

    assert!(matches!(RaceLog::from_json(&text), Err(ProtocolError::InvalidLog(_))));
}

#[test]
fn rejects_empty_log() {
    let text = json!({"name": "Empty", "timelineEvents": []}).to_string();
    assert!(matches!(RaceLog::from_json(&text), Err(ProtocolError::InvalidLog(_))));
}

#[test]
fn rejects_out_of_order_log() {
    let text = json!({
        "name": "Backwards",
        "timelineEvents": [
            {"event_time": "0.000", "event_type": "RaceStart"},
            {"event_time": "20.000", "event_type": {"CarEvent": ["7", "PitIn"]}},
            {"event_time": "10.000", "event_type": {"CarEvent": ["7", "PitOut"]}}
        ]
    })
    .to_string();

    let err = RaceLog::from_json(&text).unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidLog(_)));
    assert!(!err.is_decode());
}

#[test]
fn malformed_event_time_is_decode_error() {
    let text = json!({
        "name": "Bad clock",
        "timelineEvents": [{"event_time": "soon", "event_type": "RaceStart"}]
    })
    .to_string();

    assert!(RaceLog::from_json(&text).unwrap_err().is_decode());
}

#[test]
fn camel_case_event_keys_are_rejected() {
    let text = json!({
        "name": "Wrong casing",
        "timelineEvents": [{"eventTime": "0.000", "eventType": "RaceStart"}]
    })
    .to_string();

    assert!(RaceLog::from_json(&text).unwrap_err().is_decode());
}

#[test]
fn laps_file_accepts_both_layouts() {
    let record = json!({
        "carNumber": "7", "lapNumber": 3, "lapTime": "1:48.001",
        "s1": "32.100", "s2": "41.200", "s3": "", "kph": 180.2
    });

    let bare = LapsFile::from_json(&json!([record.clone()]).to_string()).unwrap();
    let wrapped = LapsFile::from_json(&json!({"laps": [record]}).to_string()).unwrap();

    assert_eq!(bare, wrapped);
    assert_eq!(bare[0].lap_time, Some(108_001));
    assert_eq!(bare[0].s1, Some(32_100));
    assert_eq!(bare[0].s3, None);
}

#[test]
fn laps_file_rejects_other_shapes() {
    assert!(LapsFile::from_json(r#"{"cars": []}"#).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: formatted race clocks parse back to the same millisecond
    /// count, so event times survive a log rewrite unchanged.
    #[test]
    fn race_clock_text_is_lossless(ms in 0u64..400_000_000) {
        prop_assert_eq!(duration::parse(&duration::format(ms)).unwrap(), ms);
    }

    /// Property: formatted race clocks sort in the same order as their values
    /// when compared after parsing.
    #[test]
    fn race_clock_preserves_order(a in 0u64..400_000_000, b in 0u64..400_000_000) {
        let pa = duration::parse(&duration::format(a)).unwrap();
        let pb = duration::parse(&duration::format(b)).unwrap();
        prop_assert_eq!(a.cmp(&b), pa.cmp(&pb));
    }
}
