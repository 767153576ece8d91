//! Race-clock durations.
//!
//! Timing values travel as milliseconds internally and as race-clock strings
//! in logs and envelopes: `S.mmm` under a minute, `M:SS.mmm` under an hour,
//! `H:MM:SS.mmm` beyond that. Parsing accepts any of the three shapes with a
//! fractional part of up to three digits.

use crate::error::{ProtocolError, Result};

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;

/// Format a millisecond duration as a race-clock string.
///
/// ```
/// use chequer_proto::duration::format;
///
/// assert_eq!(format(4_321), "4.321");
/// assert_eq!(format(95_365), "1:35.365");
/// assert_eq!(format(25_614_321), "7:06:54.321");
/// ```
pub fn format(ms: u64) -> String {
    let millis = ms % MS_PER_SECOND;
    let total_seconds = ms / MS_PER_SECOND;

    if ms < MS_PER_MINUTE {
        format!("{total_seconds}.{millis:03}")
    } else if ms < MS_PER_HOUR {
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        format!("{minutes}:{seconds:02}.{millis:03}")
    } else {
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;
        format!("{hours}:{minutes:02}:{seconds:02}.{millis:03}")
    }
}

/// Parse a race-clock string into milliseconds.
///
/// # Errors
///
/// - `ProtocolError::InvalidClock` if the string is empty, has more than three
///   colon-separated fields, or any field is not a non-negative number
pub fn parse(s: &str) -> Result<u64> {
    let invalid = || ProtocolError::InvalidClock(s.to_string());
    let fields: Vec<&str> = s.trim().split(':').collect();

    let (hours, minutes, seconds) = match fields.as_slice() {
        [h, m, sec] => (parse_whole(h), parse_whole(m), *sec),
        [m, sec] => (Some(0), parse_whole(m), *sec),
        [sec] => (Some(0), Some(0), *sec),
        _ => return Err(invalid()),
    };

    let hours = hours.ok_or_else(invalid)?;
    let minutes = minutes.ok_or_else(invalid)?;
    let seconds_ms = parse_seconds(seconds).ok_or_else(invalid)?;

    hours
        .checked_mul(MS_PER_HOUR)
        .and_then(|h| minutes.checked_mul(MS_PER_MINUTE).map(|m| (h, m)))
        .and_then(|(h, m)| h.checked_add(m))
        .and_then(|hm| hm.checked_add(seconds_ms))
        .ok_or_else(invalid)
}

fn parse_whole(field: &str) -> Option<u64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

/// Seconds with an optional fraction, e.g. `54`, `54.3`, `54.321`.
fn parse_seconds(field: &str) -> Option<u64> {
    let (whole, frac) = match field.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (field, ""),
    };

    let whole = parse_whole(whole)?;
    if frac.len() > 3 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut millis = 0u64;
    for (i, digit) in frac.bytes().enumerate() {
        let scale = 10u64.pow(2 - i as u32);
        millis += u64::from(digit - b'0') * scale;
    }

    whole.checked_mul(MS_PER_SECOND)?.checked_add(millis)
}

/// Serde adapter for millisecond fields that travel as race-clock strings.
///
/// Deserialization also accepts a bare integer millisecond count.
pub mod race_clock {
    use serde::{Deserialize, Deserializer, Serializer, de};

    /// Serialize milliseconds as a race-clock string.
    pub fn serialize<S: Serializer>(ms: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(*ms))
    }

    /// Deserialize a race-clock string or an integer millisecond count.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Clock {
            Millis(u64),
            Text(String),
        }

        match Clock::deserialize(deserializer)? {
            Clock::Millis(ms) => Ok(ms),
            Clock::Text(text) => super::parse(&text).map_err(de::Error::custom),
        }
    }
}

/// Serde adapter for optional race-clock fields where an empty string means
/// "no value".
pub mod optional_race_clock {
    use serde::{Deserialize, Deserializer, Serializer, de};

    /// Serialize as a race-clock string, or an empty string for `None`.
    pub fn serialize<S: Serializer>(ms: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match ms {
            Some(ms) => serializer.serialize_str(&super::format(*ms)),
            None => serializer.serialize_str(""),
        }
    }

    /// Deserialize a race-clock string, an integer, an empty string, or null.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Clock {
            Millis(u64),
            Text(String),
        }

        match Option::<Clock>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Clock::Millis(ms)) => Ok(Some(ms)),
            Some(Clock::Text(text)) if text.trim().is_empty() => Ok(None),
            Some(Clock::Text(text)) => super::parse(&text).map(Some).map_err(de::Error::custom),
        }
    }
}
