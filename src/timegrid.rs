use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use thiserror::Error;

use crate::constants::GRID_INTERVAL_HOURS;

const STAMP_FORMAT: &str = "%Y%m%d%H";
const OFFSET_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M%#z",
    "%Y-%m-%d %H:%M%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y%m%dT%H%M%S%#z",
    "%Y%m%dT%H%M%#z",
];
const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y%m%dT%H%M%S",
    "%Y%m%dT%H%M",
];

#[derive(Debug, Error)]
#[error("invalid timestamp: {0:?}")]
pub struct InvalidTimestamp(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridTimestamp(DateTime<Utc>);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp(String);

impl GridTimestamp {
    pub fn floor(timestamp: DateTime<Utc>) -> Self {
        floor_to_interval(timestamp, GRID_INTERVAL_HOURS)
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn run_hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn stamp(&self) -> Stamp {
        to_stamp(*self)
    }

    pub fn previous(&self) -> Self {
        self.shifted(-1)
    }

    pub fn next(&self) -> Self {
        self.shifted(1)
    }

    pub fn shifted(&self, steps: i64) -> Self {
        Self::floor(self.0 + Duration::hours(steps * GRID_INTERVAL_HOURS as i64))
    }
}

impl fmt::Display for GridTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl Stamp {
    pub fn parse(text: &str) -> Option<Self> {
        grid_timestamp_from_stamp(text).map(to_stamp)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn floor_to_interval(timestamp: DateTime<Utc>, interval_hours: u32) -> GridTimestamp {
    let interval = interval_hours.max(1);
    let hour = (timestamp.hour() / interval) * interval;
    let floored = timestamp
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(timestamp);
    GridTimestamp(floored)
}

pub fn to_stamp(grid: GridTimestamp) -> Stamp {
    Stamp(grid.0.format(STAMP_FORMAT).to_string())
}

pub fn grid_timestamp_from_stamp(text: &str) -> Option<GridTimestamp> {
    if text.len() != 10 || !text.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(&format!("{text}0000"), "%Y%m%d%H%M%S").ok()?;
    let grid = GridTimestamp::floor(naive.and_utc());
    (grid.0 == naive.and_utc()).then_some(grid)
}

pub fn parse_time_iso(text: &str) -> Result<DateTime<Utc>, InvalidTimestamp> {
    parse_any_iso(text.trim())
        .filter(|parsed| (1..=9999).contains(&parsed.year()))
        .ok_or_else(|| InvalidTimestamp(text.to_string()))
}

fn parse_any_iso(trimmed: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    // chrono needs minutes, so `2024-03-18T12Z` is read as `2024-03-18T12:00Z`
    let expanded = expand_hour_only(trimmed);
    let text = expanded.as_deref().unwrap_or(trimmed);

    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(text, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    ["%Y-%m-%d", "%Y%m%d"].iter().find_map(|format| {
        NaiveDate::parse_from_str(text, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    })
}

fn expand_hour_only(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    if bytes.len() < 13 || !matches!(bytes[10], b'T' | b' ') {
        return None;
    }
    if !bytes[11].is_ascii_digit() || !bytes[12].is_ascii_digit() {
        return None;
    }
    match bytes.get(13) {
        None | Some(b'Z' | b'z' | b'+' | b'-') => {
            Some(format!("{}:00{}", &text[..13], &text[13..]))
        }
        Some(_) => None,
    }
}
