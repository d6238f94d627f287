//! Filename timestamp parsing
//!
//! Recorders name clips like `CamA_2024-01-02T03.04.05.mp4` or
//! `CamB20240102030405.mp4`. The parser pulls the camera label and the
//! wall-clock start time out of the file stem and pins it to a timezone.

use chrono::{
    DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeDelta, TimeZone,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::error::ScanError;

/// Label used when nothing precedes the timestamp
pub const DEFAULT_CAMERA_LABEL: &str = "Camera";

/// Date and time with optional `.`/`-` separators, joined by `T`, `_`, `-` or space
static SEPARATED_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<date>[0-9]{4}[.-]?[0-9]{2}[.-]?[0-9]{2})[T_\- ]?(?P<time>[0-9]{2}[.-]?[0-9]{2}[.-]?[0-9]{2})",
    )
    .expect("separated timestamp pattern is valid")
});

/// Bare `YYYYMMDDhhmmss`
static COMPACT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<date>[0-9]{8})(?P<time>[0-9]{6})").expect("compact timestamp pattern is valid")
});

/// Patterns in priority order, first accepted match wins
static TIMESTAMP_PATTERNS: Lazy<[&'static Regex; 2]> =
    Lazy::new(|| [&*SEPARATED_PATTERN, &*COMPACT_PATTERN]);

/// Camera label and start time recovered from a file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameParseResult {
    /// Text preceding the timestamp
    pub camera_label: String,
    /// Start time in the requested zone
    pub timestamp: DateTime<FixedOffset>,
}

/// Resolve an IANA timezone name
pub fn parse_timezone(name: &str) -> Result<Tz, ScanError> {
    name.parse::<Tz>()
        .map_err(|e| ScanError::invalid_timezone(name, e))
}

/// Parse a file name (no directory) into camera label and start time
///
/// Returns `None` when no pattern yields a valid timestamp.
pub fn parse_timestamp_from_name(file_name: &str, tz: &Tz) -> Option<FilenameParseResult> {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    TIMESTAMP_PATTERNS.iter().find_map(|pattern| {
        let (naive, start) = match_timestamp(pattern, stem)?;
        Some(FilenameParseResult {
            camera_label: extract_camera_label(stem, start),
            timestamp: attach_timezone(&naive, tz),
        })
    })
}

/// Try one pattern against the stem; yields the wall-clock time and match offset
fn match_timestamp(pattern: &Regex, stem: &str) -> Option<(NaiveDateTime, usize)> {
    let caps = pattern.captures(stem)?;
    let whole = caps.get(0)?;
    let digits: String = [caps.name("date")?, caps.name("time")?]
        .iter()
        .flat_map(|m| m.as_str().chars())
        .filter(|c| c.is_ascii_digit())
        .collect();
    if digits.len() != 14 {
        return None;
    }
    Some((digits_to_datetime(&digits)?, whole.start()))
}

/// `YYYYMMDDhhmmss` to a naive datetime, rejecting impossible dates
fn digits_to_datetime(digits: &str) -> Option<NaiveDateTime> {
    let field = |range: std::ops::Range<usize>| digits.get(range)?.parse::<u32>().ok();
    let year = i32::try_from(field(0..4)?).ok()?;
    NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?.and_hms_opt(
        field(8..10)?,
        field(10..12)?,
        field(12..14)?,
    )
}

fn extract_camera_label(stem: &str, match_start: usize) -> String {
    let label = stem[..match_start]
        .trim_end_matches(['_', '-'])
        .trim();
    if label.is_empty() {
        DEFAULT_CAMERA_LABEL.to_string()
    } else {
        label.to_string()
    }
}

/// Interpret a wall-clock value as local time in `tz`
///
/// Ambiguous times (clocks going back) resolve to the earlier instant. Times
/// inside a spring-forward gap keep the offset in effect before the jump.
pub fn attach_timezone(naive: &NaiveDateTime, tz: &Tz) -> DateTime<FixedOffset> {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(dt) => dt.fixed_offset(),
        LocalResult::Ambiguous(earliest, _) => earliest.fixed_offset(),
        LocalResult::None => {
            let before_gap = naive
                .checked_sub_signed(TimeDelta::days(1))
                .unwrap_or(*naive);
            let offset = tz.offset_from_utc_datetime(&before_gap).fix();
            let utc = *naive - TimeDelta::seconds(i64::from(offset.local_minus_utc()));
            offset.from_utc_datetime(&utc)
        }
    }
}

/// Bring a user-supplied moment into `tz`
///
/// Values without an offset are read as local time in `tz`; values with an
/// explicit offset are converted.
pub fn to_timezone(value: &str, tz: &Tz) -> Option<DateTime<FixedOffset>> {
    if let Ok(aware) = DateTime::parse_from_rfc3339(value) {
        return Some(aware.with_timezone(tz).fixed_offset());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| attach_timezone(&naive, tz))
}
