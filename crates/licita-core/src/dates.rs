//! Date handling: upstream reshaping, lenient parsing and the registry clock.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d-%m-%Y %H:%M:%S"];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d-%m-%Y"];

/// Canonical text form of a dataset date.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Largest serial a spreadsheet accepts (9999-12-31).
const MAX_SHEET_SERIAL: f64 = 2_958_465.0;

/// Markers spreadsheets and exports use for "no value".
const NULL_MARKERS: [&str; 4] = ["nan", "null", "none", "nat"];

/// Reshapes an upstream ISO date-time into the dataset's canonical form by
/// swapping the `T` separator for a space. No parsing happens here.
pub fn dates_iso(raw: Option<&str>) -> String {
    match raw {
        Some(s) if !s.is_empty() => s.replace('T', " "),
        _ => String::new(),
    }
}

/// Parses a closing date in any of the formats found in the dataset.
///
/// Only the first 19 characters of the trimmed input are considered, so
/// fractional seconds and offsets are ignored. Date-only values resolve to
/// midnight. Unparsable input is a legitimate "unknown", not an error.
///
/// ```
/// use licita_core::dates::normalize;
///
/// assert!(normalize("").is_none());
/// assert_eq!(normalize("2024-01-15"), normalize("15-01-2024"));
/// ```
pub fn normalize(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || NULL_MARKERS.iter().any(|m| trimmed.eq_ignore_ascii_case(m)) {
        return None;
    }

    let head = match trimmed.char_indices().nth(19) {
        Some((idx, _)) => &trimmed[..idx],
        None => trimmed,
    };

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(head, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(head, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Wall-clock time in the registry's timezone with the offset dropped.
///
/// Dataset dates carry no zone; comparing against this keeps expiry on the
/// registry's calendar wherever the process runs.
pub fn registry_now(tz: Tz) -> NaiveDateTime {
    local_naive(Utc::now(), tz)
}

/// Converts an instant to naive local time in `tz`.
pub fn local_naive(instant: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    tz.from_utc_datetime(&instant.naive_utc()).naive_local()
}

/// `ddmmyyyy` as expected by the listing-by-date endpoint.
pub fn listing_date_param(date: NaiveDate) -> String {
    date.format("%d%m%Y").to_string()
}

/// Converts a spreadsheet date serial: whole days since 1899-12-30, the
/// fraction being the time of day. Rounded to the second.
///
/// ```
/// use licita_core::dates::{format_canonical, from_sheet_serial};
///
/// let noon = from_sheet_serial(43831.5).unwrap();
/// assert_eq!(format_canonical(noon), "2020-01-01 12:00:00");
/// ```
pub fn from_sheet_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(0.0..MAX_SHEET_SERIAL + 1.0).contains(&serial) {
        return None;
    }
    let secs = (serial * 86_400.0).round() as i64;
    NaiveDate::from_ymd_opt(1899, 12, 30)?
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(TimeDelta::try_seconds(secs)?)
}

pub fn format_canonical(value: NaiveDateTime) -> String {
    value.format(CANONICAL_FORMAT).to_string()
}
