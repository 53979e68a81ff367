//! Lenient timestamp parsing for hand-written values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// `Wed May 01 2024 12:00:00 GMT+0000`, the JavaScript `Date` string form
/// found in older history files once its `(zone name)` suffix is removed.
const JS_DATE_FORMAT: &str = "%a %b %d %Y %H:%M:%S GMT%z";

/// Parse RFC 3339, RFC 2822, a JavaScript `Date` string, a naive date-time
/// (taken as UTC) or a bare date (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(value) {
        return Some(ts.with_timezone(&Utc));
    }
    let js = value.split(" (").next().unwrap_or(value);
    if let Ok(ts) = DateTime::parse_from_str(js, JS_DATE_FORMAT) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
