//! Request-boundary timestamp handling.
//!
//! Bucket and alignment math runs in UTC throughout. Zoned times are only
//! seen on the way in (CLI and config timestamps) and in time-of-day filters.
//! [`to_rfc3339_millis`] is the string form cache keys are built from.

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;

use crate::errors::TcaError;

/// Parses an offset-qualified RFC-3339 timestamp, e.g. `2024-06-03T08:00:00+01:00`
/// becomes `07:00Z`.
pub fn parse_ts_to_utc(s: &str) -> Result<DateTime<Utc>, TcaError> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TcaError::Validation(format!("bad rfc3339 timestamp {s:?}: {e}")))
}

/// Accepts either RFC-3339 or a plain `YYYY-MM-DD` date (interpreted as 00:00Z).
pub fn parse_date_or_ts_to_utc(s: &str) -> Result<DateTime<Utc>, TcaError> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)));
    }
    parse_ts_to_utc(s)
}

/// `2024-01-05T00:00:00.000Z`; sub-millisecond digits are dropped.
pub fn to_rfc3339_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Wall-clock time of `ts` in the given zone (DST-aware).
pub fn local_time_of_day(ts: DateTime<Utc>, tz: Tz) -> NaiveTime {
    ts.with_timezone(&tz).time()
}
