//! UTC period math shared by the request splitter and the cache loader.
//!
//! Periods are numbered from the Unix epoch. Days are plain second
//! arithmetic, weeks start Monday 00:00Z (week 0 begins 1969-12-29) and
//! months are indexed as `(year - 1970) * 12 + (month - 1)`.
//!
//! All functions assume the input timestamp is UTC. Bucket ids are signed so
//! pre-1970 timestamps map to negative ids instead of wrapping.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

use crate::models::period::ChunkingPeriod;

/// Unix epoch start (1970-01-01T00:00:00Z).
pub const EPOCH_UNIX: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// Number of seconds in a day.
pub const SECS_PER_DAY: i64 = 24 * 60 * 60;
/// Number of seconds in a week.
pub const SECS_PER_WEEK: i64 = 7 * SECS_PER_DAY;

/// shift so Monday 1969-12-29 00:00Z becomes index 0
const WEEK_MONDAY_ANCHOR_OFFSET_SECS: i64 = 3 * SECS_PER_DAY; // +3d

/// Compute the bucket id for a UTC timestamp.
pub fn bucket_id(ts_utc: DateTime<Utc>, period: ChunkingPeriod) -> i64 {
    match period {
        ChunkingPeriod::Day => ts_utc.timestamp().div_euclid(SECS_PER_DAY),
        ChunkingPeriod::Week => {
            (ts_utc.timestamp() + WEEK_MONDAY_ANCHOR_OFFSET_SECS).div_euclid(SECS_PER_WEEK)
        }
        ChunkingPeriod::Month => {
            let y = ts_utc.year() as i64;
            let m = ts_utc.month() as i64; // 1..=12
            (y - 1970) * 12 + (m - 1)
        }
    }
}

/// Get the UTC start instant for a bucket id.
pub fn bucket_start_utc(id: i64, period: ChunkingPeriod) -> DateTime<Utc> {
    match period {
        ChunkingPeriod::Day => EPOCH_UNIX + Duration::seconds(id * SECS_PER_DAY),
        ChunkingPeriod::Week => {
            // convert back to unix seconds, subtract the +3d we added on the way in
            let unix_secs = id * SECS_PER_WEEK - WEEK_MONDAY_ANCHOR_OFFSET_SECS;
            DateTime::from_timestamp(unix_secs, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
        }
        ChunkingPeriod::Month => {
            let y = 1970 + id.div_euclid(12);
            let month = (id.rem_euclid(12) + 1) as u32; // 1..12
            i32::try_from(y)
                .ok()
                .and_then(|y| NaiveDate::from_ymd_opt(y, month, 1))
                .map(|d| d.and_time(NaiveTime::MIN).and_utc())
                // outside chrono's representable range
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        }
    }
}

/// Exclusive end instant for the bucket (start of the next bucket).
pub fn bucket_end_exclusive_utc(id: i64, period: ChunkingPeriod) -> DateTime<Utc> {
    bucket_start_utc(id + 1, period)
}

/// Start of the period containing `ts`.
pub fn period_floor(ts: DateTime<Utc>, period: ChunkingPeriod) -> DateTime<Utc> {
    bucket_start_utc(bucket_id(ts, period), period)
}

/// First period boundary strictly after `ts`.
pub fn next_boundary(ts: DateTime<Utc>, period: ChunkingPeriod) -> DateTime<Utc> {
    bucket_end_exclusive_utc(bucket_id(ts, period), period)
}

/// True when `ts` sits exactly on a period boundary.
pub fn is_boundary(ts: DateTime<Utc>, period: ChunkingPeriod) -> bool {
    period_floor(ts, period) == ts
}

/// Rounds `[start, finish]` out to whole periods: `(floor(start), exclusive end of finish's period)`.
pub fn enclosing_range(
    start: DateTime<Utc>,
    finish: DateTime<Utc>,
    period: ChunkingPeriod,
) -> (DateTime<Utc>, DateTime<Utc>) {
    (period_floor(start, period), next_boundary(finish, period))
}

/// Every period touched by `[start, finish]`, as `(start, exclusive end)` pairs in order.
pub fn periods_covering(
    start: DateTime<Utc>,
    finish: DateTime<Utc>,
    period: ChunkingPeriod,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    if finish < start {
        return Vec::new();
    }
    (bucket_id(start, period)..=bucket_id(finish, period))
        .map(|id| {
            (
                bucket_start_utc(id, period),
                bucket_end_exclusive_utc(id, period),
            )
        })
        .collect()
}

/// Period boundaries lying strictly inside `(start, finish)`, ascending.
pub fn boundaries_within(
    start: DateTime<Utc>,
    finish: DateTime<Utc>,
    period: ChunkingPeriod,
) -> Vec<DateTime<Utc>> {
    let mut out = Vec::new();
    let mut b = next_boundary(start, period);
    while b < finish {
        out.push(b);
        b = next_boundary(b, period);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap()
    }

    #[test]
    fn month_roundtrip_and_boundaries() {
        let t = utc(2024, 2, 29, 0, 0, 0); // leap day
        let id = bucket_id(t, ChunkingPeriod::Month);
        assert_eq!(bucket_start_utc(id, ChunkingPeriod::Month), utc(2024, 2, 1, 0, 0, 0));
        // end exclusive = start of next month
        assert_eq!(
            bucket_end_exclusive_utc(id, ChunkingPeriod::Month),
            utc(2024, 3, 1, 0, 0, 0)
        );
    }

    #[test]
    fn december_rolls_into_next_year() {
        let t = utc(2023, 12, 31, 23, 59, 59);
        assert_eq!(next_boundary(t, ChunkingPeriod::Month), utc(2024, 1, 1, 0, 0, 0));
    }

    #[test]
    fn week_is_monday_aligned() {
        // 2024-01-10 is a Wednesday; its week starts Monday 2024-01-08.
        let t = utc(2024, 1, 10, 15, 0, 0);
        assert_eq!(period_floor(t, ChunkingPeriod::Week), utc(2024, 1, 8, 0, 0, 0));
        assert_eq!(next_boundary(t, ChunkingPeriod::Week), utc(2024, 1, 15, 0, 0, 0));
    }

    #[test]
    fn pre_epoch_days_do_not_wrap() {
        let t = utc(1969, 12, 31, 12, 0, 0);
        assert_eq!(bucket_id(t, ChunkingPeriod::Day), -1);
        assert_eq!(period_floor(t, ChunkingPeriod::Day), utc(1969, 12, 31, 0, 0, 0));
    }

    #[test]
    fn boundary_detection() {
        assert!(is_boundary(utc(2024, 3, 1, 0, 0, 0), ChunkingPeriod::Month));
        assert!(!is_boundary(utc(2024, 3, 1, 0, 0, 1), ChunkingPeriod::Month));
        assert!(is_boundary(utc(2024, 3, 4, 0, 0, 0), ChunkingPeriod::Week));
    }

    #[test]
    fn enclosing_range_rounds_out_to_months() {
        let (s, e) = enclosing_range(
            utc(2024, 1, 25, 10, 0, 0),
            utc(2024, 2, 14, 10, 0, 0),
            ChunkingPeriod::Month,
        );
        assert_eq!(s, utc(2024, 1, 1, 0, 0, 0));
        assert_eq!(e, utc(2024, 3, 1, 0, 0, 0));
    }

    #[test]
    fn covering_three_week_request_across_month_boundary() {
        let periods = periods_covering(
            utc(2024, 1, 25, 0, 0, 0),
            utc(2024, 2, 14, 0, 0, 0),
            ChunkingPeriod::Month,
        );
        assert_eq!(
            periods,
            vec![
                (utc(2024, 1, 1, 0, 0, 0), utc(2024, 2, 1, 0, 0, 0)),
                (utc(2024, 2, 1, 0, 0, 0), utc(2024, 3, 1, 0, 0, 0)),
            ]
        );
    }

    #[test]
    fn boundaries_are_strictly_inside() {
        let got = boundaries_within(
            utc(2024, 1, 1, 0, 0, 0),
            utc(2024, 3, 1, 0, 0, 0),
            ChunkingPeriod::Month,
        );
        assert_eq!(got, vec![utc(2024, 2, 1, 0, 0, 0)]);
    }

    proptest! {
        #[test]
        fn floor_is_boundary_and_not_after_ts(secs in 0i64..4_000_000_000i64) {
            let ts = DateTime::from_timestamp(secs, 0).unwrap();
            for p in [ChunkingPeriod::Day, ChunkingPeriod::Week, ChunkingPeriod::Month] {
                let floor = period_floor(ts, p);
                prop_assert!(floor <= ts);
                prop_assert!(ts < next_boundary(ts, p));
                prop_assert!(is_boundary(floor, p));
                prop_assert_eq!(bucket_id(floor, p), bucket_id(ts, p));
            }
        }
    }
}
