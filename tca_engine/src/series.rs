//! Ordering helpers shared by every time-indexed row type.

use chrono::{DateTime, Utc};

use crate::models::{DerivedRow, MarketTick, TradeRecord};

/// A row with a point-in-time stamp.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for MarketTick {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for TradeRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for DerivedRow {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// True when timestamps never decrease.
pub fn is_sorted<T: Timestamped>(rows: &[T]) -> bool {
    rows.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp())
}

/// Stable sort by timestamp; rows sharing a timestamp keep their relative order.
pub fn sort_by_time<T: Timestamped>(rows: &mut [T]) {
    if !is_sorted(rows) {
        rows.sort_by_key(|r| r.timestamp());
    }
}

/// Drops all but the last row of every run of equal timestamps.
///
/// Expects sorted input.
pub fn dedupe_timestamps<T: Timestamped>(rows: &mut Vec<T>) {
    let mut out: Vec<T> = Vec::with_capacity(rows.len());
    for row in rows.drain(..) {
        match out.last_mut() {
            Some(last) if last.timestamp() == row.timestamp() => *last = row,
            _ => out.push(row),
        }
    }
    *rows = out;
}

/// Keeps rows with `start <= ts <= finish`. Expects sorted input.
pub fn trim<T: Timestamped>(rows: &mut Vec<T>, start: DateTime<Utc>, finish: DateTime<Utc>) {
    let lo = rows.partition_point(|r| r.timestamp() < start);
    let hi = rows.partition_point(|r| r.timestamp() <= finish);
    if lo >= hi {
        rows.clear();
        return;
    }
    rows.truncate(hi);
    rows.drain(..lo);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn tick(s: i64, mid: f64) -> MarketTick {
        let base = Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap();
        MarketTick::from_mid(base + Duration::seconds(s), mid)
    }

    #[test]
    fn sort_is_stable() {
        let mut rows = vec![tick(2, 1.0), tick(1, 2.0), tick(1, 3.0)];
        sort_by_time(&mut rows);
        let mids: Vec<f64> = rows.iter().map(|t| t.mid).collect();
        assert_eq!(mids, vec![2.0, 3.0, 1.0]);
    }

    #[test]
    fn dedupe_keeps_last() {
        let mut rows = vec![tick(1, 1.0), tick(1, 2.0), tick(2, 3.0), tick(2, 4.0), tick(3, 5.0)];
        dedupe_timestamps(&mut rows);
        let mids: Vec<f64> = rows.iter().map(|t| t.mid).collect();
        assert_eq!(mids, vec![2.0, 4.0, 5.0]);
    }

    #[test]
    fn trim_is_inclusive_on_both_ends() {
        let mut rows: Vec<MarketTick> = (0..10).map(|s| tick(s, s as f64)).collect();
        let start = rows[2].timestamp;
        let finish = rows[5].timestamp;
        trim(&mut rows, start, finish);
        let mids: Vec<f64> = rows.iter().map(|t| t.mid).collect();
        assert_eq!(mids, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn trim_outside_range_empties() {
        let mut rows: Vec<MarketTick> = (0..3).map(|s| tick(s, s as f64)).collect();
        let start = rows[2].timestamp + Duration::seconds(10);
        trim(&mut rows, start, start + Duration::seconds(1));
        assert!(rows.is_empty());
    }
}
