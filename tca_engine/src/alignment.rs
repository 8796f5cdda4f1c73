//! Point-in-time nearest-neighbour search of query timestamps against an
//! ordered time series.
//!
//! [`search`] is the primitive: for every (offset-shifted) query time it
//! returns the position of the series element that benchmarks it.
//!
//! - [`SearchSide::Before`]: an exact match keeps its own position, otherwise
//!   the preceding element is used (`insertion_point - 1`).
//! - [`SearchSide::After`]: the insertion point itself, i.e. the first element
//!   at or after the shifted time.
//!
//! Results are clamped into `[0, len - 1]`: queries before the first element
//! map to 0 and queries past the last element map to `len - 1`. [`vlookup`]
//! refuses to clamp silently: it validates that the queries sit strictly
//! inside the series before looking anything up.

use std::ops::Range;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::TcaError,
    models::{MarketField, MarketSeries, MarketTick},
    series::Timestamped,
};

/// Tie-break rule for a query that does not hit a series timestamp exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSide {
    /// Last observation at or before the query time.
    Before,
    /// First observation at or after the query time.
    After,
}

/// Position of the benchmark element for a single, already shifted, query time.
///
/// `index` must be non-empty and non-decreasing.
fn search_one(index: &[DateTime<Utc>], t: DateTime<Utc>, side: SearchSide) -> usize {
    let last = index.len() - 1;
    let ip = index.partition_point(|x| *x < t);
    match side {
        SearchSide::Before => {
            if ip <= last && index[ip] == t {
                ip
            } else {
                ip.saturating_sub(1)
            }
        }
        SearchSide::After => ip.min(last),
    }
}

/// Maps each query time, shifted by `offset`, to a position in `index`.
///
/// Returns an empty vector when `index` is empty; there is no valid position
/// to clamp to.
pub fn search(
    index: &[DateTime<Utc>],
    query: &[DateTime<Utc>],
    offset: Duration,
    side: SearchSide,
) -> Vec<usize> {
    if index.is_empty() {
        return Vec::new();
    }
    query
        .iter()
        .map(|t| search_one(index, *t + offset, side))
        .collect()
}

/// Half-open position range of the elements with `from <= ts <= to`.
pub fn window(index: &[DateTime<Utc>], from: DateTime<Utc>, to: DateTime<Utc>) -> Range<usize> {
    let lo = index.partition_point(|x| *x < from);
    let hi = index.partition_point(|x| *x <= to);
    lo..hi.max(lo)
}

/// Result of a [`vlookup`], aligned element-for-element with the query times.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    /// The original (unshifted) query times.
    pub query_times: Vec<DateTime<Utc>>,
    /// Series position matched for each query.
    pub positions: Vec<usize>,
    /// Looked-up field value for each query.
    pub values: Vec<f64>,
    /// Timestamp of the series element each value was observed at.
    pub matched_at: Vec<DateTime<Utc>>,
}

impl Lookup {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Checks that every shifted query lies strictly inside the series' covered range.
fn check_overlap(
    series_index: &[DateTime<Utc>],
    shifted: &[DateTime<Utc>],
) -> Result<(), TcaError> {
    let (Some(q_first), Some(q_last)) = (shifted.iter().min(), shifted.iter().max()) else {
        return Ok(());
    };
    let s_first = series_index.first().copied();
    let s_last = series_index.last().copied();
    let inside = matches!((s_first, s_last), (Some(f), Some(l)) if *q_first > f && *q_last < l);
    if inside {
        Ok(())
    } else {
        Err(TcaError::TimeRangeOverlap {
            query_first: *q_first,
            query_last: *q_last,
            series_first: s_first,
            series_last: s_last,
        })
    }
}

/// Looks up `field` of the series element benchmarking each query time.
///
/// Fails with [`TcaError::TimeRangeOverlap`] unless the earliest shifted query
/// is strictly after the first series timestamp and the latest shifted query is
/// strictly before the last one. An empty query yields an empty lookup.
pub fn vlookup<T, F>(
    query: &[DateTime<Utc>],
    series: &[T],
    field: F,
    offset: Duration,
    side: SearchSide,
) -> Result<Lookup, TcaError>
where
    T: Timestamped,
    F: Fn(&T) -> f64,
{
    if query.is_empty() {
        return Ok(Lookup {
            query_times: Vec::new(),
            positions: Vec::new(),
            values: Vec::new(),
            matched_at: Vec::new(),
        });
    }

    let index: Vec<DateTime<Utc>> = series.iter().map(|r| r.timestamp()).collect();
    let shifted: Vec<DateTime<Utc>> = query.iter().map(|t| *t + offset).collect();
    check_overlap(&index, &shifted)?;

    let positions = search(&index, query, offset, side);
    let values = positions.iter().map(|&p| field(&series[p])).collect();
    let matched_at = positions.iter().map(|&p| index[p]).collect();

    Ok(Lookup {
        query_times: query.to_vec(),
        positions,
        values,
        matched_at,
    })
}

/// [`vlookup`] of a [`MarketField`] against a market series.
pub fn vlookup_market(
    query: &[DateTime<Utc>],
    market: &MarketSeries,
    field: MarketField,
    offset: Duration,
    side: SearchSide,
) -> Result<Lookup, TcaError> {
    vlookup(query, &market.ticks, |t: &MarketTick| t.field(field), offset, side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap()
    }

    fn secs(s: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(s)
    }

    fn millis(ms: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(ms)
    }

    #[test]
    fn exact_match_keeps_position() {
        let idx = vec![secs(0), secs(1), secs(2)];
        let q = vec![secs(0), secs(1), secs(2)];
        assert_eq!(search(&idx, &q, Duration::zero(), SearchSide::Before), vec![0, 1, 2]);
        assert_eq!(search(&idx, &q, Duration::zero(), SearchSide::After), vec![0, 1, 2]);
    }

    #[test]
    fn between_points_picks_neighbour_by_side() {
        let idx = vec![secs(0), secs(1), secs(2)];
        let q = vec![millis(500), millis(1500)];
        assert_eq!(search(&idx, &q, Duration::zero(), SearchSide::Before), vec![0, 1]);
        assert_eq!(search(&idx, &q, Duration::zero(), SearchSide::After), vec![1, 2]);
    }

    #[test]
    fn out_of_range_clamps() {
        let idx = vec![secs(0), secs(1), secs(2)];
        let q = vec![secs(-10), secs(10)];
        assert_eq!(search(&idx, &q, Duration::zero(), SearchSide::Before), vec![0, 2]);
        assert_eq!(search(&idx, &q, Duration::zero(), SearchSide::After), vec![0, 2]);
    }

    #[test]
    fn offset_shifts_before_searching() {
        let idx = vec![secs(0), secs(1), secs(2)];
        let q = vec![millis(500)];
        assert_eq!(search(&idx, &q, Duration::seconds(1), SearchSide::After), vec![2]);
        assert_eq!(search(&idx, &q, Duration::seconds(1), SearchSide::Before), vec![1]);
    }

    #[test]
    fn empty_index_yields_no_positions() {
        assert!(search(&[], &[secs(0)], Duration::zero(), SearchSide::Before).is_empty());
    }

    #[test]
    fn window_is_inclusive() {
        let idx: Vec<_> = (0..10).map(secs).collect();
        assert_eq!(window(&idx, secs(2), secs(4)), 2..5);
        assert_eq!(window(&idx, millis(2500), millis(2600)), 3..3);
        assert_eq!(window(&idx, secs(20), secs(30)), 10..10);
    }

    fn market() -> MarketSeries {
        MarketSeries::new(
            "EURUSD",
            vec![
                MarketTick::from_mid(secs(0), 1.1000),
                MarketTick::from_mid(secs(1), 1.1002),
                MarketTick::from_mid(secs(2), 1.1004),
            ],
        )
    }

    #[test]
    fn arrival_and_impact_scenario() {
        let m = market();
        let trade = vec![millis(500)];

        let arrival =
            vlookup_market(&trade, &m, MarketField::Mid, Duration::zero(), SearchSide::Before)
                .unwrap();
        assert_eq!(arrival.values, vec![1.1000]);
        assert_eq!(arrival.matched_at, vec![secs(0)]);
        assert_eq!(arrival.query_times, trade);

        let impact =
            vlookup_market(&trade, &m, MarketField::Mid, Duration::seconds(1), SearchSide::After)
                .unwrap();
        assert_eq!(impact.values, vec![1.1004]);
        assert_eq!(impact.matched_at, vec![secs(2)]);
    }

    #[test]
    fn vlookup_rejects_queries_outside_series() {
        let m = market();
        for q in [vec![secs(-1)], vec![millis(500), secs(3)], vec![secs(0)], vec![secs(2)]] {
            let err = vlookup_market(&q, &m, MarketField::Mid, Duration::zero(), SearchSide::Before)
                .unwrap_err();
            assert!(matches!(err, TcaError::TimeRangeOverlap { .. }), "query {q:?}");
        }
    }

    #[test]
    fn vlookup_checks_shifted_times() {
        let m = market();
        let err = vlookup_market(
            &[millis(1500)],
            &m,
            MarketField::Mid,
            Duration::seconds(1),
            SearchSide::After,
        )
        .unwrap_err();
        assert!(matches!(err, TcaError::TimeRangeOverlap { .. }));
    }

    #[test]
    fn vlookup_on_empty_series_is_overlap_error() {
        let m = MarketSeries::new("EURUSD", vec![]);
        let err = vlookup_market(&[secs(0)], &m, MarketField::Mid, Duration::zero(), SearchSide::Before)
            .unwrap_err();
        assert!(matches!(err, TcaError::TimeRangeOverlap { series_first: None, .. }));
    }

    #[test]
    fn vlookup_empty_query_is_ok() {
        let got = vlookup_market(&[], &market(), MarketField::Mid, Duration::zero(), SearchSide::Before)
            .unwrap();
        assert!(got.is_empty());
    }

    proptest! {
        #[test]
        fn before_is_last_at_or_before(
            mut raw in proptest::collection::vec(0i64..10_000, 1..60),
            q in -100i64..10_100,
        ) {
            raw.sort();
            raw.dedup();
            let idx: Vec<_> = raw.iter().map(|&s| millis(s)).collect();
            let pos = search(&idx, &[millis(q)], Duration::zero(), SearchSide::Before)[0];
            if millis(q) >= idx[0] {
                prop_assert!(idx[pos] <= millis(q));
                if pos + 1 < idx.len() {
                    prop_assert!(idx[pos + 1] > millis(q));
                }
            } else {
                prop_assert_eq!(pos, 0);
            }
        }

        #[test]
        fn after_is_first_at_or_after(
            mut raw in proptest::collection::vec(0i64..10_000, 1..60),
            q in -100i64..10_100,
        ) {
            raw.sort();
            raw.dedup();
            let idx: Vec<_> = raw.iter().map(|&s| millis(s)).collect();
            let pos = search(&idx, &[millis(q)], Duration::zero(), SearchSide::After)[0];
            if millis(q) <= idx[idx.len() - 1] {
                prop_assert!(idx[pos] >= millis(q));
                if pos > 0 {
                    prop_assert!(idx[pos - 1] < millis(q));
                }
            } else {
                prop_assert_eq!(pos, idx.len() - 1);
            }
        }

        #[test]
        fn exact_hits_never_shift(
            mut raw in proptest::collection::vec(0i64..10_000, 1..60),
            pick in any::<proptest::sample::Index>(),
        ) {
            raw.sort();
            raw.dedup();
            let idx: Vec<_> = raw.iter().map(|&s| millis(s)).collect();
            let i = pick.index(idx.len());
            let pos = search(&idx, &[idx[i]], Duration::zero(), SearchSide::Before)[0];
            prop_assert_eq!(pos, i);
        }
    }
}
