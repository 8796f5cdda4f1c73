//! Calendar-aligned request splitting.
//!
//! Children are closed intervals. Interior boundaries come from
//! [`calendar::boundaries_within`]; each child ends one nanosecond before the
//! next one starts, so children never share an instant and their union is
//! exactly `[start, finish]`.

use chrono::{DateTime, Duration, Utc};
use tca_engine::{
    calendar,
    models::{ChunkingPeriod, ComputationRequest},
};
use tracing::debug;

/// `[start, finish]` cut at every `period` boundary strictly inside it.
pub fn split_range(
    start: DateTime<Utc>,
    finish: DateTime<Utc>,
    period: ChunkingPeriod,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    if finish < start {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut lo = start;
    for b in calendar::boundaries_within(start, finish, period) {
        out.push((lo, b - Duration::nanoseconds(1)));
        lo = b;
    }
    out.push((lo, finish));
    out
}

/// Child requests for `request`, chronologically ordered.
pub fn split(request: &ComputationRequest, period: ChunkingPeriod) -> Vec<ComputationRequest> {
    let children: Vec<ComputationRequest> = split_range(request.start, request.finish, period)
        .into_iter()
        .map(|(s, f)| request.with_range(s, f))
        .collect();
    debug!(
        ticker = %request.ticker,
        %period,
        children = children.len(),
        "split request"
    );
    children
}
