//! Seeded synthetic market/trade data for the `tca-run demo` command and tests.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use tca_cache::CacheStats;
use tca_engine::{
    models::{MarketTick, Side, TagField, TradeOrderKind, TradeRecord},
    pipeline::ResultsSummary,
    source::InMemorySource,
};

use crate::result::ResultHolder;

const VENUES: [&str; 3] = ["ebs", "reuters", "hotspot"];
const BROKERS: [&str; 2] = ["acme", "globex"];

#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub ticker: String,
    pub start: DateTime<Utc>,
    pub finish: DateTime<Utc>,
    pub tick_interval: Duration,
    /// Average gap between trades.
    pub trade_interval: Duration,
    /// Market data extends this far beyond `[start, finish]` on both sides.
    pub market_overhang: Duration,
    pub seed: u64,
}

impl SyntheticSpec {
    pub fn new(ticker: impl Into<String>, start: DateTime<Utc>, finish: DateTime<Utc>, seed: u64) -> Self {
        Self {
            ticker: ticker.into(),
            start,
            finish,
            tick_interval: Duration::seconds(30),
            trade_interval: Duration::hours(2),
            market_overhang: Duration::days(1),
            seed,
        }
    }
}

/// Builds an [`InMemorySource`] named `synthetic` holding a random-walk quote
/// stream plus trades and orders priced around it.
pub fn synthetic_source(spec: &SyntheticSpec) -> InMemorySource {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let src = InMemorySource::new("synthetic");

    let mut ticks = Vec::new();
    let mut mid = 1.10_f64;
    let mut t = spec.start - spec.market_overhang;
    let end = spec.finish + spec.market_overhang;
    let step = spec.tick_interval.max(Duration::milliseconds(1));
    while t <= end {
        mid *= 1.0 + rng.random_range(-0.00005..0.00005);
        let half_spread = mid * rng.random_range(0.00001..0.00005);
        ticks.push(MarketTick::from_quote(
            t,
            mid - half_spread,
            mid + half_spread,
            rng.random_range(1.0..10.0_f64).round(),
        ));
        t += step;
    }

    let mut trades = Vec::new();
    let mut orders = Vec::new();
    let gap_ms = spec.trade_interval.num_milliseconds().max(2);
    let mut t = spec.start + Duration::milliseconds(rng.random_range(0..gap_ms));
    let mut n = 0usize;
    while t <= spec.finish {
        let idx = ticks.partition_point(|x| x.timestamp <= t).saturating_sub(1);
        let tick = &ticks[idx];
        let side = if rng.random_bool(0.5) { Side::Buy } else { Side::Sell };
        let cross = match side {
            Side::Buy => tick.ask,
            Side::Sell => tick.bid,
        };
        let px = cross * (1.0 + rng.random_range(-0.00002..0.00002));
        let notional = rng.random_range(1.0..50.0_f64).round() * 100_000.0;
        let venue = VENUES[rng.random_range(0..VENUES.len())];
        let broker = BROKERS[rng.random_range(0..BROKERS.len())];

        trades.push(
            TradeRecord::new(format!("T{n:06}"), t, side, px, notional)
                .with_venue(venue)
                .with_broker(broker)
                .with_algo("twap"),
        );
        if n % 4 == 0 {
            orders.push(
                TradeRecord::new(format!("O{n:06}"), t, side, px, notional * 4.0).with_broker(broker),
            );
        }
        n += 1;
        t += Duration::milliseconds(rng.random_range(gap_ms / 2..gap_ms * 3 / 2));
    }

    src.insert_market(&spec.ticker, ticks);
    src.insert_trades(&spec.ticker, TradeOrderKind::Trade, trades);
    src.insert_trades(&spec.ticker, TradeOrderKind::Order, orders);
    src
}

/// JSON-friendly digest of a [`ResultHolder`].
#[derive(Debug, Clone, Serialize)]
pub struct DemoSummary {
    pub ticker: String,
    pub start: DateTime<Utc>,
    pub finish: DateTime<Utc>,
    pub market_ticks: usize,
    pub rows_by_kind: BTreeMap<String, usize>,
    pub derived_tables: BTreeMap<String, usize>,
    pub slippage_by_venue: ResultsSummary,
    pub transient_impact_by_venue: ResultsSummary,
    pub cache: Option<CacheStats>,
}

impl DemoSummary {
    pub fn from_holder(holder: &ResultHolder, cache: Option<CacheStats>) -> Self {
        let fills = holder
            .trades
            .get(&TradeOrderKind::Trade)
            .cloned()
            .unwrap_or_else(|| tca_engine::models::TradeTable::empty(TradeOrderKind::Trade));
        Self {
            ticker: holder.ticker.clone(),
            start: holder.start,
            finish: holder.finish,
            market_ticks: holder.market.len(),
            rows_by_kind: holder
                .trades
                .iter()
                .map(|(k, t)| (k.to_string(), t.len()))
                .collect(),
            derived_tables: holder
                .derived
                .iter()
                .map(|(k, t)| (k.clone(), t.len()))
                .collect(),
            slippage_by_venue: ResultsSummary::weighted_by_notional(&fills, "slippage", Some(TagField::Venue)),
            transient_impact_by_venue: ResultsSummary::weighted_by_notional(
                &fills,
                "transient_market_impact",
                Some(TagField::Venue),
            ),
            cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tca_engine::source::DataSource;

    #[tokio::test]
    async fn same_seed_same_data() {
        let s = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        let f = s + Duration::days(2);
        let spec = SyntheticSpec::new("EURUSD", s, f, 7);
        let a = synthetic_source(&spec)
            .fetch_trades("EURUSD", s, f, TradeOrderKind::Trade)
            .await
            .unwrap();
        let b = synthetic_source(&spec)
            .fetch_trades("EURUSD", s, f, TradeOrderKind::Trade)
            .await
            .unwrap();
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }
}
