//! Benchmark stages: each one writes a reference price (or spread) column
//! onto every trade it can price.

use chrono::Duration;
use tracing::debug;

use super::{Benchmark, MarketMargin};
use crate::{
    alignment::{self, SearchSide},
    errors::TcaError,
    models::{MarketField, MarketSeries, TradeOrderKind, TradeTable},
};

/// Prevailing market price at the moment of each trade.
#[derive(Debug, Clone)]
pub struct ArrivalBenchmark {
    pub column: String,
    pub field: MarketField,
    pub offset: Duration,
    pub kinds: Vec<TradeOrderKind>,
}

impl Default for ArrivalBenchmark {
    fn default() -> Self {
        Self {
            column: "arrival".into(),
            field: MarketField::Mid,
            offset: Duration::zero(),
            kinds: Vec::new(),
        }
    }
}

impl ArrivalBenchmark {
    pub fn for_kinds(mut self, kinds: Vec<TradeOrderKind>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn with_field(mut self, field: MarketField) -> Self {
        self.field = field;
        self
    }
}

impl Benchmark for ArrivalBenchmark {
    fn name(&self) -> &str {
        &self.column
    }

    fn applies_to(&self) -> &[TradeOrderKind] {
        &self.kinds
    }

    fn market_margin(&self) -> MarketMargin {
        MarketMargin {
            before: -self.offset.min(Duration::zero()),
            after: self.offset.max(Duration::zero()),
        }
    }

    fn produces(&self) -> Vec<String> {
        vec![self.column.clone()]
    }

    fn calculate(&self, mut trades: TradeTable, market: &MarketSeries) -> Result<TradeTable, TcaError> {
        let lookup = alignment::vlookup_market(
            &trades.timestamps(),
            market,
            self.field,
            self.offset,
            SearchSide::Before,
        )?;
        for (row, (value, at)) in trades
            .rows
            .iter_mut()
            .zip(lookup.values.iter().zip(&lookup.matched_at))
        {
            row.fields.insert(self.column.clone(), *value);
            row.observed_at.insert(self.column.clone(), *at);
        }
        Ok(trades)
    }
}

/// Half-spread of the prevailing quote, in basis points of mid, on each side.
#[derive(Debug, Clone)]
pub struct SpreadToMidBenchmark {
    pub bid_column: String,
    pub ask_column: String,
    pub kinds: Vec<TradeOrderKind>,
}

impl Default for SpreadToMidBenchmark {
    fn default() -> Self {
        Self {
            bid_column: "bid_mid_bp".into(),
            ask_column: "ask_mid_bp".into(),
            kinds: Vec::new(),
        }
    }
}

impl Benchmark for SpreadToMidBenchmark {
    fn name(&self) -> &str {
        "spread_to_mid"
    }

    fn applies_to(&self) -> &[TradeOrderKind] {
        &self.kinds
    }

    fn produces(&self) -> Vec<String> {
        vec![self.bid_column.clone(), self.ask_column.clone()]
    }

    fn calculate(&self, mut trades: TradeTable, market: &MarketSeries) -> Result<TradeTable, TcaError> {
        let times = trades.timestamps();
        let zero = Duration::zero();
        let bid = alignment::vlookup_market(&times, market, MarketField::Bid, zero, SearchSide::Before)?;
        let ask = alignment::vlookup_market(&times, market, MarketField::Ask, zero, SearchSide::Before)?;
        let mid = alignment::vlookup_market(&times, market, MarketField::Mid, zero, SearchSide::Before)?;

        for (i, row) in trades.rows.iter_mut().enumerate() {
            let m = mid.values[i];
            if m == 0.0 || !m.is_finite() {
                continue;
            }
            row.fields
                .insert(self.bid_column.clone(), (m - bid.values[i]) / m * 1e4);
            row.fields
                .insert(self.ask_column.clone(), (ask.values[i] - m) / m * 1e4);
            row.observed_at.insert(self.bid_column.clone(), mid.matched_at[i]);
            row.observed_at.insert(self.ask_column.clone(), mid.matched_at[i]);
        }
        Ok(trades)
    }
}

/// Volume-weighted mid over `[t - before, t + after]` around each trade.
///
/// Trades whose window holds no volume are left without the column.
#[derive(Debug, Clone)]
pub struct VwapBenchmark {
    pub column: String,
    pub before: Duration,
    pub after: Duration,
    pub kinds: Vec<TradeOrderKind>,
}

impl VwapBenchmark {
    pub fn new(before: Duration, after: Duration) -> Self {
        Self {
            column: "vwap".into(),
            before,
            after,
            kinds: Vec::new(),
        }
    }
}

impl Benchmark for VwapBenchmark {
    fn name(&self) -> &str {
        &self.column
    }

    fn applies_to(&self) -> &[TradeOrderKind] {
        &self.kinds
    }

    fn market_margin(&self) -> MarketMargin {
        MarketMargin {
            before: self.before,
            after: self.after,
        }
    }

    fn produces(&self) -> Vec<String> {
        vec![self.column.clone()]
    }

    fn calculate(&self, mut trades: TradeTable, market: &MarketSeries) -> Result<TradeTable, TcaError> {
        let index = market.index();
        let mut unpriced = 0usize;
        for row in trades.rows.iter_mut() {
            let range = alignment::window(&index, row.timestamp - self.before, row.timestamp + self.after);
            let (pv, v) = market.ticks[range]
                .iter()
                .fold((0.0, 0.0), |(pv, v), t| (pv + t.mid * t.volume, v + t.volume));
            if v > 0.0 {
                row.fields.insert(self.column.clone(), pv / v);
            } else {
                unpriced += 1;
            }
        }
        if unpriced > 0 {
            debug!(column = %self.column, unpriced, "trades without volume in vwap window");
        }
        Ok(trades)
    }
}

/// Time-weighted mid over `[t - before, t + after]` around each trade.
///
/// Each tick inside the window is weighted by how long it prevailed before the
/// next tick (or the window end). Ticks before the window are ignored.
#[derive(Debug, Clone)]
pub struct TwapBenchmark {
    pub column: String,
    pub before: Duration,
    pub after: Duration,
    pub kinds: Vec<TradeOrderKind>,
}

impl TwapBenchmark {
    pub fn new(before: Duration, after: Duration) -> Self {
        Self {
            column: "twap".into(),
            before,
            after,
            kinds: Vec::new(),
        }
    }
}

impl Benchmark for TwapBenchmark {
    fn name(&self) -> &str {
        &self.column
    }

    fn applies_to(&self) -> &[TradeOrderKind] {
        &self.kinds
    }

    fn market_margin(&self) -> MarketMargin {
        MarketMargin {
            before: self.before,
            after: self.after,
        }
    }

    fn produces(&self) -> Vec<String> {
        vec![self.column.clone()]
    }

    fn calculate(&self, mut trades: TradeTable, market: &MarketSeries) -> Result<TradeTable, TcaError> {
        let index = market.index();
        for row in trades.rows.iter_mut() {
            let end = row.timestamp + self.after;
            let ticks = &market.ticks[alignment::window(&index, row.timestamp - self.before, end)];
            if ticks.is_empty() {
                continue;
            }
            let mut weighted = 0.0;
            let mut total = 0.0;
            for (i, tick) in ticks.iter().enumerate() {
                let until = ticks.get(i + 1).map_or(end, |n| n.timestamp);
                let w = (until - tick.timestamp).num_nanoseconds().unwrap_or(0) as f64;
                weighted += tick.mid * w;
                total += w;
            }
            let twap = if total > 0.0 {
                weighted / total
            } else {
                ticks.iter().map(|t| t.mid).sum::<f64>() / ticks.len() as f64
            };
            row.fields.insert(self.column.clone(), twap);
        }
        Ok(trades)
    }
}
