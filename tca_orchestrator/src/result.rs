//! Per-sub-request results and the merged holder returned to callers.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tca_cache::{CodecError, Payload};
use tca_engine::{
    models::{DerivedTable, MarketSeries, TradeOrderKind, TradeTable},
    series,
};

/// Output of one child computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResult {
    pub market: MarketSeries,
    pub trades: IndexMap<TradeOrderKind, TradeTable>,
    pub derived: IndexMap<String, DerivedTable>,
}

impl SubResult {
    fn merge_into(self, holder: &mut ResultHolder) {
        holder.market.ticks.extend(self.market.ticks);
        for (kind, table) in self.trades {
            holder
                .trades
                .entry(kind)
                .or_insert_with(|| TradeTable::empty(kind))
                .rows
                .extend(table.rows);
        }
        for (name, table) in self.derived {
            holder
                .derived
                .entry(name)
                .or_insert_with(|| DerivedTable::new(table.name.clone()))
                .rows
                .extend(table.rows);
        }
    }
}

/// Sub-results are stored in the cache as a whole; row-chunking applies to
/// the market series, which dominates the size.
impl Payload for SubResult {
    fn row_count(&self) -> usize {
        self.market.ticks.len()
    }

    fn split_rows(&self, parts: usize) -> Vec<Self> {
        let mut out: Vec<Self> = self
            .market
            .split_rows(parts)
            .into_iter()
            .map(|market| SubResult {
                market,
                trades: IndexMap::new(),
                derived: IndexMap::new(),
            })
            .collect();
        if let Some(first) = out.first_mut() {
            first.trades = self.trades.clone();
            first.derived = self.derived.clone();
        }
        out
    }

    fn concat(parts: Vec<Self>) -> Result<Self, CodecError> {
        let mut iter = parts.into_iter();
        let mut first = iter
            .next()
            .ok_or_else(|| CodecError::Concat("no sub-result chunks".into()))?;
        for part in iter {
            first.market.ticks.extend(part.market.ticks);
        }
        Ok(first)
    }

    fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.market.time_span()
    }
}

/// The reassembled result of a top-level computation, trimmed to `[start, finish]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultHolder {
    pub ticker: String,
    pub start: DateTime<Utc>,
    pub finish: DateTime<Utc>,
    pub market: MarketSeries,
    pub trades: IndexMap<TradeOrderKind, TradeTable>,
    pub derived: IndexMap<String, DerivedTable>,
}

impl ResultHolder {
    /// Merges sub-results given in the chronological order of their requests.
    pub fn assemble(
        ticker: &str,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
        parts: Vec<SubResult>,
    ) -> Self {
        let mut holder = ResultHolder {
            ticker: ticker.to_string(),
            start,
            finish,
            market: MarketSeries::new(ticker, Vec::new()),
            trades: IndexMap::new(),
            derived: IndexMap::new(),
        };
        for part in parts {
            part.merge_into(&mut holder);
        }
        holder.normalize();
        holder
    }

    fn normalize(&mut self) {
        let (start, finish) = (self.start, self.finish);
        series::sort_by_time(&mut self.market.ticks);
        series::trim(&mut self.market.ticks, start, finish);
        for table in self.trades.values_mut() {
            series::sort_by_time(&mut table.rows);
            series::trim(&mut table.rows, start, finish);
        }
        for table in self.derived.values_mut() {
            series::sort_by_time(&mut table.rows);
            series::trim(&mut table.rows, start, finish);
        }
    }

    pub fn trade_count(&self) -> usize {
        self.trades.values().map(TradeTable::len).sum()
    }
}
