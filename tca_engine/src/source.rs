//! Where market and trade data come from.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{
    errors::TcaError,
    models::{MarketSeries, MarketTick, TradeOrderKind, TradeRecord, TradeTable},
    series,
};

/// A store of market and trade/order data for any ticker.
///
/// Implementations return rows with `start <= ts <= finish`, sorted by time.
/// An empty result is valid; [`TcaError::DataMissing`] is reserved for a
/// ticker the store knows nothing about.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Short stable identifier, used as the first component of cache keys.
    fn store_name(&self) -> &str;

    async fn fetch_market(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    ) -> Result<MarketSeries, TcaError>;

    async fn fetch_trades(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
        kind: TradeOrderKind,
    ) -> Result<TradeTable, TcaError>;
}

/// A [`DataSource`] backed by in-process vectors.
#[derive(Debug, Default)]
pub struct InMemorySource {
    name: String,
    market: RwLock<HashMap<String, Vec<MarketTick>>>,
    trades: RwLock<HashMap<(String, TradeOrderKind), Vec<TradeRecord>>>,
    fetches: AtomicUsize,
}

impl InMemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn insert_market(&self, ticker: &str, mut ticks: Vec<MarketTick>) {
        let mut guard = self.market.write();
        let entry = guard.entry(ticker.to_string()).or_default();
        entry.append(&mut ticks);
        series::sort_by_time(entry);
    }

    pub fn insert_trades(&self, ticker: &str, kind: TradeOrderKind, mut rows: Vec<TradeRecord>) {
        let mut guard = self.trades.write();
        let entry = guard.entry((ticker.to_string(), kind)).or_default();
        entry.append(&mut rows);
        series::sort_by_time(entry);
    }

    /// Number of fetch calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    fn knows(&self, ticker: &str) -> bool {
        self.market.read().contains_key(ticker)
            || self.trades.read().keys().any(|(t, _)| t == ticker)
    }
}

fn slice<T: series::Timestamped + Clone>(rows: &[T], start: DateTime<Utc>, finish: DateTime<Utc>) -> Vec<T> {
    let lo = rows.partition_point(|r| r.timestamp() < start);
    let hi = rows.partition_point(|r| r.timestamp() <= finish);
    if lo >= hi { Vec::new() } else { rows[lo..hi].to_vec() }
}

#[async_trait]
impl DataSource for InMemorySource {
    fn store_name(&self) -> &str {
        &self.name
    }

    async fn fetch_market(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    ) -> Result<MarketSeries, TcaError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if !self.knows(ticker) {
            return Err(TcaError::DataMissing {
                ticker: ticker.to_string(),
                kind: "market".into(),
                start,
                finish,
            });
        }
        let ticks = self
            .market
            .read()
            .get(ticker)
            .map(|rows| slice(rows, start, finish))
            .unwrap_or_default();
        Ok(MarketSeries::new(ticker, ticks))
    }

    async fn fetch_trades(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
        kind: TradeOrderKind,
    ) -> Result<TradeTable, TcaError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if !self.knows(ticker) {
            return Err(TcaError::DataMissing {
                ticker: ticker.to_string(),
                kind: kind.to_string(),
                start,
                finish,
            });
        }
        let rows = self
            .trades
            .read()
            .get(&(ticker.to_string(), kind))
            .map(|rows| slice(rows, start, finish))
            .unwrap_or_default();
        Ok(TradeTable::new(kind, rows))
    }
}
