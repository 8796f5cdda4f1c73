//! Cache-or-source data loading.
//!
//! Each fetch is rounded out to whole cache periods. Every period is served
//! from the cache when present, otherwise fetched from the source and written
//! back. The pieces are concatenated and trimmed to what was asked for.

use std::{future::Future, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use futures::future::try_join_all;
use indexmap::IndexMap;
use tca_cache::{CacheError, DataKind, DistributedCache, Payload};
use tca_engine::{
    TcaError, calendar,
    models::{ComputationRequest, MarketSeries, TradeOrderKind, TradeTable},
    series,
    source::DataSource,
};
use tracing::{debug, warn};

use crate::config::LoaderConfig;

pub struct CachedLoader {
    source: Arc<dyn DataSource>,
    cache: Option<Arc<DistributedCache>>,
    config: LoaderConfig,
}

impl CachedLoader {
    pub fn new(source: Arc<dyn DataSource>, cache: Option<Arc<DistributedCache>>, config: LoaderConfig) -> Self {
        Self { source, cache, config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn active_cache(&self) -> Option<&DistributedCache> {
        self.cache.as_deref().filter(|_| self.config.use_cache)
    }

    /// Market ticks in `[start, finish]`, timestamps shifted by `market_offset_ms`.
    pub async fn load_market(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    ) -> Result<MarketSeries, TcaError> {
        let offset = Duration::milliseconds(self.config.market_offset_ms);
        let fetch = |s: DateTime<Utc>, f: DateTime<Utc>| async move {
            let mut m = self.source.fetch_market(ticker, s - offset, f - offset).await?;
            if !offset.is_zero() {
                for tick in &mut m.ticks {
                    tick.timestamp += offset;
                }
            }
            Ok(m)
        };
        let parts = self
            .load_periods(ticker, start, finish, DataKind::Market, self.config.market_offset_ms, fetch)
            .await?;

        let mut ticks = Vec::new();
        for p in parts {
            ticks.extend(p.ticks);
        }
        series::sort_by_time(&mut ticks);
        series::dedupe_timestamps(&mut ticks);
        series::trim(&mut ticks, start, finish);
        Ok(MarketSeries::new(ticker, ticks))
    }

    pub async fn load_trades(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
        kind: TradeOrderKind,
    ) -> Result<TradeTable, TcaError> {
        let fetch = |s, f| self.source.fetch_trades(ticker, s, f, kind);
        let parts = self
            .load_periods(ticker, start, finish, DataKind::Trades(kind), 0, fetch)
            .await?;

        let mut rows = Vec::new();
        for p in parts {
            rows.extend(p.rows);
        }
        series::sort_by_time(&mut rows);
        series::trim(&mut rows, start, finish);
        Ok(TradeTable::new(kind, rows))
    }

    /// Everything one child computation needs: market data widened by
    /// `before`/`after` plus the configured padding, and one trade table per
    /// requested kind, in request order.
    pub async fn load_for(
        &self,
        request: &ComputationRequest,
        before: Duration,
        after: Duration,
    ) -> Result<(MarketSeries, IndexMap<TradeOrderKind, TradeTable>), TcaError> {
        let pad = Duration::seconds(self.config.market_padding_secs as i64);
        let market_fut = self.load_market(
            &request.ticker,
            request.start - before - pad,
            request.finish + after + pad,
        );
        let trades_fut = try_join_all(
            request
                .trade_order_kinds
                .iter()
                .map(|&k| self.load_trades(&request.ticker, request.start, request.finish, k)),
        );
        let (market, tables) = futures::try_join!(market_fut, trades_fut)?;
        let trades = request
            .trade_order_kinds
            .iter()
            .copied()
            .zip(tables)
            .collect();
        Ok((market, trades))
    }

    async fn load_periods<T, F, Fut>(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
        kind: DataKind,
        offset_ms: i64,
        fetch: F,
    ) -> Result<Vec<T>, TcaError>
    where
        T: Payload,
        F: Fn(DateTime<Utc>, DateTime<Utc>) -> Fut,
        Fut: Future<Output = Result<T, TcaError>>,
    {
        let Some(cache) = self.active_cache() else {
            return Ok(vec![fetch(start, finish).await?]);
        };

        let store = self.source.store_name();
        let periods = calendar::periods_covering(start, finish, self.config.cache_period);
        let keys: Vec<_> = periods
            .iter()
            .map(|(s, e)| cache.key(store, ticker, *s, *e, kind, offset_ms))
            .collect();

        let cached: Vec<Option<T>> = match cache.get_many(&keys).await {
            Ok(v) => v,
            Err(e) => {
                warn!(%ticker, %kind, error = %e, "cache unavailable; reading from source");
                keys.iter().map(|_| None).collect()
            }
        };

        let mut out = Vec::with_capacity(periods.len());
        for (((p_start, p_end), key), hit) in periods.into_iter().zip(&keys).zip(cached) {
            if let Some(v) = hit {
                out.push(v);
                continue;
            }
            let fetched = fetch(p_start, p_end - Duration::nanoseconds(1)).await?;
            debug!(key = %key, rows = fetched.row_count(), "fetched period from source");
            match cache.put_checked(key, &fetched).await {
                Ok(()) => {}
                Err(e @ CacheError::WriteConflict { .. }) => return Err(e.into()),
                Err(e) => warn!(key = %key, error = %e, "cache write failed; continuing uncached"),
            }
            out.push(fetched);
        }
        Ok(out)
    }
}
