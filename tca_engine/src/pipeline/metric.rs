//! Metric stages. Each one writes a per-trade column and emits a derived
//! table with one row per priced trade.

use chrono::Duration;

use super::{DataNeeds, MarketMargin, Metric};
use crate::{
    alignment::{self, SearchSide},
    errors::TcaError,
    models::{DerivedRow, DerivedTable, MarketField, MarketSeries, TradeOrderKind, TradeTable},
};

/// Execution price against a benchmark column, in basis points.
///
/// `slippage_bp = side * (benchmark - executed) / benchmark * 1e4`, so a buy
/// filled above its benchmark is negative. Trades without the benchmark column
/// are skipped.
#[derive(Debug, Clone)]
pub struct SlippageMetric {
    pub column: String,
    pub benchmark_column: String,
    /// Rows with `|slippage_bp|` above this are flagged as anomalous.
    pub anomaly_threshold_bp: f64,
    pub kinds: Vec<TradeOrderKind>,
}

impl Default for SlippageMetric {
    fn default() -> Self {
        Self {
            column: "slippage".into(),
            benchmark_column: "arrival".into(),
            anomaly_threshold_bp: 100.0,
            kinds: Vec::new(),
        }
    }
}

impl SlippageMetric {
    pub fn against(benchmark_column: impl Into<String>) -> Self {
        let benchmark_column = benchmark_column.into();
        Self {
            column: format!("slippage_{benchmark_column}"),
            benchmark_column,
            ..Self::default()
        }
    }
}

impl Metric for SlippageMetric {
    fn name(&self) -> &str {
        &self.column
    }

    fn applies_to(&self) -> &[TradeOrderKind] {
        &self.kinds
    }

    fn needs(&self) -> DataNeeds {
        DataNeeds {
            market: false,
            trades: true,
        }
    }

    fn requires(&self) -> Vec<String> {
        vec![self.benchmark_column.clone()]
    }

    fn calculate(
        &self,
        mut trades: TradeTable,
        _market: &MarketSeries,
    ) -> Result<(TradeTable, DerivedTable), TcaError> {
        let mut derived = DerivedTable::new(self.column.clone());
        for row in trades.rows.iter_mut() {
            let Some(bench) = row.field(&self.benchmark_column) else {
                continue;
            };
            if bench == 0.0 || !bench.is_finite() {
                continue;
            }
            let slippage = row.side.sign() * (bench - row.executed_price) / bench * 1e4;
            let anomalous = slippage.abs() > self.anomaly_threshold_bp;
            row.fields.insert(self.column.clone(), slippage);

            let mut values = std::collections::BTreeMap::new();
            values.insert("slippage_bp".to_string(), slippage);
            values.insert("benchmark".to_string(), bench);
            values.insert("executed_price".to_string(), row.executed_price);
            values.insert("anomalous".to_string(), if anomalous { 1.0 } else { 0.0 });
            derived.rows.push(DerivedRow {
                trade_id: row.id.clone(),
                timestamp: row.timestamp,
                values,
            });
        }
        Ok((trades, derived))
    }
}

/// Price move from execution to `offset` later, in basis points of the
/// executed price, positive when the market follows the trade's direction.
#[derive(Debug, Clone)]
pub struct MarketImpactMetric {
    pub column: String,
    pub offset: Duration,
    pub field: MarketField,
    pub kinds: Vec<TradeOrderKind>,
}

impl MarketImpactMetric {
    pub fn new(column: impl Into<String>, offset: Duration) -> Self {
        Self {
            column: column.into(),
            offset,
            field: MarketField::Mid,
            kinds: Vec::new(),
        }
    }

    pub fn transient() -> Self {
        Self::new("transient_market_impact", Duration::seconds(1))
    }

    pub fn permanent() -> Self {
        Self::new("permanent_market_impact", Duration::minutes(30))
    }
}

impl Metric for MarketImpactMetric {
    fn name(&self) -> &str {
        &self.column
    }

    fn applies_to(&self) -> &[TradeOrderKind] {
        &self.kinds
    }

    fn market_margin(&self) -> MarketMargin {
        MarketMargin {
            before: Duration::zero(),
            after: self.offset,
        }
    }

    fn calculate(
        &self,
        mut trades: TradeTable,
        market: &MarketSeries,
    ) -> Result<(TradeTable, DerivedTable), TcaError> {
        let lookup = alignment::vlookup_market(
            &trades.timestamps(),
            market,
            self.field,
            self.offset,
            SearchSide::After,
        )?;
        let mut derived = DerivedTable::new(self.column.clone());
        for (i, row) in trades.rows.iter_mut().enumerate() {
            let px = lookup.values[i];
            if row.executed_price == 0.0 {
                continue;
            }
            let impact = row.side.sign() * (px - row.executed_price) / row.executed_price * 1e4;
            row.fields.insert(self.column.clone(), impact);
            row.observed_at.insert(self.column.clone(), lookup.matched_at[i]);

            let mut values = std::collections::BTreeMap::new();
            values.insert("impact_bp".to_string(), impact);
            values.insert("market_price".to_string(), px);
            derived.rows.push(DerivedRow {
                trade_id: row.id.clone(),
                timestamp: row.timestamp,
                values,
            });
        }
        Ok((trades, derived))
    }
}
