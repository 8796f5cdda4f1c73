//! Computation pipeline: an ordered list of benchmark stages followed by
//! metric stages, applied to the aligned trade + market dataset of one ticker.
//!
//! Stages are trait objects so concrete benchmark/metric implementations stay
//! pluggable:
//!
//! - [`Benchmark::calculate`] appends benchmark columns to a trade table.
//! - [`Metric::calculate`] appends metric columns and emits a [`DerivedTable`].
//! - [`TradeOrderFilter::filter`] narrows a trade table before any stage runs.
//!
//! [`PipelineStage`] wraps both stage kinds behind the uniform
//! `apply(trade_table, market_series) -> (trade_table', derived_table)` contract.

pub mod benchmark;
pub mod filter;
pub mod metric;
pub mod summary;

use std::{collections::BTreeSet, fmt, sync::Arc};

use chrono::Duration;
use indexmap::IndexMap;
use tracing::debug;

use crate::{
    errors::TcaError,
    models::{DerivedTable, MarketSeries, TradeOrderKind, TradeTable},
};

pub use benchmark::{ArrivalBenchmark, SpreadToMidBenchmark, TwapBenchmark, VwapBenchmark};
pub use filter::{TagFilter, TimeOfDayFilter};
pub use metric::{MarketImpactMetric, SlippageMetric};
pub use summary::{GroupStats, ResultsSummary};

/// Which inputs a stage reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataNeeds {
    pub market: bool,
    pub trades: bool,
}

impl DataNeeds {
    pub const BOTH: DataNeeds = DataNeeds {
        market: true,
        trades: true,
    };
}

/// How much market data a stage reads before and after each trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketMargin {
    pub before: Duration,
    pub after: Duration,
}

impl MarketMargin {
    pub fn zero() -> Self {
        Self {
            before: Duration::zero(),
            after: Duration::zero(),
        }
    }

    pub fn max(self, other: MarketMargin) -> MarketMargin {
        MarketMargin {
            before: self.before.max(other.before),
            after: self.after.max(other.after),
        }
    }
}

/// Adds benchmark columns (e.g. arrival mid) to each trade.
pub trait Benchmark: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn calculate(&self, trades: TradeTable, market: &MarketSeries) -> Result<TradeTable, TcaError>;

    /// Kinds this stage runs on; empty means every kind.
    fn applies_to(&self) -> &[TradeOrderKind] {
        &[]
    }

    fn needs(&self) -> DataNeeds {
        DataNeeds::BOTH
    }

    fn market_margin(&self) -> MarketMargin {
        MarketMargin::zero()
    }

    /// Trade columns this benchmark writes.
    fn produces(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Computes a metric per trade and emits it as a derived table.
pub trait Metric: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn calculate(
        &self,
        trades: TradeTable,
        market: &MarketSeries,
    ) -> Result<(TradeTable, DerivedTable), TcaError>;

    fn applies_to(&self) -> &[TradeOrderKind] {
        &[]
    }

    fn needs(&self) -> DataNeeds {
        DataNeeds::BOTH
    }

    fn market_margin(&self) -> MarketMargin {
        MarketMargin::zero()
    }

    /// Trade columns that an earlier benchmark must have written.
    fn requires(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Narrows a trade table (by tag, time of day, ...).
pub trait TradeOrderFilter: Send + Sync + fmt::Debug {
    fn filter(&self, trades: TradeTable) -> TradeTable;
}

/// A benchmark or metric behind one calling convention.
#[derive(Debug, Clone)]
pub enum PipelineStage {
    Benchmark(Arc<dyn Benchmark>),
    Metric(Arc<dyn Metric>),
}

impl PipelineStage {
    pub fn name(&self) -> &str {
        match self {
            PipelineStage::Benchmark(b) => b.name(),
            PipelineStage::Metric(m) => m.name(),
        }
    }

    pub fn applies_to(&self, kind: TradeOrderKind) -> bool {
        let kinds = match self {
            PipelineStage::Benchmark(b) => b.applies_to(),
            PipelineStage::Metric(m) => m.applies_to(),
        };
        kinds.is_empty() || kinds.contains(&kind)
    }

    pub fn needs(&self) -> DataNeeds {
        match self {
            PipelineStage::Benchmark(b) => b.needs(),
            PipelineStage::Metric(m) => m.needs(),
        }
    }

    pub fn market_margin(&self) -> MarketMargin {
        match self {
            PipelineStage::Benchmark(b) => b.market_margin(),
            PipelineStage::Metric(m) => m.market_margin(),
        }
    }

    /// Runs the stage. Benchmarks produce no derived table.
    pub fn apply(
        &self,
        trades: TradeTable,
        market: &MarketSeries,
    ) -> Result<(TradeTable, Option<DerivedTable>), TcaError> {
        match self {
            PipelineStage::Benchmark(b) => Ok((b.calculate(trades, market)?, None)),
            PipelineStage::Metric(m) => {
                let (trades, derived) = m.calculate(trades, market)?;
                Ok((trades, Some(derived)))
            }
        }
    }
}

/// Output of running a pipeline over one ticker's data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOutput {
    pub trades: IndexMap<TradeOrderKind, TradeTable>,
    /// Derived tables keyed `"<metric>_<kind>"`.
    pub derived: IndexMap<String, DerivedTable>,
}

/// Ordered filters, benchmarks and metrics.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    filters: Vec<Arc<dyn TradeOrderFilter>>,
    benchmarks: Vec<Arc<dyn Benchmark>>,
    metrics: Vec<Arc<dyn Metric>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arrival + spread benchmarks with slippage and transient/permanent impact.
    pub fn standard() -> Self {
        Self::new()
            .with_benchmark(ArrivalBenchmark::default())
            .with_benchmark(SpreadToMidBenchmark::default())
            .with_metric(SlippageMetric::default())
            .with_metric(MarketImpactMetric::transient())
            .with_metric(MarketImpactMetric::permanent())
    }

    pub fn with_filter(mut self, filter: impl TradeOrderFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn with_benchmark(mut self, benchmark: impl Benchmark + 'static) -> Self {
        self.benchmarks.push(Arc::new(benchmark));
        self
    }

    pub fn with_metric(mut self, metric: impl Metric + 'static) -> Self {
        self.metrics.push(Arc::new(metric));
        self
    }

    /// Stages in execution order: every benchmark, then every metric.
    pub fn stages(&self) -> Vec<PipelineStage> {
        self.benchmarks
            .iter()
            .cloned()
            .map(PipelineStage::Benchmark)
            .chain(self.metrics.iter().cloned().map(PipelineStage::Metric))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.benchmarks.is_empty() && self.metrics.is_empty()
    }

    /// Widest market window any stage reads around a trade.
    pub fn market_margin(&self) -> MarketMargin {
        self.stages()
            .iter()
            .map(PipelineStage::market_margin)
            .fold(MarketMargin::zero(), MarketMargin::max)
    }

    /// Checks that every column a metric requires is produced by some benchmark.
    pub fn validate(&self) -> Result<(), TcaError> {
        let produced: BTreeSet<String> = self.benchmarks.iter().flat_map(|b| b.produces()).collect();
        for m in &self.metrics {
            if let Some(missing) = m.requires().into_iter().find(|c| !produced.contains(c)) {
                return Err(TcaError::stage(
                    m.name(),
                    format!("requires column {missing:?} but no benchmark produces it"),
                ));
            }
        }
        Ok(())
    }

    /// Applies filters, then benchmarks, then metrics to every trade table.
    pub fn run(
        &self,
        market: &MarketSeries,
        trades: IndexMap<TradeOrderKind, TradeTable>,
    ) -> Result<PipelineOutput, TcaError> {
        let stages = self.stages();
        let mut out = PipelineOutput::default();

        for (kind, table) in trades {
            let mut table = self.filters.iter().fold(table, |t, f| f.filter(t));

            for stage in stages.iter().filter(|s| s.applies_to(kind)) {
                if stage.needs().market && market.is_empty() && !table.is_empty() {
                    let first = table.rows[0].timestamp;
                    let last = table.rows[table.rows.len() - 1].timestamp;
                    return Err(TcaError::DataMissing {
                        ticker: market.ticker.clone(),
                        kind: "market".into(),
                        start: first,
                        finish: last,
                    });
                }
                debug!(stage = stage.name(), %kind, rows = table.len(), "applying stage");
                let (next, derived) = stage.apply(table, market)?;
                table = next;
                if let Some(derived) = derived {
                    out.derived.insert(format!("{}_{}", derived.name, kind), derived);
                }
            }

            out.trades.insert(kind, table);
        }

        Ok(out)
    }
}
