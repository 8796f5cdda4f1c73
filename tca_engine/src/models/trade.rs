//! Sparse trade/order events and the tables derived from them.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::TcaError;

/// Which trade/order table a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOrderKind {
    /// Child executions (fills).
    Trade,
    /// Parent orders.
    Order,
}

impl TradeOrderKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TradeOrderKind::Trade => "trade",
            TradeOrderKind::Order => "order",
        }
    }
}

impl fmt::Display for TradeOrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeOrderKind {
    type Err = TcaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trade" | "trades" => Ok(TradeOrderKind::Trade),
            "order" | "orders" => Ok(TradeOrderKind::Order),
            other => Err(TcaError::Validation(format!(
                "unknown trade/order kind: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells.
    pub const fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

/// Descriptive tag on a trade that filters and summaries can group by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagField {
    Venue,
    Broker,
    Algo,
}

/// One trade or order event.
///
/// Benchmarks and metrics append named numeric columns to `fields` and record
/// the market timestamp their value was observed at in `observed_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub side: Side,
    pub executed_price: f64,
    pub executed_notional: f64,
    pub venue: Option<String>,
    pub broker: Option<String>,
    pub algo: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, f64>,
    #[serde(default)]
    pub observed_at: BTreeMap<String, DateTime<Utc>>,
}

impl TradeRecord {
    pub fn new(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        side: Side,
        executed_price: f64,
        executed_notional: f64,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            side,
            executed_price,
            executed_notional,
            venue: None,
            broker: None,
            algo: None,
            fields: BTreeMap::new(),
            observed_at: BTreeMap::new(),
        }
    }

    pub fn with_venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }

    pub fn with_broker(mut self, broker: impl Into<String>) -> Self {
        self.broker = Some(broker.into());
        self
    }

    pub fn with_algo(mut self, algo: impl Into<String>) -> Self {
        self.algo = Some(algo.into());
        self
    }

    pub fn tag(&self, tag: TagField) -> Option<&str> {
        match tag {
            TagField::Venue => self.venue.as_deref(),
            TagField::Broker => self.broker.as_deref(),
            TagField::Algo => self.algo.as_deref(),
        }
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }
}

/// All records of one [`TradeOrderKind`] for a ticker, time-ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeTable {
    pub kind: TradeOrderKind,
    pub rows: Vec<TradeRecord>,
}

impl TradeTable {
    pub fn new(kind: TradeOrderKind, rows: Vec<TradeRecord>) -> Self {
        Self { kind, rows }
    }

    pub fn empty(kind: TradeOrderKind) -> Self {
        Self {
            kind,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.rows.iter().map(|r| r.timestamp).collect()
    }
}

/// One output row of a metric stage, keyed back to the trade it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedRow {
    pub trade_id: String,
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, f64>,
}

/// Side output of a metric stage (e.g. the per-trade slippage table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedTable {
    pub name: String,
    pub rows: Vec<DerivedRow>,
}

impl DerivedTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}
