//! Dense market observations (quotes/ticks).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single top-of-book observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTick {
    /// Observation time (UTC).
    pub timestamp: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
    pub mid: f64,
    /// Traded volume attributed to this observation (0 for pure quotes).
    pub volume: f64,
}

impl MarketTick {
    /// Builds a tick from bid/ask, deriving the mid.
    pub fn from_quote(timestamp: DateTime<Utc>, bid: f64, ask: f64, volume: f64) -> Self {
        Self {
            timestamp,
            bid,
            ask,
            mid: (bid + ask) / 2.0,
            volume,
        }
    }

    /// Builds a tick where only a single price is known (bid = ask = mid).
    pub fn from_mid(timestamp: DateTime<Utc>, mid: f64) -> Self {
        Self {
            timestamp,
            bid: mid,
            ask: mid,
            mid,
            volume: 0.0,
        }
    }

    pub fn field(&self, field: MarketField) -> f64 {
        match field {
            MarketField::Bid => self.bid,
            MarketField::Ask => self.ask,
            MarketField::Mid => self.mid,
            MarketField::Volume => self.volume,
        }
    }
}

/// Numeric column of a [`MarketTick`] that can be looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketField {
    Bid,
    Ask,
    Mid,
    Volume,
}

impl MarketField {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MarketField::Bid => "bid",
            MarketField::Ask => "ask",
            MarketField::Mid => "mid",
            MarketField::Volume => "volume",
        }
    }
}

/// Time-ordered market observations for one ticker.
///
/// Alignment requires `ticks` to be non-decreasing in time; loaders sort and
/// de-duplicate before handing a series to the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSeries {
    pub ticker: String,
    pub ticks: Vec<MarketTick>,
}

impl MarketSeries {
    pub fn new(ticker: impl Into<String>, ticks: Vec<MarketTick>) -> Self {
        Self {
            ticker: ticker.into(),
            ticks,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    /// Timestamp index used for alignment searches.
    pub fn index(&self) -> Vec<DateTime<Utc>> {
        self.ticks.iter().map(|t| t.timestamp).collect()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.ticks.first().map(|t| t.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.ticks.last().map(|t| t.timestamp)
    }
}
