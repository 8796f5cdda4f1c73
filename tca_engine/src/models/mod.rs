//! Canonical in-memory representation of market ticks, trades/orders and
//! computation requests.

pub mod market;
pub mod period;
pub mod request;
pub mod trade;

pub use market::{MarketField, MarketSeries, MarketTick};
pub use period::ChunkingPeriod;
pub use request::ComputationRequest;
pub use trade::{DerivedRow, DerivedTable, Side, TagField, TradeOrderKind, TradeRecord, TradeTable};
