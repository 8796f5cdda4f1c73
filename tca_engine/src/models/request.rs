use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    errors::TcaError,
    models::{period::ChunkingPeriod, trade::TradeOrderKind},
    pipeline::Pipeline,
};

/// Default number of total batch attempts before a computation is reported as failed.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// A top-level TCA computation over `[start, finish]` (both inclusive) for one ticker.
///
/// Child requests produced by the splitter are structurally identical copies
/// with a narrowed range; the pipeline is shared, not cloned.
#[derive(Debug, Clone)]
pub struct ComputationRequest {
    pub ticker: String,
    pub start: DateTime<Utc>,
    pub finish: DateTime<Utc>,
    pub chunking_period: ChunkingPeriod,
    pub trade_order_kinds: Vec<TradeOrderKind>,
    pub pipeline: Arc<Pipeline>,
    pub use_parallel: bool,
    pub max_attempts: u32,
}

impl ComputationRequest {
    pub fn new(
        ticker: impl Into<String>,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
        pipeline: Arc<Pipeline>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            start,
            finish,
            chunking_period: ChunkingPeriod::Month,
            trade_order_kinds: vec![TradeOrderKind::Trade],
            pipeline,
            use_parallel: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_chunking_period(mut self, period: ChunkingPeriod) -> Self {
        self.chunking_period = period;
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<TradeOrderKind>) -> Self {
        self.trade_order_kinds = kinds;
        self
    }

    pub fn with_parallel(mut self, use_parallel: bool) -> Self {
        self.use_parallel = use_parallel;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Copy of this request narrowed to `[start, finish]`.
    pub fn with_range(&self, start: DateTime<Utc>, finish: DateTime<Utc>) -> Self {
        Self {
            start,
            finish,
            ..self.clone()
        }
    }

    /// Rejects malformed requests before any work is dispatched.
    ///
    /// `now` is passed in so callers (and tests) control what "the future" means.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), TcaError> {
        let ticker = self.ticker.trim();
        if ticker.is_empty() {
            return Err(TcaError::Validation("ticker cannot be empty".into()));
        }
        if ticker.len() != self.ticker.len()
            || !ticker
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '/' | '_'))
        {
            return Err(TcaError::Validation(format!(
                "ticker {:?} contains unsupported characters",
                self.ticker
            )));
        }
        if self.start > self.finish {
            return Err(TcaError::Validation(format!(
                "start {} is after finish {}",
                self.start, self.finish
            )));
        }
        if self.finish > now {
            return Err(TcaError::Validation(format!(
                "finish {} is in the future",
                self.finish
            )));
        }
        if self.max_attempts == 0 {
            return Err(TcaError::Validation("max_attempts must be at least 1".into()));
        }
        let mut kinds = self.trade_order_kinds.clone();
        kinds.sort();
        kinds.dedup();
        if kinds.len() != self.trade_order_kinds.len() {
            return Err(TcaError::Validation(
                "trade_order_kinds contains duplicates".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn req(start: DateTime<Utc>, finish: DateTime<Utc>) -> ComputationRequest {
        ComputationRequest::new("EURUSD", start, finish, Arc::new(Pipeline::default()))
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn accepts_well_formed_request() {
        let r = req(
            Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap(),
        );
        assert!(r.validate(now()).is_ok());
    }

    #[test]
    fn rejects_inverted_range() {
        let r = req(
            Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
        );
        let err = r.validate(now()).unwrap_err();
        assert!(matches!(err, TcaError::Validation(m) if m.contains("after finish")));
    }

    #[test]
    fn rejects_future_finish_and_bad_ticker() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let r = req(start, Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap());
        assert!(r.validate(now()).is_err());

        let mut r = req(start, start);
        r.ticker = "EUR USD".into();
        assert!(r.validate(now()).is_err());
        r.ticker = "  ".into();
        assert!(r.validate(now()).is_err());
    }

    #[test]
    fn child_copy_keeps_everything_but_range() {
        let r = req(
            Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap(),
        )
        .with_kinds(vec![TradeOrderKind::Trade, TradeOrderKind::Order])
        .with_max_attempts(3);
        let s = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let f = Utc.with_ymd_and_hms(2024, 2, 10, 0, 0, 0).unwrap();
        let child = r.with_range(s, f);
        assert_eq!((child.start, child.finish), (s, f));
        assert_eq!(child.trade_order_kinds, r.trade_order_kinds);
        assert_eq!(child.max_attempts, 3);
        assert!(Arc::ptr_eq(&child.pipeline, &r.pipeline));
    }
}
