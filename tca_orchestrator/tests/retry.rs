//! Bounded batch retry and fatal short-circuit, driven by scripted workers.

mod common;
use common::{request, utc};

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::{Duration as StdDuration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tca_engine::{
    TcaError,
    models::{ChunkingPeriod, ComputationRequest, MarketSeries, TradeOrderKind, TradeTable},
    source::DataSource,
};
use tca_orchestrator::{
    BatchState, Orchestrator, OrchestratorConfig, SubRequestWorker, SubResult, TcaConfig, TcaService,
    WorkerOutput, splitter,
};

fn empty_result(req: &ComputationRequest) -> SubResult {
    SubResult {
        market: MarketSeries::new(&req.ticker, Vec::new()),
        trades: IndexMap::new(),
        derived: IndexMap::new(),
    }
}

fn children() -> Vec<ComputationRequest> {
    let req = request(utc(2024, 1, 5, 0, 0, 0), utc(2024, 3, 20, 0, 0, 0));
    splitter::split(&req, ChunkingPeriod::Month)
}

fn config(max_attempts: u32, use_parallel: bool) -> OrchestratorConfig {
    OrchestratorConfig {
        max_attempts,
        use_parallel,
        ..OrchestratorConfig::default()
    }
}

/// Fails transiently on every call.
#[derive(Default)]
struct AlwaysTransient {
    calls: AtomicU32,
}

#[async_trait]
impl SubRequestWorker for AlwaysTransient {
    async fn compute(&self, _request: ComputationRequest) -> Result<WorkerOutput, TcaError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TcaError::TransientInfra(format!("backend timeout #{n}")))
    }
}

/// Fails transiently for the first `failures` calls, then succeeds.
struct FlakyThenOk {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait]
impl SubRequestWorker for FlakyThenOk {
    async fn compute(&self, request: ComputationRequest) -> Result<WorkerOutput, TcaError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(TcaError::TransientInfra("connection reset".into()));
        }
        Ok(WorkerOutput::Inline(empty_result(&request)))
    }
}

/// The child starting at `poisoned` fails validation at once; every other child sleeps.
struct OnePoisoned {
    poisoned: DateTime<Utc>,
    calls: AtomicU32,
}

#[async_trait]
impl SubRequestWorker for OnePoisoned {
    async fn compute(&self, request: ComputationRequest) -> Result<WorkerOutput, TcaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.start == self.poisoned {
            return Err(TcaError::Validation(format!("bad child {}", request.start)));
        }
        tokio::time::sleep(StdDuration::from_secs(30)).await;
        Ok(WorkerOutput::Inline(empty_result(&request)))
    }
}

#[tokio::test]
async fn transient_failures_stop_after_max_attempts() {
    let kids = children();
    let worker = Arc::new(AlwaysTransient::default());
    let orch = Orchestrator::new(config(3, true), None);

    let err = orch.run(worker.clone(), kids.clone()).await.unwrap_err();

    match err {
        TcaError::RetriesExhausted { attempts, history, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(history.len(), 3);
            assert!(history[0].starts_with("attempt 1:"));
            assert!(matches!(*last, TcaError::TransientInfra(_)));
        }
        other => panic!("expected RetriesExhausted, got {other}"),
    }
    // every child of every attempt was dispatched
    assert_eq!(worker.calls.load(Ordering::SeqCst), 3 * kids.len() as u32);
}

#[tokio::test]
async fn sequential_batch_stops_at_first_transient_failure() {
    let worker = Arc::new(AlwaysTransient::default());
    let orch = Orchestrator::new(config(3, false), None);

    let err = orch.run(worker.clone(), children()).await.unwrap_err();

    assert!(matches!(err, TcaError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(worker.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn batch_recovers_after_transient_failures() {
    let kids = children();
    let worker = Arc::new(FlakyThenOk {
        failures: 2,
        calls: AtomicU32::new(0),
    });
    let orch = Orchestrator::new(config(5, false), None);

    let outcome = orch.run(worker, kids.clone()).await.unwrap();

    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.results.len(), kids.len());
    assert_eq!(outcome.states.first(), Some(&BatchState::Pending));
    assert!(outcome.states.contains(&BatchState::Retrying { attempt: 2 }));
    assert_eq!(outcome.states.last(), Some(&BatchState::Succeeded { attempt: 3 }));
}

#[tokio::test]
async fn fatal_error_short_circuits_parallel_batch() {
    let kids = children();
    assert!(kids.len() >= 3);
    let worker = Arc::new(OnePoisoned {
        poisoned: kids[1].start,
        calls: AtomicU32::new(0),
    });
    let orch = Orchestrator::new(config(5, true), None);

    let began = Instant::now();
    let err = orch.run(worker.clone(), kids.clone()).await.unwrap_err();

    assert!(matches!(err, TcaError::Validation(_)), "{err}");
    assert!(began.elapsed() < StdDuration::from_secs(10), "waited for sleeping children");
    // no second attempt was dispatched
    assert!(worker.calls.load(Ordering::SeqCst) <= kids.len() as u32);
}

#[tokio::test]
async fn fatal_error_short_circuits_sequential_batch() {
    let kids = children();
    let worker = Arc::new(OnePoisoned {
        poisoned: kids[0].start,
        calls: AtomicU32::new(0),
    });
    let orch = Orchestrator::new(config(5, false), None);

    let err = orch.run(worker.clone(), kids).await.unwrap_err();

    assert!(matches!(err, TcaError::Validation(_)));
    assert_eq!(worker.calls.load(Ordering::SeqCst), 1);
}

/// A source whose backing store is always timing out.
#[derive(Default)]
struct TimingOutSource {
    market_calls: AtomicU32,
}

#[async_trait]
impl DataSource for TimingOutSource {
    fn store_name(&self) -> &str {
        "flaky"
    }

    async fn fetch_market(
        &self,
        _ticker: &str,
        _start: DateTime<Utc>,
        _finish: DateTime<Utc>,
    ) -> Result<MarketSeries, TcaError> {
        self.market_calls.fetch_add(1, Ordering::SeqCst);
        Err(TcaError::TransientInfra("market store timed out".into()))
    }

    async fn fetch_trades(
        &self,
        _ticker: &str,
        _start: DateTime<Utc>,
        _finish: DateTime<Utc>,
        _kind: TradeOrderKind,
    ) -> Result<TradeTable, TcaError> {
        Err(TcaError::TransientInfra("trade store timed out".into()))
    }
}

#[tokio::test]
async fn request_max_attempts_bounds_service_retries() {
    let src = Arc::new(TimingOutSource::default());
    let service = TcaService::new(src.clone(), None, TcaConfig::default());
    let req = request(utc(2024, 1, 5, 0, 0, 0), utc(2024, 1, 5, 12, 0, 0))
        .with_chunking_period(ChunkingPeriod::Day)
        .with_max_attempts(3);

    let err = service.compute(req).await.unwrap_err();

    assert!(matches!(err, TcaError::RetriesExhausted { attempts: 3, .. }), "{err}");
    assert_eq!(src.market_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn service_built_requests_use_configured_attempts() {
    let src = Arc::new(TimingOutSource::default());
    let mut config = TcaConfig::default();
    config.orchestrator.max_attempts = 2;
    config.orchestrator.use_parallel = false;
    let service = TcaService::new(src.clone(), None, config);
    let req = service
        .request(
            "EURUSD",
            utc(2024, 1, 5, 0, 0, 0),
            utc(2024, 1, 5, 12, 0, 0),
            common::full_pipeline(),
        )
        .with_chunking_period(ChunkingPeriod::Day);
    assert!(!req.use_parallel);

    let err = service.compute(req).await.unwrap_err();

    assert!(matches!(err, TcaError::RetriesExhausted { attempts: 2, .. }), "{err}");
    assert_eq!(src.market_calls.load(Ordering::SeqCst), 2);
}
