//! The process-wide entry point: built once, passed by reference.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tca_cache::DistributedCache;
use tca_engine::{TcaError, models::ComputationRequest, pipeline::Pipeline, series, source::DataSource};
use tracing::{info, warn};

use crate::{
    config::{RequestOverrides, TcaConfig},
    loader::CachedLoader,
    orchestrator::{BatchOutcome, Orchestrator, SubRequestWorker, WorkerOutput},
    result::{ResultHolder, SubResult},
    splitter,
};

/// Loads one child's data, runs its pipeline and trims the result to the child range.
pub struct PipelineWorker {
    loader: Arc<CachedLoader>,
    cache: Option<Arc<DistributedCache>>,
    return_handles: bool,
}

impl PipelineWorker {
    pub fn new(loader: Arc<CachedLoader>, cache: Option<Arc<DistributedCache>>, return_handles: bool) -> Self {
        Self {
            loader,
            cache,
            return_handles,
        }
    }

    pub async fn compute_inline(&self, request: &ComputationRequest) -> Result<SubResult, TcaError> {
        let margin = request.pipeline.market_margin();
        let (mut market, trades) = self.loader.load_for(request, margin.before, margin.after).await?;
        let out = request.pipeline.run(&market, trades)?;
        series::trim(&mut market.ticks, request.start, request.finish);
        Ok(SubResult {
            market,
            trades: out.trades,
            derived: out.derived,
        })
    }
}

#[async_trait]
impl SubRequestWorker for PipelineWorker {
    async fn compute(&self, request: ComputationRequest) -> Result<WorkerOutput, TcaError> {
        let result = self.compute_inline(&request).await?;
        if !self.return_handles {
            return Ok(WorkerOutput::Inline(result));
        }
        let Some(cache) = self.cache.as_ref() else {
            return Ok(WorkerOutput::Inline(result));
        };
        match cache.put_handle(&result).await {
            Ok(handle) => Ok(WorkerOutput::Handle(handle)),
            Err(e) => {
                warn!(ticker = %request.ticker, error = %e, "could not stash sub-result; returning inline");
                Ok(WorkerOutput::Inline(result))
            }
        }
    }
}

pub struct TcaService {
    cache: Option<Arc<DistributedCache>>,
    config: TcaConfig,
    loader: Arc<CachedLoader>,
}

impl TcaService {
    pub fn new(source: Arc<dyn DataSource>, cache: Option<Arc<DistributedCache>>, config: TcaConfig) -> Self {
        let loader = Arc::new(CachedLoader::new(source, cache.clone(), config.loader.clone()));
        Self {
            cache,
            config,
            loader,
        }
    }

    pub fn config(&self) -> &TcaConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<DistributedCache>> {
        self.cache.as_ref()
    }

    /// A request whose `use_parallel` and `max_attempts` come from this
    /// service's orchestrator configuration.
    pub fn request(
        &self,
        ticker: impl Into<String>,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
        pipeline: Arc<Pipeline>,
    ) -> ComputationRequest {
        ComputationRequest::new(ticker, start, finish, pipeline)
            .with_parallel(self.config.orchestrator.use_parallel)
            .with_max_attempts(self.config.orchestrator.max_attempts)
    }

    pub async fn compute(&self, request: ComputationRequest) -> Result<ResultHolder, TcaError> {
        self.compute_with(request, &RequestOverrides::default()).await
    }

    /// Validates, splits, dispatches and reassembles one request.
    ///
    /// The request's own `use_parallel`, `max_attempts` and `chunking_period`
    /// are used as given (see [`TcaService::request`]); `overrides` replace them.
    pub async fn compute_with(
        &self,
        mut request: ComputationRequest,
        overrides: &RequestOverrides,
    ) -> Result<ResultHolder, TcaError> {
        if let Some(p) = overrides.chunking_period {
            request.chunking_period = p;
        }
        if let Some(v) = overrides.use_parallel {
            request.use_parallel = v;
        }
        if let Some(v) = overrides.max_attempts {
            request.max_attempts = v;
        }
        request.validate(Utc::now())?;
        request.pipeline.validate()?;

        let mut orch_config = self.config.orchestrator.with_overrides(overrides);
        orch_config.use_parallel = request.use_parallel;
        orch_config.max_attempts = request.max_attempts;

        let children = splitter::split(&request, request.chunking_period);
        info!(
            ticker = %request.ticker,
            start = %request.start,
            finish = %request.finish,
            children = children.len(),
            parallel = orch_config.use_parallel,
            "computing"
        );

        let worker = Arc::new(PipelineWorker::new(
            self.loader.clone(),
            self.cache.clone(),
            orch_config.return_cache_handles,
        ));
        let orchestrator = Orchestrator::new(orch_config, self.cache.clone());
        let BatchOutcome { results, attempts, .. } = orchestrator.run(worker, children).await?;

        let holder = ResultHolder::assemble(&request.ticker, request.start, request.finish, results);
        info!(
            ticker = %request.ticker,
            attempts,
            trades = holder.trade_count(),
            ticks = holder.market.len(),
            "computation finished"
        );
        Ok(holder)
    }
}
