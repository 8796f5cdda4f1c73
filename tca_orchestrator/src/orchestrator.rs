//! Chunked parallel orchestration.
//!
//! One top-level call moves through
//! `Pending -> Dispatched -> (Succeeded | Retrying -> Dispatched | Failed)`.
//! The whole batch is the unit of retry: a transient error from any child
//! re-dispatches every child, a fatal error aborts in-flight children and
//! returns at once. Handles produced by an attempt that is thrown away are
//! dropped from the cache before the next attempt starts.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use tca_cache::{CacheHandle, DistributedCache};
use tca_engine::{TcaError, models::ComputationRequest};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{info, warn};

use crate::{config::OrchestratorConfig, result::SubResult};

/// What a worker hands back for one child request.
#[derive(Debug, Clone)]
pub enum WorkerOutput {
    Inline(SubResult),
    /// The sub-result was stashed in the cache; resolve with burn-after-reading.
    Handle(CacheHandle),
}

/// Computes one child request.
#[async_trait]
pub trait SubRequestWorker: Send + Sync + 'static {
    async fn compute(&self, request: ComputationRequest) -> Result<WorkerOutput, TcaError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Dispatched { attempt: u32 },
    Retrying { attempt: u32 },
    Succeeded { attempt: u32 },
    Failed { attempt: u32 },
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchState::Pending => f.write_str("pending"),
            BatchState::Dispatched { attempt } => write!(f, "dispatched (attempt {attempt})"),
            BatchState::Retrying { attempt } => write!(f, "retrying (after attempt {attempt})"),
            BatchState::Succeeded { attempt } => write!(f, "succeeded (attempt {attempt})"),
            BatchState::Failed { attempt } => write!(f, "failed (attempt {attempt})"),
        }
    }
}

/// Successful batch: sub-results in child order, plus how it got there.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub results: Vec<SubResult>,
    pub attempts: u32,
    pub states: Vec<BatchState>,
}

#[derive(Debug, Default)]
struct StateLog {
    states: Vec<BatchState>,
}

impl StateLog {
    fn enter(&mut self, state: BatchState, children: usize) {
        info!(%state, children, "batch state");
        self.states.push(state);
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    cache: Option<Arc<DistributedCache>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, cache: Option<Arc<DistributedCache>>) -> Self {
        Self { config, cache }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs every child through `worker`, retrying the whole batch on
    /// transient failure up to `config.max_attempts` total tries.
    pub async fn run(
        &self,
        worker: Arc<dyn SubRequestWorker>,
        children: Vec<ComputationRequest>,
    ) -> Result<BatchOutcome, TcaError> {
        let max_attempts = self.config.max_attempts.max(1);
        let n = children.len();
        let mut log = StateLog::default();
        log.enter(BatchState::Pending, n);

        let mut history = Vec::new();
        let mut last = None;

        for attempt in 1..=max_attempts {
            log.enter(BatchState::Dispatched { attempt }, n);
            let mut stray = Vec::new();
            let result = match self.dispatch(&worker, &children, &mut stray).await {
                Ok(outputs) => self.resolve(outputs).await,
                Err(e) => Err(e),
            };
            self.discard(stray).await;

            match result {
                Ok(results) => {
                    log.enter(BatchState::Succeeded { attempt }, n);
                    return Ok(BatchOutcome {
                        results,
                        attempts: attempt,
                        states: log.states,
                    });
                }
                Err(e) if e.is_fatal() => {
                    warn!(attempt, error = %e, "fatal error; aborting batch");
                    log.enter(BatchState::Failed { attempt }, n);
                    return Err(e);
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "transient error in batch");
                    history.push(format!("attempt {attempt}: {e}"));
                    last = Some(e);
                    if attempt < max_attempts {
                        log.enter(BatchState::Retrying { attempt }, n);
                        let backoff = self.config.retry_backoff_ms.saturating_mul(attempt as u64);
                        if backoff > 0 {
                            tokio::time::sleep(Duration::from_millis(backoff)).await;
                        }
                    }
                }
            }
        }

        log.enter(BatchState::Failed { attempt: max_attempts }, n);
        Err(TcaError::RetriesExhausted {
            attempts: max_attempts,
            history,
            last: Box::new(last.unwrap_or_else(|| TcaError::TransientInfra("no attempt was made".into()))),
        })
    }

    async fn dispatch(
        &self,
        worker: &Arc<dyn SubRequestWorker>,
        children: &[ComputationRequest],
        stray: &mut Vec<WorkerOutput>,
    ) -> Result<Vec<WorkerOutput>, TcaError> {
        if !self.config.use_parallel {
            let mut out = Vec::with_capacity(children.len());
            for child in children {
                match worker.compute(child.clone()).await {
                    Ok(o) => out.push(o),
                    Err(e) => {
                        stray.extend(out);
                        return Err(e);
                    }
                }
            }
            return Ok(out);
        }

        let permits = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut set = JoinSet::new();
        for (idx, child) in children.iter().cloned().enumerate() {
            let worker = worker.clone();
            let permits = permits.clone();
            set.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| TcaError::TransientInfra(format!("worker pool closed: {e}")))?;
                worker.compute(child).await.map(|out| (idx, out))
            });
        }

        let mut slots: Vec<Option<WorkerOutput>> = (0..children.len()).map(|_| None).collect();
        let mut transient = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok((idx, out))) => slots[idx] = Some(out),
                Ok(Err(e)) if e.is_fatal() => {
                    set.abort_all();
                    // children that finished before the abort landed
                    while let Some(joined) = set.join_next().await {
                        if let Ok(Ok((_, out))) = joined {
                            stray.push(out);
                        }
                    }
                    stray.extend(slots.into_iter().flatten());
                    return Err(e);
                }
                Ok(Err(e)) => {
                    transient.get_or_insert(e);
                }
                Err(join_err) => {
                    transient.get_or_insert(TcaError::TransientInfra(format!("worker task failed: {join_err}")));
                }
            }
        }
        if let Some(e) = transient {
            stray.extend(slots.into_iter().flatten());
            return Err(e);
        }

        if let Some(i) = slots.iter().position(Option::is_none) {
            stray.extend(slots.into_iter().flatten());
            return Err(TcaError::TransientInfra(format!("child {i} produced no result")));
        }
        Ok(slots.into_iter().flatten().collect())
    }

    async fn resolve(&self, outputs: Vec<WorkerOutput>) -> Result<Vec<SubResult>, TcaError> {
        let mut results = Vec::with_capacity(outputs.len());
        let mut pending = outputs.into_iter();
        while let Some(out) = pending.next() {
            match self.resolve_one(out).await {
                Ok(r) => results.push(r),
                Err(e) => {
                    self.discard(pending.collect()).await;
                    return Err(e);
                }
            }
        }
        Ok(results)
    }

    async fn resolve_one(&self, out: WorkerOutput) -> Result<SubResult, TcaError> {
        let h = match out {
            WorkerOutput::Inline(r) => return Ok(r),
            WorkerOutput::Handle(h) => h,
        };
        let cache = self.cache.as_ref().ok_or_else(|| {
            TcaError::Validation("worker returned a cache handle but no cache is configured".into())
        })?;
        cache
            .resolve_handle::<SubResult>(&h, true)
            .await?
            .ok_or_else(|| TcaError::TransientInfra(format!("cache handle {} could not be resolved", h.name())))
    }

    /// Best-effort removal of the handles among `outputs`; anything missed
    /// still expires with the handle TTL.
    async fn discard(&self, outputs: Vec<WorkerOutput>) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let handles = outputs.into_iter().filter_map(|out| match out {
            WorkerOutput::Handle(h) => Some(h),
            WorkerOutput::Inline(_) => None,
        });
        for h in handles {
            if let Err(e) = cache.discard_handle(&h).await {
                warn!(handle = h.name(), error = %e, "could not drop stashed sub-result");
            }
        }
    }
}
