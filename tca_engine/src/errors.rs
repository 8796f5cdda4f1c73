use chrono::{DateTime, Utc};
use thiserror::Error;

/// Whether an error may be cured by re-running the same work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Abort the whole computation immediately; never retried.
    Fatal,
    /// Assumed to be temporary infrastructure trouble; eligible for bounded retry.
    Transient,
}

/// The unified error type for TCA computations.
///
/// Every error raised while computing a sub-request propagates to the
/// orchestrator unmodified; the orchestrator decides what to do with it by
/// calling [`TcaError::class`].
#[derive(Debug, Error)]
pub enum TcaError {
    /// Malformed request (bad ticker, start after finish, finish in the future, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Query timestamps fall outside the market series supplied for alignment.
    #[error(
        "Time range overlap error: queries [{query_first} .. {query_last}] are not strictly inside series [{series_first:?} .. {series_last:?}]"
    )]
    TimeRangeOverlap {
        query_first: DateTime<Utc>,
        query_last: DateTime<Utc>,
        series_first: Option<DateTime<Utc>>,
        series_last: Option<DateTime<Utc>>,
    },

    /// No data at all exists for the requested scope.
    #[error("No {kind} data for {ticker} between {start} and {finish}")]
    DataMissing {
        ticker: String,
        kind: String,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    },

    /// A write would overlap an existing cache entry covering a different range.
    #[error("Cache write conflict on {key}: {message}")]
    CacheWriteConflict { key: String, message: String },

    /// The cache backing service or the worker pool is unreachable or timed out.
    #[error("Transient infrastructure error: {0}")]
    TransientInfra(String),

    /// A pipeline stage could not compute its output.
    #[error("Stage {stage} failed: {message}")]
    Stage { stage: String, message: String },

    /// All batch attempts failed with transient errors.
    #[error("Computation failed after {attempts} attempts: {last} (history: {})", .history.join(" | "))]
    RetriesExhausted {
        attempts: u32,
        history: Vec<String>,
        #[source]
        last: Box<TcaError>,
    },
}

impl TcaError {
    /// Classifies the error by variant.
    pub fn class(&self) -> ErrorClass {
        match self {
            TcaError::TransientInfra(_) => ErrorClass::Transient,
            TcaError::Validation(_)
            | TcaError::TimeRangeOverlap { .. }
            | TcaError::DataMissing { .. }
            | TcaError::CacheWriteConflict { .. }
            | TcaError::Stage { .. }
            | TcaError::RetriesExhausted { .. } => ErrorClass::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }

    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        TcaError::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}
