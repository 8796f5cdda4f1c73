//! Request splitting, cache-or-source loading and chunked parallel
//! orchestration of TCA computations.
//!
//! [`service::TcaService`] ties the pieces together: it validates a
//! [`tca_engine::models::ComputationRequest`], cuts it into calendar-aligned
//! children with [`splitter`], runs them through the
//! [`orchestrator::Orchestrator`] and reassembles a
//! [`result::ResultHolder`].

pub mod config;
pub mod demo;
pub mod loader;
pub mod orchestrator;
pub mod result;
pub mod service;
pub mod splitter;

pub use config::{LoaderConfig, OrchestratorConfig, RequestOverrides, TcaConfig, load_config_path, load_config_str};
pub use orchestrator::{BatchOutcome, BatchState, Orchestrator, SubRequestWorker, WorkerOutput};
pub use result::{ResultHolder, SubResult};
pub use service::{PipelineWorker, TcaService};
