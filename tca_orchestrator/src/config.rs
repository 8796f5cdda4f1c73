//! Service configuration: TOML file, environment overrides and per-call overrides.
//!
//! Precedence, lowest to highest: [`Default`] values, the TOML file,
//! `TCA_*` environment variables, then a [`RequestOverrides`] passed with a
//! single computation.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use shared_utils::{config::ConfigError, env::parse_env_var};
use tca_cache::CacheConfig;
use tca_engine::models::{ChunkingPeriod, request::DEFAULT_MAX_ATTEMPTS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Granularity of cache entries; fetches are rounded out to whole periods.
    pub cache_period: ChunkingPeriod,
    /// Shift applied to market timestamps (e.g. feed latency); part of the cache key.
    pub market_offset_ms: i64,
    /// Extra market context fetched on both sides of a sub-request, on top of
    /// what the pipeline's stages ask for.
    pub market_padding_secs: u64,
    /// Bypass the cache entirely when false.
    pub use_cache: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_period: ChunkingPeriod::Month,
            market_offset_ms: 0,
            market_padding_secs: 300,
            use_cache: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    pub use_parallel: bool,
    pub max_attempts: u32,
    pub max_workers: usize,
    /// Linear backoff between batch attempts: `retry_backoff_ms * attempt`. 0 disables.
    pub retry_backoff_ms: u64,
    /// Workers hand back a cache handle instead of the sub-result itself.
    pub return_cache_handles: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            use_parallel: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_workers: 4,
            retry_backoff_ms: 0,
            return_cache_handles: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TcaConfig {
    pub cache: CacheConfig,
    pub loader: LoaderConfig,
    pub orchestrator: OrchestratorConfig,
}

impl TcaConfig {
    /// Applies `TCA_MAX_ATTEMPTS`, `TCA_USE_PARALLEL`, `TCA_MAX_WORKERS` and
    /// `TCA_CHUNK_THRESHOLD_BYTES` when set.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = parse_env_var::<u32>("TCA_MAX_ATTEMPTS")? {
            self.orchestrator.max_attempts = v;
        }
        if let Some(v) = parse_env_var::<bool>("TCA_USE_PARALLEL")? {
            self.orchestrator.use_parallel = v;
        }
        if let Some(v) = parse_env_var::<usize>("TCA_MAX_WORKERS")? {
            self.orchestrator.max_workers = v;
        }
        if let Some(v) = parse_env_var::<usize>("TCA_CHUNK_THRESHOLD_BYTES")? {
            self.cache.codec.chunk_threshold_bytes = v;
        }
        Ok(())
    }

    /// [`TcaConfig::apply_env_overrides`] followed by the same checks a
    /// loaded file gets.
    pub fn with_env_overrides(mut self) -> anyhow::Result<Self> {
        self.apply_env_overrides()
            .context("invalid TCA_* environment override")?;
        self.check().context("invalid TCA config after environment overrides")?;
        Ok(self)
    }

    fn check(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.orchestrator.max_attempts >= 1,
            "orchestrator.max_attempts must be at least 1"
        );
        anyhow::ensure!(
            self.orchestrator.max_workers >= 1,
            "orchestrator.max_workers must be at least 1"
        );
        anyhow::ensure!(self.cache.codec.level <= 9, "cache.codec.level must be 0-9");
        Ok(())
    }
}

/// Per-call overrides; `None` keeps the configured value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOverrides {
    pub use_parallel: Option<bool>,
    pub max_attempts: Option<u32>,
    pub max_workers: Option<usize>,
    pub return_cache_handles: Option<bool>,
    pub chunking_period: Option<ChunkingPeriod>,
}

impl OrchestratorConfig {
    pub fn with_overrides(&self, o: &RequestOverrides) -> Self {
        Self {
            use_parallel: o.use_parallel.unwrap_or(self.use_parallel),
            max_attempts: o.max_attempts.unwrap_or(self.max_attempts),
            max_workers: o.max_workers.unwrap_or(self.max_workers),
            return_cache_handles: o.return_cache_handles.unwrap_or(self.return_cache_handles),
            ..self.clone()
        }
    }
}

/// Parses a config TOML string. Missing sections and fields take defaults.
pub fn load_config_str(toml_str: &str) -> anyhow::Result<TcaConfig> {
    let cfg: TcaConfig = toml::from_str(toml_str).context("failed to parse TCA config TOML")?;
    cfg.check().context("invalid TCA config")?;
    Ok(cfg)
}

pub fn load_config_path(path: impl AsRef<Path>) -> anyhow::Result<TcaConfig> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read config file {}", path.as_ref().display()))?;
    load_config_str(&text)
}
