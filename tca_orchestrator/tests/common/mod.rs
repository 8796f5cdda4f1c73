#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tca_cache::{CacheConfig, DistributedCache, MemoryBackend};
use tca_engine::{
    models::{ComputationRequest, TradeOrderKind},
    pipeline::{Pipeline, VwapBenchmark},
};
use tca_orchestrator::{
    LoaderConfig, TcaConfig,
    demo::{SyntheticSpec, synthetic_source},
};

pub const TICKER: &str = "EURUSD";

pub fn utc(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap()
}

/// Standard stages plus a +-5 minute VWAP, so every alignment direction is exercised.
pub fn full_pipeline() -> Arc<Pipeline> {
    Arc::new(Pipeline::standard().with_benchmark(VwapBenchmark::new(Duration::minutes(5), Duration::minutes(5))))
}

pub fn request(start: DateTime<Utc>, finish: DateTime<Utc>) -> ComputationRequest {
    ComputationRequest::new(TICKER, start, finish, full_pipeline())
        .with_kinds(vec![TradeOrderKind::Trade, TradeOrderKind::Order])
}

/// Synthetic source with one-minute ticks; keeps multi-month runs quick.
pub fn minute_source(start: DateTime<Utc>, finish: DateTime<Utc>, seed: u64) -> tca_engine::source::InMemorySource {
    let mut spec = SyntheticSpec::new(TICKER, start, finish, seed);
    spec.tick_interval = Duration::minutes(1);
    synthetic_source(&spec)
}

pub struct TestCache {
    pub backend: Arc<MemoryBackend>,
    pub cache: Arc<DistributedCache>,
}

pub fn memory_cache() -> TestCache {
    let backend = Arc::new(MemoryBackend::new());
    let cache = Arc::new(DistributedCache::new(backend.clone(), CacheConfig::default()));
    TestCache { backend, cache }
}

pub fn config_without_loader_cache() -> TcaConfig {
    TcaConfig {
        loader: LoaderConfig {
            use_cache: false,
            ..LoaderConfig::default()
        },
        ..TcaConfig::default()
    }
}

pub fn bincode_bytes<T: serde::Serialize>(value: &T) -> Vec<u8> {
    bincode::serde::encode_to_vec(value, bincode::config::standard()).unwrap()
}
