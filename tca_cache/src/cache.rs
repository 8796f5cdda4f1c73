//! Chunked, compressed key/value cache over a [`KvBackend`].
//!
//! Layout per entry: blobs at `<key>#0 .. <key>#{n-1}` plus a manifest at
//! `<key>#meta` holding the chunk count, raw sizes, compression flag and the
//! covered time span. The manifest is written last and read first, so a
//! reader never sees a manifest without its chunks.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    backend::KvBackend,
    codec::{self, CodecConfig, Payload, PayloadCodec},
    error::CacheError,
    handle::CacheHandle,
    key::{CacheKey, DataKind, chunk_key, entry_prefix, meta_key},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub codec: CodecConfig,
    /// Lifetime of entries written through [`DistributedCache::put_handle`].
    pub handle_ttl_secs: u64,
    /// Store component of keys; defaults to the data source's name.
    pub store: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            codec: CodecConfig::default(),
            handle_ttl_secs: 3_600,
            store: None,
        }
    }
}

type Span = (DateTime<Utc>, DateTime<Utc>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Manifest {
    chunks: u32,
    raw_sizes: Vec<u64>,
    compressed: bool,
    span: Option<Span>,
}

impl Manifest {
    fn chunk_keys(&self, base: &str) -> Vec<String> {
        (0..self.chunks as usize).map(|i| chunk_key(base, i)).collect()
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub decode_failures: u64,
    pub puts: u64,
    pub put_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    decode_failures: AtomicU64,
    puts: AtomicU64,
    put_failures: AtomicU64,
}

fn bump(c: &AtomicU64) {
    c.fetch_add(1, Ordering::Relaxed);
}

pub struct DistributedCache {
    backend: Arc<dyn KvBackend>,
    codec: PayloadCodec,
    config: CacheConfig,
    counters: Counters,
}

impl std::fmt::Debug for DistributedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl DistributedCache {
    pub fn new(backend: Arc<dyn KvBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            codec: PayloadCodec::new(config.codec.clone()),
            config,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Builds a key carrying this cache's compression flag.
    pub fn key(
        &self,
        store: &str,
        ticker: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        kind: DataKind,
        offset_ms: i64,
    ) -> CacheKey {
        let store = self.config.store.as_deref().unwrap_or(store);
        CacheKey::new(store, ticker, period_start, period_end, kind, offset_ms)
            .with_compressed(self.config.codec.compress)
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            decode_failures: c.decode_failures.load(Ordering::Relaxed),
            puts: c.puts.load(Ordering::Relaxed),
            put_failures: c.put_failures.load(Ordering::Relaxed),
        }
    }

    /// Reads an entry. Absent, incomplete or undecodable entries are `Ok(None)`;
    /// only backend failure is an error.
    pub async fn get<T: Payload>(&self, key: &CacheKey) -> Result<Option<T>, CacheError> {
        self.fetch(&key.encode(), false).await
    }

    /// Bulk [`DistributedCache::get`] in two backend round trips.
    pub async fn get_many<T: Payload>(&self, keys: &[CacheKey]) -> Result<Vec<Option<T>>, CacheError> {
        let bases: Vec<String> = keys.iter().map(CacheKey::encode).collect();
        let metas = self
            .backend
            .get(&bases.iter().map(|b| meta_key(b)).collect::<Vec<_>>())
            .await?;
        let manifests: Vec<Option<Manifest>> = bases
            .iter()
            .zip(metas)
            .map(|(b, m)| m.and_then(|bytes| self.parse_manifest(b, &bytes)))
            .collect();

        let mut all_chunk_keys = Vec::new();
        for (base, m) in bases.iter().zip(&manifests) {
            if let Some(m) = m {
                all_chunk_keys.extend(m.chunk_keys(base));
            }
        }
        let mut blobs = self.backend.get(&all_chunk_keys).await?.into_iter();

        let mut out = Vec::with_capacity(keys.len());
        for (base, m) in bases.iter().zip(manifests) {
            let value = match m {
                Some(m) => {
                    let chunk: Vec<Option<Vec<u8>>> = blobs.by_ref().take(m.chunks as usize).collect();
                    self.assemble(base, &m, chunk)
                }
                None => None,
            };
            self.record_lookup(base, value.is_some());
            out.push(value);
        }
        Ok(out)
    }

    /// Overwrites `key`, dropping any previous chunk set first.
    pub async fn put<T: Payload>(&self, key: &CacheKey, payload: &T) -> Result<(), CacheError> {
        self.write(&key.encode(), payload, None).await
    }

    /// [`DistributedCache::put`] that refuses to replace an entry covering a
    /// different but overlapping time span.
    pub async fn put_checked<T: Payload>(&self, key: &CacheKey, payload: &T) -> Result<(), CacheError> {
        let base = key.encode();
        let existing = self.read_manifest(&base).await?.and_then(|m| m.span);
        if let (Some(existing), Some(incoming)) = (existing, payload.time_span()) {
            let overlaps = existing.0 <= incoming.1 && incoming.0 <= existing.1;
            if existing != incoming && overlaps {
                bump(&self.counters.put_failures);
                return Err(CacheError::WriteConflict {
                    key: base,
                    existing: fmt_span(existing),
                    incoming: fmt_span(incoming),
                });
            }
        }
        self.write(&base, payload, None).await
    }

    /// Stores `payload` under a fresh TTL-bound name and returns its handle.
    pub async fn put_handle<T: Payload>(&self, payload: &T) -> Result<CacheHandle, CacheError> {
        let handle = CacheHandle::fresh(true);
        let ttl = Duration::from_secs(self.config.handle_ttl_secs);
        self.write(handle.name(), payload, Some(ttl)).await?;
        Ok(handle)
    }

    /// Resolves a handle. With `burn_after_reading` the entry is removed as it
    /// is read, so a second resolve returns `None`.
    pub async fn resolve_handle<T: Payload>(
        &self,
        handle: &CacheHandle,
        burn_after_reading: bool,
    ) -> Result<Option<T>, CacheError> {
        self.fetch(handle.name(), burn_after_reading).await
    }

    /// Drops a handle's entry unread. Returns whether it existed.
    pub async fn discard_handle(&self, handle: &CacheHandle) -> Result<bool, CacheError> {
        Ok(self.remove_entry(handle.name()).await? > 0)
    }

    /// Burn-after-reading [`DistributedCache::get`].
    pub async fn take<T: Payload>(&self, key: &CacheKey) -> Result<Option<T>, CacheError> {
        self.fetch(&key.encode(), true).await
    }

    /// Deletes an entry and its chunks. Returns whether it existed.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let base = key.encode();
        Ok(self.remove_entry(&base).await? > 0)
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.backend.clear().await
    }

    fn parse_manifest(&self, base: &str, bytes: &[u8]) -> Option<Manifest> {
        match codec::deserialize::<Manifest>(bytes) {
            Ok(m) => Some(m),
            Err(e) => {
                bump(&self.counters.decode_failures);
                warn!(key = %base, error = %e, "unreadable cache manifest; treating as miss");
                None
            }
        }
    }

    async fn read_manifest(&self, base: &str) -> Result<Option<Manifest>, CacheError> {
        let mut got = self.backend.get(&[meta_key(base)]).await?;
        Ok(got.pop().flatten().and_then(|b| self.parse_manifest(base, &b)))
    }

    async fn fetch<T: Payload>(&self, base: &str, burn: bool) -> Result<Option<T>, CacheError> {
        if burn {
            return self.fetch_burning(base).await;
        }
        let Some(manifest) = self.read_manifest(base).await? else {
            self.record_lookup(base, false);
            return Ok(None);
        };
        let chunks = self.backend.get(&manifest.chunk_keys(base)).await?;
        let value = self.assemble(base, &manifest, chunks);
        self.record_lookup(base, value.is_some());
        Ok(value)
    }

    /// Manifest and chunks leave the backend in a single `take_prefix`.
    async fn fetch_burning<T: Payload>(&self, base: &str) -> Result<Option<T>, CacheError> {
        let mut taken: HashMap<String, Vec<u8>> = self
            .backend
            .take_prefix(&entry_prefix(base))
            .await?
            .into_iter()
            .collect();
        let Some(manifest) = taken
            .remove(&meta_key(base))
            .and_then(|b| self.parse_manifest(base, &b))
        else {
            self.record_lookup(base, false);
            return Ok(None);
        };
        let chunks = manifest
            .chunk_keys(base)
            .iter()
            .map(|k| taken.remove(k))
            .collect();
        let value = self.assemble(base, &manifest, chunks);
        self.record_lookup(base, value.is_some());
        Ok(value)
    }

    fn assemble<T: Payload>(&self, base: &str, manifest: &Manifest, chunks: Vec<Option<Vec<u8>>>) -> Option<T> {
        let found = chunks.len();
        let blobs: Option<Vec<Vec<u8>>> = chunks.into_iter().collect();
        let Some(blobs) = blobs.filter(|b| b.len() == manifest.chunks as usize) else {
            warn!(key = %base, expected = manifest.chunks, found, "incomplete chunk set; treating as miss");
            return None;
        };
        match self
            .codec
            .decode::<T>(&blobs, &manifest.raw_sizes, manifest.compressed)
        {
            Ok(v) => Some(v),
            Err(e) => {
                bump(&self.counters.decode_failures);
                warn!(key = %base, error = %e, "cache decode failed; treating as miss");
                None
            }
        }
    }

    fn record_lookup(&self, base: &str, hit: bool) {
        if hit {
            bump(&self.counters.hits);
            debug!(key = %base, "cache hit");
        } else {
            bump(&self.counters.misses);
            debug!(key = %base, "cache miss");
        }
    }

    async fn remove_entry(&self, base: &str) -> Result<usize, CacheError> {
        let mut doomed = vec![meta_key(base)];
        if let Some(old) = self.read_manifest(base).await? {
            doomed.extend(old.chunk_keys(base));
        }
        self.backend.delete(&doomed).await
    }

    async fn write<T: Payload>(&self, base: &str, payload: &T, ttl: Option<Duration>) -> Result<(), CacheError> {
        let result = self.write_inner(base, payload, ttl).await;
        match &result {
            Ok(chunks) => {
                bump(&self.counters.puts);
                debug!(key = %base, chunks, "cache put");
            }
            Err(e) => {
                bump(&self.counters.put_failures);
                warn!(key = %base, error = %e, "cache put failed");
            }
        }
        result.map(|_| ())
    }

    async fn write_inner<T: Payload>(
        &self,
        base: &str,
        payload: &T,
        ttl: Option<Duration>,
    ) -> Result<usize, CacheError> {
        let encoded = self.codec.encode(payload)?;
        let manifest = Manifest {
            chunks: encoded.chunk_count() as u32,
            raw_sizes: encoded.raw_sizes.clone(),
            compressed: encoded.compressed,
            span: payload.time_span(),
        };
        let meta_bytes = codec::serialize(&manifest)?;

        self.remove_entry(base).await?;

        let chunks = encoded.chunk_count();
        let mut entries: Vec<(String, Vec<u8>)> = encoded
            .blobs
            .into_iter()
            .enumerate()
            .map(|(i, b)| (chunk_key(base, i), b))
            .collect();
        entries.push((meta_key(base), meta_bytes));
        self.backend.put(entries, ttl).await?;
        Ok(chunks)
    }
}

fn fmt_span((a, b): Span) -> String {
    format!(
        "[{} .. {}]",
        tca_engine::tz::to_rfc3339_millis(a),
        tca_engine::tz::to_rfc3339_millis(b)
    )
}
