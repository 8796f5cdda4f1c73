//! The key/value service a [`crate::DistributedCache`] sits on.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::CacheError;

/// Minimal key/value contract: bulk get, put, delete, atomic prefix take and clear.
///
/// Missing keys come back as `None`; errors mean the service itself failed.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CacheError>;

    async fn put(&self, entries: Vec<(String, Vec<u8>)>, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Returns how many keys existed.
    async fn delete(&self, keys: &[String]) -> Result<usize, CacheError>;

    /// Reads and deletes every live key starting with `prefix` as one atomic
    /// step. A failed call removes nothing.
    async fn take_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;
}

#[derive(Debug)]
struct Slot {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|t| now < t)
    }
}

/// In-process [`KvBackend`] with TTL expiry.
///
/// `set_available(false)` makes every call fail with
/// [`CacheError::Unavailable`], standing in for a dropped connection.
#[derive(Debug)]
pub struct MemoryBackend {
    slots: Mutex<HashMap<String, Slot>>,
    available: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots.lock().values().filter(|s| s.live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrites raw bytes under `key`; for simulating corruption.
    pub fn poke(&self, key: &str, bytes: Vec<u8>) {
        self.slots.lock().insert(
            key.to_string(),
            Slot {
                bytes,
                expires_at: None,
            },
        );
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable("memory backend marked unavailable".into()))
        }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        self.check()?;
        let now = Instant::now();
        let mut slots = self.slots.lock();
        slots.retain(|_, s| s.live(now));
        Ok(keys.iter().map(|k| slots.get(k).map(|s| s.bytes.clone())).collect())
    }

    async fn put(&self, entries: Vec<(String, Vec<u8>)>, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.check()?;
        let expires_at = ttl.map(|d| Instant::now() + d);
        let mut slots = self.slots.lock();
        for (k, bytes) in entries {
            slots.insert(k, Slot { bytes, expires_at });
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, CacheError> {
        self.check()?;
        let mut slots = self.slots.lock();
        Ok(keys.iter().filter(|k| slots.remove(*k).is_some()).count())
    }

    async fn take_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, CacheError> {
        self.check()?;
        let now = Instant::now();
        let mut slots = self.slots.lock();
        slots.retain(|_, s| s.live(now));
        let doomed: Vec<String> = slots.keys().filter(|k| k.starts_with(prefix)).cloned().collect();
        Ok(doomed
            .into_iter()
            .filter_map(|k| slots.remove(&k).map(|s| (k, s.bytes)))
            .collect())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.check()?;
        self.slots.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(ks: &[&str]) -> Vec<String> {
        ks.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn take_prefix_removes_only_what_it_returns() {
        let b = MemoryBackend::new();
        b.put(
            vec![
                ("a#0".into(), vec![1]),
                ("a#meta".into(), vec![2]),
                ("b#0".into(), vec![3]),
            ],
            None,
        )
        .await
        .unwrap();
        let mut got = b.take_prefix("a#").await.unwrap();
        got.sort();
        assert_eq!(got, vec![("a#0".into(), vec![1]), ("a#meta".into(), vec![2])]);
        assert!(b.take_prefix("a#").await.unwrap().is_empty());
        assert_eq!(b.get(&keys(&["a#0", "b#0"])).await.unwrap(), vec![None, Some(vec![3])]);
    }

    #[tokio::test]
    async fn ttl_entries_expire() {
        let b = MemoryBackend::new();
        b.put(vec![("h".into(), vec![9])], Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert_eq!(b.len(), 1);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(b.get(&keys(&["h"])).await.unwrap(), vec![None]);
        assert!(b.is_empty());
    }

    #[tokio::test]
    async fn unavailable_backend_errors() {
        let b = MemoryBackend::new();
        b.set_available(false);
        assert!(matches!(
            b.get(&keys(&["a"])).await,
            Err(CacheError::Unavailable(_))
        ));
        b.set_available(true);
        assert_eq!(b.delete(&keys(&["a"])).await.unwrap(), 0);
    }
}
