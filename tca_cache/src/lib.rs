//! Distributed result cache for TCA datasets.
//!
//! - [`key`]: deterministic key strings from (store, ticker, period, kind, offset).
//! - [`codec`]: bincode + zlib payload encoding with size-bounded chunking.
//! - [`backend`]: the key/value service contract and an in-memory implementation.
//! - [`cache`]: [`DistributedCache`], handles and burn-after-reading reads.

pub mod backend;
pub mod cache;
pub mod codec;
pub mod error;
pub mod handle;
pub mod key;

pub use backend::{KvBackend, MemoryBackend};
pub use cache::{CacheConfig, CacheStats, DistributedCache};
pub use codec::{CodecConfig, Payload, PayloadCodec};
pub use error::{CacheError, CodecError};
pub use handle::CacheHandle;
pub use key::{CacheKey, DataKind, make_key};
