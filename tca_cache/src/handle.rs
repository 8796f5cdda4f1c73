use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque reference to a payload already stored in the cache.
///
/// Cheap to clone and send across task boundaries in place of the payload.
/// Resolve it with [`crate::DistributedCache::resolve_handle`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheHandle {
    name: String,
    expires: bool,
}

impl CacheHandle {
    pub(crate) fn fresh(expires: bool) -> Self {
        Self {
            name: format!("handle_{}", Uuid::new_v4().simple()),
            expires,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the referenced entry was written with a TTL.
    pub fn expires(&self) -> bool {
        self.expires
    }
}
