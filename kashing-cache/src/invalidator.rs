//! Single-key invalidation.
//!
//! `ttl == 0` deletes the key. A positive TTL re-arms the key's expiry in
//! place; if the key is absent the call does nothing.

use std::sync::Arc;
use std::time::Duration;

use kashing_core::KashingResult;
use kashing_storage::KvBackend;
use tracing::debug;

use crate::key::CacheKey;
use crate::traits::StatsRecorder;

/// Clears or re-arms individual cache keys.
pub struct Invalidator<B: KvBackend> {
    backend: Arc<B>,
    stats: Arc<StatsRecorder>,
}

impl<B: KvBackend> Invalidator<B> {
    pub(crate) fn new(backend: Arc<B>, stats: Arc<StatsRecorder>) -> Self {
        Self { backend, stats }
    }

    /// Delete `key` (`ttl` zero) or extend its expiry.
    ///
    /// Returns whether the backend touched a key. Clearing an absent key is
    /// not an error.
    pub fn clear_one(&self, key: &CacheKey, ttl: Duration) -> KashingResult<bool> {
        if ttl.is_zero() {
            let deleted = self.backend.delete(key.as_str())?;
            if deleted {
                self.stats.record_invalidation();
            }
            debug!(key = %key, deleted, "Invalidated cached field");
            return Ok(deleted);
        }

        let armed = self.backend.expire(key.as_str(), ttl)?;
        debug!(
            key = %key,
            ttl_ms = ttl.as_millis() as u64,
            armed,
            "Re-armed cached field expiry"
        );
        Ok(armed)
    }
}

impl<B: KvBackend> Clone for Invalidator<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            stats: Arc::clone(&self.stats),
        }
    }
}
