//! Kashing Storage - Key-Value Backend Trait and Implementations
//!
//! Defines the minimal key-value surface the cache engine consumes and ships
//! three implementations:
//!
//! - [`InMemoryBackend`]: process-local map, used in tests and single-process
//!   deployments
//! - [`LmdbBackend`]: persistent LMDB store via heed
//! - `RedisBackend` (feature `redis`): the production backend
//!
//! All expiry timing belongs to the backend. The engine never runs timers.

pub mod lmdb_backend;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_backend;

pub use lmdb_backend::{LmdbBackend, LmdbBackendError};
pub use memory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;

use std::sync::Arc;
use std::time::Duration;

use kashing_core::KashingResult;

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// Key-value backend consumed by the cache engine.
///
/// Implementations must be safe for concurrent use; the engine shares one
/// backend between all callers. Every method is a blocking round trip.
///
/// # Semantics
///
/// - `set` stores the value and clears any expiry previously attached to the
///   key, like Redis `SET`.
/// - `expire` with a zero duration removes the key.
/// - `delete` and `expire` report whether the key existed.
pub trait KvBackend: Send + Sync {
    /// Fetch the value stored at `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> KashingResult<Option<String>>;

    /// Store `value` at `key` without an expiry.
    fn set(&self, key: &str, value: &str) -> KashingResult<()>;

    /// Remove `key`. Returns true if a key was removed.
    fn delete(&self, key: &str) -> KashingResult<bool>;

    /// Attach an expiry to `key`. Returns false if the key is absent.
    fn expire(&self, key: &str, ttl: Duration) -> KashingResult<bool>;
}

impl<B: KvBackend + ?Sized> KvBackend for Arc<B> {
    fn get(&self, key: &str) -> KashingResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> KashingResult<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> KashingResult<bool> {
        (**self).delete(key)
    }

    fn expire(&self, key: &str, ttl: Duration) -> KashingResult<bool> {
        (**self).expire(key, ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arc_dyn_backend_delegates() {
        let backend: Arc<dyn KvBackend> = Arc::new(InMemoryBackend::new());
        backend.set("RocketShip_7_title", "\"Apollo\"").unwrap();
        assert_eq!(
            backend.get("RocketShip_7_title").unwrap().as_deref(),
            Some("\"Apollo\"")
        );
        assert!(backend.expire("RocketShip_7_title", Duration::from_secs(5)).unwrap());
        assert!(backend.delete("RocketShip_7_title").unwrap());
        assert!(!backend.delete("RocketShip_7_title").unwrap());
    }
}
