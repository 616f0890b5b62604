//! Entity-side traits and cache statistics.
//!
//! The cache never reaches into entity internals: it only asks an entity for
//! its type name, its identifier, an attribute by name (for mirrored fields)
//! and its transient TTL overrides.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use kashing_core::{FieldValue, Identifier, KashingResult};

use crate::ttl::TtlOverrides;

/// An entity whose fields can be cached.
///
/// # Implementation Requirements
///
/// - `entity_type()` must return the same name for every instance; it is
///   the first segment of every cache key for this type
/// - `identifier()` must return the instance's primary key
/// - `attribute()` backs fields registered without a producer
pub trait CacheableEntity: Send + Sync + 'static {
    /// Type name used to namespace cache keys.
    fn entity_type() -> &'static str;

    /// Identifier of this instance.
    fn identifier(&self) -> Identifier;

    /// Current value of the named attribute.
    fn attribute(&self, _name: &str) -> Option<FieldValue> {
        None
    }

    /// Per-instance TTL overrides, if the entity carries any.
    fn ttl_overrides(&self) -> Option<&TtlOverrides> {
        None
    }
}

/// Context handed to class-level producers in place of an instance.
pub struct EntityClass<E> {
    _marker: PhantomData<fn() -> E>,
}

impl<E: CacheableEntity> EntityClass<E> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// The entity type name.
    pub fn name(&self) -> &'static str {
        E::entity_type()
    }
}

impl<E: CacheableEntity> Default for EntityClass<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CacheableEntity> fmt::Debug for EntityClass<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityClass").field(&E::entity_type()).finish()
    }
}

/// Loads an entity by identifier for lookups that start from an id alone.
pub trait EntityLoader<E> {
    /// Find the entity, or `None` if it does not exist.
    fn find(&self, identifier: &Identifier) -> KashingResult<Option<E>>;
}

impl<E, F> EntityLoader<E> for F
where
    F: Fn(&Identifier) -> KashingResult<Option<E>>,
{
    fn find(&self, identifier: &Identifier) -> KashingResult<Option<E>> {
        self(identifier)
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered from the backend.
    pub hits: u64,
    /// Reads that found no entry.
    pub misses: u64,
    /// Producer invocations that were written to the backend.
    pub recomputes: u64,
    /// Keys removed by zero-TTL invalidation.
    pub invalidations: u64,
    /// Custom store/parse hooks that failed and fell back to JSON.
    pub hook_fallbacks: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    recomputes: AtomicU64,
    invalidations: AtomicU64,
    hook_fallbacks: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recompute(&self) {
        self.recomputes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hook_fallback(&self) {
        self.hook_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            recomputes: self.recomputes.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            hook_fallbacks: self.hook_fallbacks.load(Ordering::Relaxed),
        }
    }
}
