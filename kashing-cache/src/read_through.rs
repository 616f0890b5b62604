//! Read-through field cache.
//!
//! Reads consult the backend first and fall back to the field's producer on
//! a miss. Every write goes through the serializer, so the backend only ever
//! holds encoded text. Class-level fields live at the sentinel key and are
//! recomputed only through the `class_*` accessors.

use std::sync::Arc;
use std::time::Duration;

use kashing_core::{FieldError, FieldValue, Identifier, KashingResult};
use kashing_storage::KvBackend;
use tracing::debug;

use crate::invalidator::Invalidator;
use crate::key::CacheKey;
use crate::registry::{FieldRegistry, FieldSpec};
use crate::serializer::{decode, encode};
use crate::single_flight::KeyLocks;
use crate::traits::{CacheStats, CacheableEntity, EntityClass, EntityLoader, StatsRecorder};
use crate::ttl::resolve_ttl;

/// How concurrent misses on the same key are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecomputeMode {
    /// Every caller that misses runs the producer; the last write wins.
    #[default]
    Racy,
    /// Callers that miss on the same key recompute one at a time; later
    /// callers re-read the value the first one stored.
    SingleFlight,
}

/// Configuration for the field cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Concurrent-miss handling.
    pub recompute_mode: RecomputeMode,
    /// Invalidate every field of an entity before it is created.
    pub clear_before_create: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            recompute_mode: RecomputeMode::Racy,
            clear_before_create: true,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the recompute mode.
    pub fn with_recompute_mode(mut self, mode: RecomputeMode) -> Self {
        self.recompute_mode = mode;
        self
    }

    /// Enable or disable invalidation before create.
    pub fn with_clear_before_create(mut self, enabled: bool) -> Self {
        self.clear_before_create = enabled;
        self
    }
}

/// Field-level cache-aside engine for one entity type.
///
/// # Type Parameters
///
/// - `E`: the cached entity type
/// - `B`: the key-value backend
///
/// # Example
///
/// ```ignore
/// let registry = Arc::new(FieldRegistry::<RocketShip>::new());
/// registry.register("title", FieldOptions::new(), Producer::Attribute);
///
/// let cache = FieldCache::with_defaults(registry, Arc::new(InMemoryBackend::new()));
/// let title = cache.smart_fetch(&ship, "title")?;
/// ```
pub struct FieldCache<E: CacheableEntity, B: KvBackend> {
    registry: Arc<FieldRegistry<E>>,
    backend: Arc<B>,
    config: CacheConfig,
    stats: Arc<StatsRecorder>,
    invalidator: Invalidator<B>,
    key_locks: Arc<KeyLocks>,
}

impl<E: CacheableEntity, B: KvBackend> FieldCache<E, B> {
    /// Create a new field cache.
    pub fn new(registry: Arc<FieldRegistry<E>>, backend: Arc<B>, config: CacheConfig) -> Self {
        let stats = Arc::new(StatsRecorder::default());
        let invalidator = Invalidator::new(Arc::clone(&backend), Arc::clone(&stats));
        Self {
            registry,
            backend,
            config,
            stats,
            invalidator,
            key_locks: Arc::new(KeyLocks::new()),
        }
    }

    /// Create a new field cache with default configuration.
    pub fn with_defaults(registry: Arc<FieldRegistry<E>>, backend: Arc<B>) -> Self {
        Self::new(registry, backend, CacheConfig::default())
    }

    pub fn registry(&self) -> &FieldRegistry<E> {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn invalidator(&self) -> &Invalidator<B> {
        &self.invalidator
    }

    /// Snapshot of the usage counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Handle scoped to one field.
    pub fn field(&self, name: impl Into<String>) -> FieldHandle<'_, E, B> {
        FieldHandle {
            cache: self,
            name: name.into(),
        }
    }

    /// Key of `field` for `identifier`. Class-level fields always resolve to
    /// the sentinel key.
    pub fn key_for(&self, identifier: &Identifier, field: &str) -> CacheKey {
        match self.registry.lookup(field) {
            Some(spec) if spec.is_class_level() => CacheKey::class(E::entity_type(), field),
            _ => CacheKey::new(E::entity_type(), identifier.clone(), field),
        }
    }

    // ------------------------------------------------------------------
    // Instance accessors
    // ------------------------------------------------------------------

    /// Read the cached value of `field` for `identifier`.
    ///
    /// `None` on a miss or for an unregistered field. Never recomputes.
    pub fn get(&self, identifier: &Identifier, field: &str) -> KashingResult<Option<FieldValue>> {
        let Some(spec) = self.registry.lookup(field) else {
            return Ok(None);
        };
        let key = self.spec_key(identifier, &spec);
        self.read(&key, &spec)
    }

    /// Recompute `field` from `entity` and store it.
    ///
    /// Returns the value as decoded back from the backend. `None` for an
    /// unregistered field or a class-level field.
    pub fn set(&self, entity: &E, field: &str) -> KashingResult<Option<FieldValue>> {
        let Some(spec) = self.registry.lookup(field) else {
            debug!(
                entity_type = E::entity_type(),
                field, "Set of unregistered field ignored"
            );
            return Ok(None);
        };
        self.write_instance(entity, &spec)
    }

    /// Cached value of `field`, computing and storing it on a miss unless
    /// the field is `no_auto`. A present value is returned as is.
    pub fn smart_fetch(&self, entity: &E, field: &str) -> KashingResult<Option<FieldValue>> {
        let Some(spec) = self.registry.lookup(field) else {
            return Ok(None);
        };
        let key = self.spec_key(&entity.identifier(), &spec);
        if let Some(value) = self.read(&key, &spec)? {
            return Ok(Some(value));
        }
        if spec.options().no_auto || spec.is_class_level() {
            return Ok(None);
        }
        self.recompute(&key, &spec, || self.write_instance(entity, &spec))
    }

    /// Like [`smart_fetch`](Self::smart_fetch), starting from an identifier.
    /// On a miss the entity is loaded through `loader`; a missing entity
    /// yields `None`.
    pub fn smart_fetch_by_id<L>(
        &self,
        identifier: &Identifier,
        field: &str,
        loader: &L,
    ) -> KashingResult<Option<FieldValue>>
    where
        L: EntityLoader<E> + ?Sized,
    {
        let Some(spec) = self.registry.lookup(field) else {
            return Ok(None);
        };
        let key = self.spec_key(identifier, &spec);
        if let Some(value) = self.read(&key, &spec)? {
            return Ok(Some(value));
        }
        if spec.options().no_auto || spec.is_class_level() {
            return Ok(None);
        }
        let Some(entity) = loader.find(identifier)? else {
            debug!(
                entity_type = E::entity_type(),
                identifier = %identifier,
                field, "Entity not found for cache fill"
            );
            return Ok(None);
        };
        self.recompute(&key, &spec, || self.write_instance(&entity, &spec))
    }

    // ------------------------------------------------------------------
    // Class accessors
    // ------------------------------------------------------------------

    /// Read a class-level field.
    pub fn class_get(&self, field: &str) -> KashingResult<Option<FieldValue>> {
        let Some(spec) = self.class_spec(field)? else {
            return Ok(None);
        };
        self.read(&CacheKey::class(E::entity_type(), field), &spec)
    }

    /// Recompute a class-level field and store it.
    pub fn class_set(&self, field: &str) -> KashingResult<Option<FieldValue>> {
        let Some(spec) = self.class_spec(field)? else {
            return Ok(None);
        };
        self.write_class(&spec)
    }

    /// Cached class-level value, computing it on a miss unless `no_auto`.
    pub fn class_smart_fetch(&self, field: &str) -> KashingResult<Option<FieldValue>> {
        let Some(spec) = self.class_spec(field)? else {
            return Ok(None);
        };
        let key = CacheKey::class(E::entity_type(), field);
        if let Some(value) = self.read(&key, &spec)? {
            return Ok(Some(value));
        }
        if spec.options().no_auto {
            return Ok(None);
        }
        self.recompute(&key, &spec, || self.write_class(&spec))
    }

    // ------------------------------------------------------------------
    // Invalidation
    // ------------------------------------------------------------------

    /// Delete (`ttl` zero) or re-arm one field of `identifier`.
    ///
    /// False for an unregistered field, and for a class-level field
    /// addressed through an instance identifier.
    pub fn clear_field(&self, identifier: &Identifier, field: &str, ttl: Duration) -> KashingResult<bool> {
        let Some(spec) = self.registry.lookup(field) else {
            return Ok(false);
        };
        if spec.is_class_level() && !identifier.is_class() {
            return Ok(false);
        }
        let key = CacheKey::new(E::entity_type(), identifier.clone(), field);
        self.invalidator.clear_one(&key, ttl)
    }

    /// Re-arm one field of `entity` with `ttl`, or with its resolved TTL when
    /// `ttl` is `None`. With nothing to resolve the key is deleted.
    pub fn expire_field(&self, entity: &E, field: &str, ttl: Option<Duration>) -> KashingResult<bool> {
        let Some(spec) = self.registry.lookup(field) else {
            return Ok(false);
        };
        if spec.is_class_level() {
            return Ok(false);
        }
        let ttl = ttl
            .or_else(|| resolve_ttl(Some(entity), &spec))
            .unwrap_or(Duration::ZERO);
        let key = CacheKey::new(E::entity_type(), entity.identifier(), field);
        self.invalidator.clear_one(&key, ttl)
    }

    /// Apply [`clear_field`](Self::clear_field) to every instance-scoped
    /// field of `identifier`.
    pub fn clear_all(&self, identifier: &Identifier, ttl: Duration) -> KashingResult<bool> {
        for spec in self.registry.specs() {
            if spec.is_class_level() {
                continue;
            }
            let key = CacheKey::new(E::entity_type(), identifier.clone(), spec.name());
            self.invalidator.clear_one(&key, ttl)?;
        }
        Ok(true)
    }

    /// Delete or re-arm every class-level field.
    pub fn clear_class(&self, ttl: Duration) -> KashingResult<bool> {
        for spec in self.registry.specs() {
            if !spec.is_class_level() {
                continue;
            }
            self.invalidator
                .clear_one(&CacheKey::class(E::entity_type(), spec.name()), ttl)?;
        }
        Ok(true)
    }

    /// Delete or re-arm one class-level field.
    pub fn clear_class_field(&self, field: &str, ttl: Duration) -> KashingResult<bool> {
        let Some(spec) = self.class_spec(field)? else {
            return Ok(false);
        };
        self.invalidator
            .clear_one(&CacheKey::class(E::entity_type(), spec.name()), ttl)
    }

    /// Recompute and store every instance-scoped field of `entity`.
    /// Returns the number of fields written.
    pub fn refresh_all(&self, entity: &E) -> KashingResult<usize> {
        let mut refreshed = 0;
        for spec in self.registry.specs() {
            if spec.is_class_level() {
                continue;
            }
            self.write_instance(entity, &spec)?;
            refreshed += 1;
        }
        debug!(
            entity_type = E::entity_type(),
            identifier = %entity.identifier(),
            refreshed,
            "Refreshed cached fields"
        );
        Ok(refreshed)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn spec_key(&self, identifier: &Identifier, spec: &FieldSpec<E>) -> CacheKey {
        if spec.is_class_level() {
            CacheKey::class(E::entity_type(), spec.name())
        } else {
            CacheKey::new(E::entity_type(), identifier.clone(), spec.name())
        }
    }

    fn class_spec(&self, field: &str) -> KashingResult<Option<Arc<FieldSpec<E>>>> {
        match self.registry.lookup(field) {
            None => Ok(None),
            Some(spec) if spec.is_class_level() => Ok(Some(spec)),
            Some(_) => Err(FieldError::MalformedClassLookup {
                entity_type: E::entity_type().to_string(),
                field: field.to_string(),
            }
            .into()),
        }
    }

    /// Backend read with hit/miss accounting.
    fn read(&self, key: &CacheKey, spec: &FieldSpec<E>) -> KashingResult<Option<FieldValue>> {
        let value = self.fetch(key, spec)?;
        if value.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
            debug!(key = %key, "Cache miss");
        }
        Ok(value)
    }

    /// Backend read and decode, without hit/miss accounting.
    fn fetch(&self, key: &CacheKey, spec: &FieldSpec<E>) -> KashingResult<Option<FieldValue>> {
        let raw = self.backend.get(key.as_str())?;
        let decoded = decode(raw.as_deref(), spec);
        if decoded.hook_failed {
            self.stats.record_hook_fallback();
        }
        Ok(decoded.value)
    }

    fn recompute<F>(&self, key: &CacheKey, spec: &FieldSpec<E>, write: F) -> KashingResult<Option<FieldValue>>
    where
        F: FnOnce() -> KashingResult<Option<FieldValue>>,
    {
        match self.config.recompute_mode {
            RecomputeMode::Racy => write(),
            RecomputeMode::SingleFlight => {
                let _guard = self.key_locks.acquire(key.as_str());
                if let Some(value) = self.fetch(key, spec)? {
                    debug!(key = %key, "Value filled by a concurrent caller");
                    return Ok(Some(value));
                }
                write()
            }
        }
    }

    fn write_instance(&self, entity: &E, spec: &FieldSpec<E>) -> KashingResult<Option<FieldValue>> {
        let Some(value) = spec.produce(entity) else {
            debug!(
                entity_type = E::entity_type(),
                field = spec.name(),
                "Class-level field not recomputed from an instance"
            );
            return Ok(None);
        };
        let key = CacheKey::new(E::entity_type(), entity.identifier(), spec.name());
        self.store(&key, spec, &value, resolve_ttl(Some(entity), spec))
    }

    fn write_class(&self, spec: &FieldSpec<E>) -> KashingResult<Option<FieldValue>> {
        let Some(value) = spec.produce_class(&EntityClass::new()) else {
            debug!(
                entity_type = E::entity_type(),
                field = spec.name(),
                "Class-level field has no class producer"
            );
            return Ok(None);
        };
        let key = CacheKey::class(E::entity_type(), spec.name());
        self.store(&key, spec, &value, resolve_ttl::<E>(None, spec))
    }

    fn store(
        &self,
        key: &CacheKey,
        spec: &FieldSpec<E>,
        value: &FieldValue,
        ttl: Option<Duration>,
    ) -> KashingResult<Option<FieldValue>> {
        let encoded = encode(value, spec)?;
        if encoded.hook_failed {
            self.stats.record_hook_fallback();
        }
        self.backend.set(key.as_str(), &encoded.text)?;
        self.stats.record_recompute();
        debug!(
            key = %key,
            ttl_ms = ttl.map(|t| t.as_millis() as u64),
            "Stored cached field"
        );

        if let Some(ttl) = ttl {
            self.invalidator.clear_one(key, ttl)?;
        }
        self.fetch(key, spec)
    }
}

impl<E: CacheableEntity, B: KvBackend> Clone for FieldCache<E, B> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
            invalidator: self.invalidator.clone(),
            key_locks: Arc::clone(&self.key_locks),
        }
    }
}

/// Accessors scoped to one field, from [`FieldCache::field`].
pub struct FieldHandle<'a, E: CacheableEntity, B: KvBackend> {
    cache: &'a FieldCache<E, B>,
    name: String,
}

impl<E: CacheableEntity, B: KvBackend> FieldHandle<'_, E, B> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn smart_fetch(&self, entity: &E) -> KashingResult<Option<FieldValue>> {
        self.cache.smart_fetch(entity, &self.name)
    }

    pub fn get(&self, identifier: &Identifier) -> KashingResult<Option<FieldValue>> {
        self.cache.get(identifier, &self.name)
    }

    pub fn set(&self, entity: &E) -> KashingResult<Option<FieldValue>> {
        self.cache.set(entity, &self.name)
    }

    /// Re-arm with `ttl`, or with the resolved TTL when `None`.
    pub fn expire(&self, entity: &E, ttl: Option<Duration>) -> KashingResult<bool> {
        self.cache.expire_field(entity, &self.name, ttl)
    }

    /// Delete the cached value.
    pub fn clear(&self, entity: &E) -> KashingResult<bool> {
        self.cache
            .clear_field(&entity.identifier(), &self.name, Duration::ZERO)
    }
}
