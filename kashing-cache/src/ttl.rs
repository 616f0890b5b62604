//! TTL resolution.
//!
//! Order is fixed: per-instance override, then the field's default, then no
//! TTL at all (the key persists until explicitly cleared). Zero durations are
//! treated as "no TTL" so a resolved TTL can never delete a freshly written
//! key.

use std::collections::HashMap;
use std::time::Duration;

use crate::registry::FieldSpec;
use crate::traits::CacheableEntity;

/// Transient per-instance TTL overrides.
///
/// Entities embed this and expose it through
/// [`CacheableEntity::ttl_overrides`]. Overrides are never persisted; they
/// live as long as the in-memory instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TtlOverrides {
    ttls: HashMap<String, Duration>,
}

impl TtlOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the TTL of `field` for this instance.
    pub fn set(&mut self, field: impl Into<String>, ttl: Duration) {
        self.ttls.insert(field.into(), ttl);
    }

    pub fn get(&self, field: &str) -> Option<Duration> {
        self.ttls.get(field).copied()
    }

    pub fn remove(&mut self, field: &str) -> Option<Duration> {
        self.ttls.remove(field)
    }

    pub fn is_empty(&self) -> bool {
        self.ttls.is_empty()
    }
}

/// Effective TTL of `spec` for `entity` (or for the class when `None`).
pub fn resolve_ttl<E: CacheableEntity>(entity: Option<&E>, spec: &FieldSpec<E>) -> Option<Duration> {
    entity
        .and_then(|e| e.ttl_overrides())
        .and_then(|overrides| overrides.get(spec.name()))
        .or(spec.default_ttl())
        .filter(|ttl| !ttl.is_zero())
}
