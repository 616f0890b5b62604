//! Entity lifecycle callbacks.
//!
//! The embedding persistence layer calls these around its writes: stale
//! values are invalidated before create and destroy, and every
//! instance-scoped field is recomputed after a save. For an entity type with
//! no registered fields every callback is a no-op.

use std::time::Duration;

use kashing_core::KashingResult;
use kashing_storage::KvBackend;
use tracing::debug;

use crate::read_through::FieldCache;
use crate::traits::CacheableEntity;

/// A write event on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    BeforeCreate,
    BeforeDestroy,
    AfterSave,
}

/// Callbacks wired to the entity's write lifecycle.
pub trait LifecycleHooks<E: CacheableEntity> {
    /// Invalidate every instance field of `entity`.
    fn on_before_create(&self, entity: &E) -> KashingResult<()>;

    /// Invalidate every instance field of `entity`.
    fn on_before_destroy(&self, entity: &E) -> KashingResult<()>;

    /// Recompute and store every instance field of `entity`.
    fn on_after_save(&self, entity: &E) -> KashingResult<()>;

    /// Dispatch `event` to the matching callback.
    fn handle(&self, event: LifecycleEvent, entity: &E) -> KashingResult<()> {
        match event {
            LifecycleEvent::BeforeCreate => self.on_before_create(entity),
            LifecycleEvent::BeforeDestroy => self.on_before_destroy(entity),
            LifecycleEvent::AfterSave => self.on_after_save(entity),
        }
    }
}

impl<E: CacheableEntity, B: KvBackend> LifecycleHooks<E> for FieldCache<E, B> {
    fn on_before_create(&self, entity: &E) -> KashingResult<()> {
        if !self.registry().is_lifecycle_bound() || !self.config().clear_before_create {
            return Ok(());
        }
        debug!(
            entity_type = E::entity_type(),
            identifier = %entity.identifier(),
            "Clearing cached fields before create"
        );
        self.clear_all(&entity.identifier(), Duration::ZERO)?;
        Ok(())
    }

    fn on_before_destroy(&self, entity: &E) -> KashingResult<()> {
        if !self.registry().is_lifecycle_bound() {
            return Ok(());
        }
        debug!(
            entity_type = E::entity_type(),
            identifier = %entity.identifier(),
            "Clearing cached fields before destroy"
        );
        self.clear_all(&entity.identifier(), Duration::ZERO)?;
        Ok(())
    }

    fn on_after_save(&self, entity: &E) -> KashingResult<()> {
        if !self.registry().is_lifecycle_bound() {
            return Ok(());
        }
        self.refresh_all(entity)?;
        Ok(())
    }
}
