//! Kashing Cache - Field-Level Cache-Aside Engine
//!
//! Entities declare selected fields, or class-wide values, as cached. Values
//! live in a key-value backend under `<EntityType>_<identifier>_<field>`,
//! are computed lazily on the first read, may carry a TTL, and are
//! invalidated or refreshed around the entity's writes.
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(FieldRegistry::<RocketShip>::new());
//! registry.register("title", FieldOptions::new(), Producer::Attribute);
//! registry.register(
//!     "time_since_launch",
//!     FieldOptions::new().with_ttl(Duration::from_secs(10)),
//!     Producer::instance(|ship: &RocketShip| ship.seconds_since_launch().into()),
//! );
//!
//! let cache = FieldCache::with_defaults(registry, Arc::new(InMemoryBackend::new()));
//!
//! // Computed and stored on the first call, read back afterwards.
//! let title = cache.field("title").smart_fetch(&ship)?;
//!
//! // Wire into the persistence layer.
//! cache.on_after_save(&ship)?;
//! ```
//!
//! # Concurrency
//!
//! Every operation is a blocking backend round trip. Two cold reads of the
//! same field may both run the producer; the last write wins. Opt into
//! [`RecomputeMode::SingleFlight`] to serialize recomputes per key.

mod lock;
mod single_flight;

pub mod invalidator;
pub mod key;
pub mod lifecycle;
pub mod read_through;
pub mod registry;
pub mod serializer;
pub mod traits;
pub mod ttl;

pub use invalidator::Invalidator;
pub use key::{key_for, CacheKey};
pub use lifecycle::{LifecycleEvent, LifecycleHooks};
pub use read_through::{CacheConfig, FieldCache, FieldHandle, RecomputeMode};
pub use registry::{
    ClassProducer, FieldOptions, FieldRegistry, FieldSpec, InstanceProducer, ParseHook, Producer,
    StoreHook,
};
pub use serializer::{decode, decode_default, encode, encode_default, Decoded, Encoded, TIME_FORMAT};
pub use traits::{CacheStats, CacheableEntity, EntityClass, EntityLoader};
pub use ttl::{resolve_ttl, TtlOverrides};

pub use kashing_core::{FieldValue, Identifier, KashingError, KashingResult};
pub use kashing_storage::{InMemoryBackend, KvBackend, LmdbBackend};
