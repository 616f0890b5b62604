//! Kashing Test Utilities
//!
//! Shared test infrastructure for the kashing workspace:
//! - The `RocketShip` fixture entity and its field registry
//! - Counting producers for asserting how often values are computed
//! - Proptest generators for identifiers and field values
//! - Backend fixtures and a test tracing subscriber

pub use kashing_cache::{
    CacheConfig, CacheableEntity, EntityClass, FieldCache, FieldOptions, FieldRegistry, Producer,
    RecomputeMode, TtlOverrides,
};
pub use kashing_core::{FieldValue, Identifier, KashingError, KashingResult};
pub use kashing_storage::{InMemoryBackend, KvBackend, LmdbBackend};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

// ============================================================================
// COUNTING PRODUCERS
// ============================================================================

/// Shared invocation counter for producers.
#[derive(Debug, Clone, Default)]
pub struct CallCounter {
    calls: Arc<AtomicUsize>,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    fn bump(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Wrap `f` in an instance producer that bumps `counter` on every call.
pub fn counting_producer<E, F>(counter: &CallCounter, f: F) -> Producer<E>
where
    E: CacheableEntity,
    F: Fn(&E) -> FieldValue + Send + Sync + 'static,
{
    let counter = counter.clone();
    Producer::instance(move |entity: &E| {
        counter.bump();
        f(entity)
    })
}

/// Wrap `f` in a class producer that bumps `counter` on every call.
pub fn counting_class_producer<E, F>(counter: &CallCounter, f: F) -> Producer<E>
where
    E: CacheableEntity,
    F: Fn(&EntityClass<E>) -> FieldValue + Send + Sync + 'static,
{
    let counter = counter.clone();
    Producer::class(move |class: &EntityClass<E>| {
        counter.bump();
        f(class)
    })
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! The `RocketShip` entity and ready-made caches around it.

    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    /// TTL of `time_since_launch`.
    pub const TIME_SINCE_LAUNCH_TTL: Duration = Duration::from_secs(10);

    /// Example entity with one field per cached-field flavor.
    #[derive(Debug, Clone)]
    pub struct RocketShip {
        pub id: i64,
        pub title: String,
        pub launched_at: Option<DateTime<Utc>>,
        pub crew: Vec<String>,
        pub ttls: TtlOverrides,
    }

    impl RocketShip {
        pub fn new(id: i64, title: &str) -> Self {
            Self {
                id,
                title: title.to_string(),
                launched_at: None,
                crew: Vec::new(),
                ttls: TtlOverrides::new(),
            }
        }

        pub fn launched(mut self, at: DateTime<Utc>) -> Self {
            self.launched_at = Some(at);
            self
        }

        pub fn with_crew(mut self, crew: &[&str]) -> Self {
            self.crew = crew.iter().map(|name| name.to_string()).collect();
            self
        }

        /// Whole seconds since launch; `None` before launch.
        pub fn seconds_since_launch(&self) -> Option<i64> {
            self.launched_at
                .map(|at| (Utc::now() - at).num_seconds())
        }
    }

    impl CacheableEntity for RocketShip {
        fn entity_type() -> &'static str {
            "RocketShip"
        }

        fn identifier(&self) -> Identifier {
            Identifier::Int(self.id)
        }

        fn attribute(&self, name: &str) -> Option<FieldValue> {
            match name {
                "title" => Some(self.title.as_str().into()),
                "launched_at" => Some(self.launched_at.into()),
                _ => None,
            }
        }

        fn ttl_overrides(&self) -> Option<&TtlOverrides> {
            Some(&self.ttls)
        }
    }

    /// Producer counters of [`rocket_ship_registry`].
    #[derive(Debug, Clone, Default)]
    pub struct RocketShipCounters {
        pub people_on_board: CallCounter,
        pub time_since_launch: CallCounter,
        pub fleet_size: CallCounter,
    }

    /// Registry with the RocketShip fields:
    ///
    /// - `title`: mirrors the attribute
    /// - `launched_at`: mirrors the attribute, stored with the `time` hooks
    /// - `people_on_board`: crew count
    /// - `time_since_launch`: seconds since launch, 10 second TTL
    /// - `fleet_size`: class-level constant
    pub fn rocket_ship_registry(counters: &RocketShipCounters) -> Arc<FieldRegistry<RocketShip>> {
        let registry = Arc::new(FieldRegistry::new());
        registry.register("title", FieldOptions::new(), Producer::Attribute);
        registry.register("launched_at", FieldOptions::new().time(), Producer::Attribute);
        registry.register(
            "people_on_board",
            FieldOptions::new(),
            counting_producer(&counters.people_on_board, |ship: &RocketShip| {
                FieldValue::from(ship.crew.len() as u64)
            }),
        );
        registry.register(
            "time_since_launch",
            FieldOptions::new().with_ttl(TIME_SINCE_LAUNCH_TTL),
            counting_producer(&counters.time_since_launch, |ship: &RocketShip| {
                FieldValue::from(ship.seconds_since_launch())
            }),
        );
        registry.register(
            "fleet_size",
            FieldOptions::new(),
            counting_class_producer(&counters.fleet_size, |_: &EntityClass<RocketShip>| {
                FieldValue::from(3i64)
            }),
        );
        registry
    }

    /// RocketShip cache over a fresh in-memory backend.
    pub fn in_memory_cache(
        config: CacheConfig,
    ) -> (FieldCache<RocketShip, InMemoryBackend>, RocketShipCounters) {
        let counters = RocketShipCounters::default();
        let cache = FieldCache::new(
            rocket_ship_registry(&counters),
            Arc::new(InMemoryBackend::new()),
            config,
        );
        (cache, counters)
    }

    /// RocketShip cache over an LMDB store in a temporary directory.
    ///
    /// Keep the `TempDir` alive for as long as the cache is used.
    pub fn lmdb_cache() -> (FieldCache<RocketShip, LmdbBackend>, RocketShipCounters, TempDir) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let backend = LmdbBackend::new(dir.path(), 10).expect("Failed to open LMDB backend");
        let counters = RocketShipCounters::default();
        let cache = FieldCache::with_defaults(rocket_ship_registry(&counters), Arc::new(backend));
        (cache, counters, dir)
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest generators for kashing types.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// Entity type names: capitalized identifiers.
    pub fn arb_entity_type() -> impl Strategy<Value = String> {
        "[A-Z][A-Za-z0-9]{0,15}"
    }

    /// Field names: lowercase snake case.
    pub fn arb_field_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,15}"
    }

    /// Instance identifiers (never the class sentinel).
    pub fn arb_identifier() -> impl Strategy<Value = Identifier> {
        prop_oneof![
            (1i64..i64::MAX).prop_map(Identifier::Int),
            "[a-z][a-z0-9-]{0,20}".prop_map(Identifier::Text),
        ]
    }

    /// JSON-shaped field values whose strings never look like timestamps.
    pub fn arb_json_value() -> impl Strategy<Value = FieldValue> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[A-Za-z ]{0,20}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
        .prop_map(FieldValue::Json)
    }

    /// Timestamps with whole-second precision between 1970 and 2100.
    pub fn arb_time() -> impl Strategy<Value = FieldValue> {
        (0i64..4_102_444_800).prop_filter_map("out of range", |secs| {
            DateTime::<Utc>::from_timestamp(secs, 0).map(FieldValue::from)
        })
    }
}

// ============================================================================
// TRACING
// ============================================================================

/// Install a test-writer tracing subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
