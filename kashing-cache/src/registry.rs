//! Per-entity-type field registry.
//!
//! A [`FieldRegistry`] is built once when the entity type is defined and is
//! shared (behind an `Arc`) by every cache operation afterwards. Registering
//! a name that already exists replaces its metadata.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use kashing_core::{FieldError, FieldValue, HookError, KashingResult};

use crate::lock::{rw_read, rw_write};
use crate::serializer;
use crate::traits::{CacheableEntity, EntityClass};

const SOURCE: &str = "cache::registry";

/// Computes a field's value from an entity instance.
pub type InstanceProducer<E> = Arc<dyn Fn(&E) -> FieldValue + Send + Sync>;

/// Computes a class-level field's value from the entity type.
pub type ClassProducer<E> = Arc<dyn Fn(&EntityClass<E>) -> FieldValue + Send + Sync>;

/// Custom encode step, applied before JSON encoding.
pub type StoreHook = Arc<dyn Fn(&FieldValue) -> Result<FieldValue, HookError> + Send + Sync>;

/// Custom decode step, applied to the raw stored text.
pub type ParseHook = Arc<dyn Fn(&str) -> Result<FieldValue, HookError> + Send + Sync>;

/// How a field's value is computed.
pub enum Producer<E> {
    /// Mirror the entity attribute with the same name as the field.
    Attribute,
    /// Compute from the entity instance.
    Instance(InstanceProducer<E>),
    /// Compute from the entity type; the field is class-level.
    Class(ClassProducer<E>),
}

impl<E> Producer<E> {
    pub fn instance<F>(f: F) -> Self
    where
        F: Fn(&E) -> FieldValue + Send + Sync + 'static,
    {
        Self::Instance(Arc::new(f))
    }

    pub fn class<F>(f: F) -> Self
    where
        F: Fn(&EntityClass<E>) -> FieldValue + Send + Sync + 'static,
    {
        Self::Class(Arc::new(f))
    }
}

impl<E> Clone for Producer<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Attribute => Self::Attribute,
            Self::Instance(f) => Self::Instance(Arc::clone(f)),
            Self::Class(f) => Self::Class(Arc::clone(f)),
        }
    }
}

impl<E> fmt::Debug for Producer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attribute => f.write_str("Attribute"),
            Self::Instance(_) => f.write_str("Instance(..)"),
            Self::Class(_) => f.write_str("Class(..)"),
        }
    }
}

/// Registration options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldOptions {
    /// Default TTL; `None` caches until explicitly cleared.
    pub ttl: Option<Duration>,
    /// Never recompute on a read miss.
    pub no_auto: bool,
    /// The value belongs to the entity type, not to an instance.
    pub class_level: bool,
    /// Store as `%Y-%m-%d %H:%M:%S GMT%z` and parse back into a time value.
    pub time: bool,
}

impl FieldOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn no_auto(mut self) -> Self {
        self.no_auto = true;
        self
    }

    pub fn class_level(mut self) -> Self {
        self.class_level = true;
        self
    }

    pub fn time(mut self) -> Self {
        self.time = true;
        self
    }
}

/// Metadata of one cached field. Immutable once registered.
pub struct FieldSpec<E> {
    name: String,
    default_ttl: Option<Duration>,
    parse: Option<ParseHook>,
    store: Option<StoreHook>,
    producer: Producer<E>,
    options: FieldOptions,
}

impl<E: CacheableEntity> FieldSpec<E> {
    /// Build a spec from options and a producer.
    ///
    /// `options.time` installs the timestamp hooks; a [`Producer::Class`]
    /// marks the field class-level.
    pub fn new(name: impl Into<String>, mut options: FieldOptions, producer: Producer<E>) -> Self {
        if matches!(producer, Producer::Class(_)) {
            options.class_level = true;
        }
        let (parse, store) = if options.time {
            (
                Some(serializer::time_parse_hook()),
                Some(serializer::time_store_hook()),
            )
        } else {
            (None, None)
        };

        Self {
            name: name.into(),
            default_ttl: options.ttl,
            parse,
            store,
            producer,
            options,
        }
    }

    /// Replace the parse hook.
    pub fn with_parse<F>(mut self, parse: F) -> Self
    where
        F: Fn(&str) -> Result<FieldValue, HookError> + Send + Sync + 'static,
    {
        self.parse = Some(Arc::new(parse));
        self
    }

    /// Replace the store hook.
    pub fn with_store<F>(mut self, store: F) -> Self
    where
        F: Fn(&FieldValue) -> Result<FieldValue, HookError> + Send + Sync + 'static,
    {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    pub fn options(&self) -> &FieldOptions {
        &self.options
    }

    pub fn producer(&self) -> &Producer<E> {
        &self.producer
    }

    pub fn parse_hook(&self) -> Option<&ParseHook> {
        self.parse.as_ref()
    }

    pub fn store_hook(&self) -> Option<&StoreHook> {
        self.store.as_ref()
    }

    pub fn is_class_level(&self) -> bool {
        self.options.class_level
    }

    /// Compute the value from an instance. `None` for class-level fields.
    pub fn produce(&self, entity: &E) -> Option<FieldValue> {
        if self.is_class_level() {
            return None;
        }
        match &self.producer {
            Producer::Attribute => Some(entity.attribute(&self.name).unwrap_or_else(FieldValue::null)),
            Producer::Instance(f) => Some(f(entity)),
            Producer::Class(_) => None,
        }
    }

    /// Compute the value from the entity type. `None` unless the producer
    /// is a class producer.
    pub fn produce_class(&self, class: &EntityClass<E>) -> Option<FieldValue> {
        match &self.producer {
            Producer::Class(f) => Some(f(class)),
            _ => None,
        }
    }
}

impl<E> fmt::Debug for FieldSpec<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("default_ttl", &self.default_ttl)
            .field("parse", &self.parse.is_some())
            .field("store", &self.store.is_some())
            .field("producer", &self.producer)
            .field("options", &self.options)
            .finish()
    }
}

/// Registry of cached fields for one entity type.
pub struct FieldRegistry<E> {
    fields: RwLock<HashMap<String, Arc<FieldSpec<E>>>>,
    lifecycle_bound: AtomicBool,
}

impl<E: CacheableEntity> FieldRegistry<E> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            fields: RwLock::new(HashMap::new()),
            lifecycle_bound: AtomicBool::new(false),
        }
    }

    /// Register a field, replacing any previous spec with the same name.
    pub fn register(
        &self,
        name: impl Into<String>,
        options: FieldOptions,
        producer: Producer<E>,
    ) -> Arc<FieldSpec<E>> {
        let spec = Arc::new(FieldSpec::new(name, options, producer));
        self.insert(Arc::clone(&spec));
        spec
    }

    /// Insert a fully built spec. Returns the spec it replaced, if any.
    pub fn insert(&self, spec: Arc<FieldSpec<E>>) -> Option<Arc<FieldSpec<E>>> {
        let name = spec.name().to_string();
        let previous = rw_write(&self.fields, SOURCE, "insert").insert(name.clone(), spec);

        if !self.lifecycle_bound.swap(true, Ordering::AcqRel) {
            tracing::debug!(
                entity_type = E::entity_type(),
                "Lifecycle hooks bound on first field registration"
            );
        }
        if previous.is_some() {
            tracing::debug!(
                entity_type = E::entity_type(),
                field = %name,
                "Replaced cached field registration"
            );
        }
        previous
    }

    /// Look up a field by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<FieldSpec<E>>> {
        rw_read(&self.fields, SOURCE, "lookup").get(name).cloned()
    }

    /// Look up a field, failing with [`FieldError::NotRegistered`].
    pub fn require(&self, name: &str) -> KashingResult<Arc<FieldSpec<E>>> {
        self.lookup(name).ok_or_else(|| {
            FieldError::NotRegistered {
                entity_type: E::entity_type().to_string(),
                field: name.to_string(),
            }
            .into()
        })
    }

    /// Snapshot of every registered spec, in no particular order.
    pub fn specs(&self) -> Vec<Arc<FieldSpec<E>>> {
        rw_read(&self.fields, SOURCE, "specs")
            .values()
            .cloned()
            .collect()
    }

    /// Visit every registered spec, in no particular order.
    ///
    /// The callback runs on a snapshot, so it may call back into the
    /// registry.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&FieldSpec<E>),
    {
        for spec in self.specs() {
            f(&spec);
        }
    }

    /// Registered field names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = rw_read(&self.fields, SOURCE, "names")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        rw_read(&self.fields, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once a field has been registered for this entity type.
    pub fn is_lifecycle_bound(&self) -> bool {
        self.lifecycle_bound.load(Ordering::Acquire)
    }
}

impl<E: CacheableEntity> Default for FieldRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kashing_core::{Identifier, KashingError};

    struct Capsule {
        crew: i64,
    }

    impl CacheableEntity for Capsule {
        fn entity_type() -> &'static str {
            "Capsule"
        }

        fn identifier(&self) -> Identifier {
            Identifier::Int(11)
        }

        fn attribute(&self, name: &str) -> Option<FieldValue> {
            match name {
                "crew" => Some(self.crew.into()),
                _ => None,
            }
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = FieldRegistry::<Capsule>::new();
        assert!(registry.is_empty());
        assert!(!registry.is_lifecycle_bound());

        registry.register("crew", FieldOptions::new(), Producer::Attribute);

        let spec = registry.lookup("crew").expect("crew should be registered");
        assert_eq!(spec.name(), "crew");
        assert!(registry.lookup("fuel").is_none());
        assert!(registry.is_lifecycle_bound());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reregistration_replaces_metadata() {
        let registry = FieldRegistry::<Capsule>::new();
        registry.register("crew", FieldOptions::new(), Producer::Attribute);
        registry.register(
            "crew",
            FieldOptions::new().with_ttl(Duration::from_secs(5)),
            Producer::instance(|c: &Capsule| FieldValue::from(c.crew * 2)),
        );

        assert_eq!(registry.len(), 1);
        let spec = registry.lookup("crew").unwrap();
        assert_eq!(spec.default_ttl(), Some(Duration::from_secs(5)));
        assert_eq!(spec.produce(&Capsule { crew: 3 }), Some(FieldValue::from(6i64)));
    }

    #[test]
    fn test_default_producer_mirrors_attribute() {
        let registry = FieldRegistry::<Capsule>::new();
        let spec = registry.register("crew", FieldOptions::new(), Producer::Attribute);
        assert_eq!(spec.produce(&Capsule { crew: 3 }), Some(FieldValue::from(3i64)));

        let missing = registry.register("fuel", FieldOptions::new(), Producer::Attribute);
        assert_eq!(missing.produce(&Capsule { crew: 3 }), Some(FieldValue::null()));
    }

    #[test]
    fn test_class_producer_marks_class_level() {
        let registry = FieldRegistry::<Capsule>::new();
        let spec = registry.register(
            "fleet_size",
            FieldOptions::new(),
            Producer::class(|class: &EntityClass<Capsule>| FieldValue::from(class.name())),
        );

        assert!(spec.is_class_level());
        assert_eq!(spec.produce(&Capsule { crew: 3 }), None);
        assert_eq!(
            spec.produce_class(&EntityClass::new()),
            Some(FieldValue::from("Capsule"))
        );
    }

    #[test]
    fn test_time_option_installs_hooks() {
        let registry = FieldRegistry::<Capsule>::new();
        let spec = registry.register("launched_at", FieldOptions::new().time(), Producer::Attribute);
        assert!(spec.parse_hook().is_some());
        assert!(spec.store_hook().is_some());

        let plain = registry.register("crew", FieldOptions::new(), Producer::Attribute);
        assert!(plain.parse_hook().is_none());
        assert!(plain.store_hook().is_none());
    }

    #[test]
    fn test_require_unregistered() {
        let registry = FieldRegistry::<Capsule>::new();
        let err = registry.require("crew").unwrap_err();
        assert!(matches!(
            err,
            KashingError::Field(FieldError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_for_each_visits_all() {
        let registry = FieldRegistry::<Capsule>::new();
        registry.register("crew", FieldOptions::new(), Producer::Attribute);
        registry.register("fuel", FieldOptions::new().no_auto(), Producer::Attribute);

        let mut seen = Vec::new();
        registry.for_each(|spec| seen.push(spec.name().to_string()));
        seen.sort();
        assert_eq!(seen, vec!["crew".to_string(), "fuel".to_string()]);
        assert_eq!(registry.names(), seen);
    }
}
