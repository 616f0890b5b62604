//! Cache key derivation.
//!
//! Keys are rendered as `<EntityTypeName>_<identifier>_<fieldName>`. The
//! format is shared with caches written by earlier deployments and must not
//! change. Class-level keys use the `0` sentinel as identifier.

use std::fmt;

use kashing_core::Identifier;

/// Render the key for one field of one entity. Pure: no I/O, no registry.
pub fn key_for(entity_type: &str, identifier: &Identifier, field: &str) -> String {
    format!("{}_{}_{}", entity_type, identifier, field)
}

/// A derived cache key.
///
/// The private inner struct means a `CacheKey` can only be built through
/// [`CacheKey::new`] or [`CacheKey::class`], so the rendered string always
/// matches its parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    inner: CacheKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKeyInner {
    entity_type: String,
    identifier: Identifier,
    field: String,
    rendered: String,
}

impl CacheKey {
    /// Key for a field of an entity instance (or of the class, when
    /// `identifier` is [`Identifier::Class`]).
    pub fn new(entity_type: &str, identifier: Identifier, field: &str) -> Self {
        let rendered = key_for(entity_type, &identifier, field);
        Self {
            inner: CacheKeyInner {
                entity_type: entity_type.to_string(),
                identifier,
                field: field.to_string(),
                rendered,
            },
        }
    }

    /// Key for a class-level field.
    pub fn class(entity_type: &str, field: &str) -> Self {
        Self::new(entity_type, Identifier::Class, field)
    }

    pub fn entity_type(&self) -> &str {
        &self.inner.entity_type
    }

    pub fn identifier(&self) -> &Identifier {
        &self.inner.identifier
    }

    pub fn field(&self) -> &str {
        &self.inner.field
    }

    pub fn is_class(&self) -> bool {
        self.inner.identifier.is_class()
    }

    /// The rendered key sent to the backend.
    pub fn as_str(&self) -> &str {
        &self.inner.rendered
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_key_format() {
        let key = CacheKey::new("RocketShip", Identifier::Int(7), "title");
        assert_eq!(key.as_str(), "RocketShip_7_title");
        assert_eq!(key.entity_type(), "RocketShip");
        assert_eq!(key.identifier(), &Identifier::Int(7));
        assert_eq!(key.field(), "title");
        assert!(!key.is_class());
    }

    #[test]
    fn test_class_key_uses_sentinel() {
        let key = CacheKey::class("RocketShip", "fleet_size");
        assert_eq!(key.as_str(), "RocketShip_0_fleet_size");
        assert!(key.is_class());
    }

    #[test]
    fn test_field_names_keep_underscores() {
        assert_eq!(
            key_for("RocketShip", &Identifier::Int(7), "time_since_launch"),
            "RocketShip_7_time_since_launch"
        );
    }

    #[test]
    fn test_display_matches_rendered() {
        let key = CacheKey::new("RocketShip", Identifier::from("apollo"), "title");
        assert_eq!(key.to_string(), "RocketShip_apollo_title");
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn entity_type_strategy() -> impl Strategy<Value = String> {
        "[A-Z][A-Za-z0-9]{0,15}"
    }

    fn identifier_strategy() -> impl Strategy<Value = Identifier> {
        prop_oneof![
            Just(Identifier::Class),
            (1i64..i64::MAX).prop_map(Identifier::Int),
            "[a-z][a-z0-9-]{0,20}".prop_map(Identifier::Text),
        ]
    }

    fn field_strategy() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,15}"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Property: key derivation is deterministic.
        #[test]
        fn prop_key_is_deterministic(
            entity_type in entity_type_strategy(),
            identifier in identifier_strategy(),
            field in field_strategy(),
        ) {
            let a = CacheKey::new(&entity_type, identifier.clone(), &field);
            let b = CacheKey::new(&entity_type, identifier, &field);
            prop_assert_eq!(a.as_str(), b.as_str());
        }

        /// Property: distinct (type, identifier, field) triples never collide.
        #[test]
        fn prop_keys_are_collision_free(
            type1 in entity_type_strategy(),
            type2 in entity_type_strategy(),
            id1 in identifier_strategy(),
            id2 in identifier_strategy(),
            field1 in field_strategy(),
            field2 in field_strategy(),
        ) {
            let key1 = CacheKey::new(&type1, id1.clone(), &field1);
            let key2 = CacheKey::new(&type2, id2.clone(), &field2);
            if type1 != type2 || id1 != id2 || field1 != field2 {
                prop_assert_ne!(key1.as_str(), key2.as_str());
            } else {
                prop_assert_eq!(key1.as_str(), key2.as_str());
            }
        }
    }
}
