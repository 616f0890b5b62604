//! Property-based tests for the serializer and key naming.

use kashing_cache::serializer::{decode, decode_default, encode, encode_default};
use kashing_cache::{key_for, FieldSpec};
use kashing_test_utils::fixtures::RocketShip;
use kashing_test_utils::generators::{
    arb_entity_type, arb_field_name, arb_identifier, arb_json_value, arb_time,
};
use kashing_test_utils::{FieldOptions, Producer};
use proptest::prelude::*;

fn time_spec() -> FieldSpec<RocketShip> {
    FieldSpec::new("launched_at", FieldOptions::new().time(), Producer::Attribute)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: JSON values survive the default path.
    #[test]
    fn prop_json_round_trip(value in arb_json_value()) {
        let text = encode_default(&value).unwrap();
        prop_assert_eq!(decode_default(&text), value);
    }

    /// Property: times survive the default path through the timestamp
    /// heuristic.
    #[test]
    fn prop_time_heuristic_round_trip(value in arb_time()) {
        let text = encode_default(&value).unwrap();
        prop_assert_eq!(decode_default(&text).as_time(), value.as_time());
    }

    /// Property: times survive the `time` hooks without falling back.
    #[test]
    fn prop_time_hooks_round_trip(value in arb_time()) {
        let spec = time_spec();
        let encoded = encode(&value, &spec).unwrap();
        prop_assert!(!encoded.hook_failed);

        let decoded = decode(Some(&encoded.text), &spec);
        prop_assert!(!decoded.hook_failed);
        prop_assert_eq!(decoded.value.and_then(|v| v.as_time()), value.as_time());
    }

    /// Property: keys keep their three segments in order.
    #[test]
    fn prop_key_segments(
        entity_type in arb_entity_type(),
        identifier in arb_identifier(),
        field in arb_field_name(),
    ) {
        let key = key_for(&entity_type, &identifier, &field);
        let prefix = format!("{}_", entity_type);
        let suffix = format!("_{}", field);
        prop_assert!(key.starts_with(&prefix));
        prop_assert!(key.ends_with(&suffix));
        prop_assert_eq!(&key[prefix.len()..key.len() - suffix.len()], identifier.to_string());
    }
}
