//! End-to-end scenarios over the RocketShip fixture.
//!
//! Covers lazy population, the time-aware field, the custom producer, the
//! TTL-bound field, class-level isolation and the lifecycle callbacks, once
//! over the in-memory backend and once over LMDB.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use kashing_cache::{CacheableEntity, LifecycleHooks};
use kashing_test_utils::fixtures::{in_memory_cache, lmdb_cache, RocketShip, TIME_SINCE_LAUNCH_TTL};
use kashing_test_utils::{
    init_test_tracing, CacheConfig, FieldValue, Identifier, KvBackend, RecomputeMode,
};

fn apollo() -> RocketShip {
    RocketShip::new(11, "Apollo 11")
        .launched(Utc.with_ymd_and_hms(1969, 7, 16, 13, 32, 0).unwrap())
        .with_crew(&["Armstrong", "Aldrin", "Collins"])
}

#[test]
fn test_title_is_cached_lazily() {
    init_test_tracing();
    let (cache, _) = in_memory_cache(CacheConfig::default());
    let mut ship = apollo();

    assert_eq!(cache.get(&ship.identifier(), "title").unwrap(), None);
    assert_eq!(
        cache.field("title").smart_fetch(&ship).unwrap(),
        Some("Apollo 11".into())
    );
    assert_eq!(
        cache.backend().get("RocketShip_11_title").unwrap().as_deref(),
        Some("\"Apollo 11\"")
    );

    // A present value is served even when the attribute changed.
    ship.title = "Apollo XI".to_string();
    assert_eq!(
        cache.field("title").smart_fetch(&ship).unwrap(),
        Some("Apollo 11".into())
    );
}

#[test]
fn test_launched_at_round_trips_as_time() {
    let (cache, _) = in_memory_cache(CacheConfig::default());
    let ship = apollo();

    let value = cache.smart_fetch(&ship, "launched_at").unwrap().unwrap();
    assert_eq!(value.as_time(), ship.launched_at.map(|t| t.fixed_offset()));
    assert_eq!(
        cache.backend().get("RocketShip_11_launched_at").unwrap().as_deref(),
        Some("\"1969-07-16 13:32:00 GMT+0000\"")
    );
}

#[test]
fn test_unlaunched_ship_stores_null() {
    let (cache, _) = in_memory_cache(CacheConfig::default());
    let ship = RocketShip::new(12, "Apollo 12");

    assert_eq!(cache.smart_fetch(&ship, "launched_at").unwrap(), Some(FieldValue::null()));
    assert_eq!(
        cache.backend().get("RocketShip_12_launched_at").unwrap().as_deref(),
        Some("null")
    );
    // Stored null is a hit: no second recompute.
    cache.smart_fetch(&ship, "launched_at").unwrap();
    assert_eq!(cache.stats().recomputes, 1);
}

#[test]
fn test_people_on_board_computed_once() {
    let (cache, counters) = in_memory_cache(CacheConfig::default());
    let ship = apollo();

    for _ in 0..3 {
        assert_eq!(
            cache.smart_fetch(&ship, "people_on_board").unwrap(),
            Some(FieldValue::from(3u64))
        );
    }
    assert_eq!(counters.people_on_board.count(), 1);
}

#[test]
fn test_time_since_launch_expires() {
    let (cache, counters) = in_memory_cache(CacheConfig::default());
    let ship = apollo();

    let first = cache.smart_fetch(&ship, "time_since_launch").unwrap().unwrap();
    assert!(first.as_i64().unwrap() > 0);
    cache.smart_fetch(&ship, "time_since_launch").unwrap();
    assert_eq!(counters.time_since_launch.count(), 1);

    cache.backend().advance_clock(TIME_SINCE_LAUNCH_TTL + Duration::from_secs(1));
    assert_eq!(cache.get(&Identifier::Int(11), "time_since_launch").unwrap(), None);

    cache.smart_fetch(&ship, "time_since_launch").unwrap();
    assert_eq!(counters.time_since_launch.count(), 2);
}

#[test]
fn test_ttl_override_beats_default() {
    let (cache, _) = in_memory_cache(CacheConfig::default());
    let mut ship = apollo();
    ship.ttls.set("time_since_launch", Duration::from_secs(2));

    cache.set(&ship, "time_since_launch").unwrap();
    cache.backend().advance_clock(Duration::from_secs(3));
    assert_eq!(cache.get(&Identifier::Int(11), "time_since_launch").unwrap(), None);
}

#[test]
fn test_expire_without_ttl_uses_override() {
    let (cache, _) = in_memory_cache(CacheConfig::default());
    let mut ship = apollo();
    cache.set(&ship, "time_since_launch").unwrap();
    ship.ttls.set("time_since_launch", Duration::from_secs(4));

    assert!(cache.field("time_since_launch").expire(&ship, None).unwrap());
    let remaining = cache.backend().ttl("RocketShip_11_time_since_launch").unwrap();
    assert!(remaining <= Duration::from_secs(4));
}

#[test]
fn test_class_field_isolated_from_instances() {
    let (cache, counters) = in_memory_cache(CacheConfig::default());

    assert_eq!(cache.class_smart_fetch("fleet_size").unwrap(), Some(3i64.into()));
    assert_eq!(cache.class_smart_fetch("fleet_size").unwrap(), Some(3i64.into()));
    assert_eq!(counters.fleet_size.count(), 1);
    assert_eq!(cache.backend().keys(), vec!["RocketShip_0_fleet_size".to_string()]);

    // Saving a ship refreshes instance fields only.
    cache.on_after_save(&apollo()).unwrap();
    assert_eq!(counters.fleet_size.count(), 1);
    assert!(cache
        .backend()
        .keys()
        .iter()
        .all(|key| key == "RocketShip_0_fleet_size" || key.starts_with("RocketShip_11_")));
}

#[test]
fn test_lifecycle_round() {
    let (cache, counters) = in_memory_cache(CacheConfig::default());
    let mut ship = apollo();

    cache.on_before_create(&ship).unwrap();
    cache.on_after_save(&ship).unwrap();
    assert_eq!(cache.backend().len(), 4);
    assert_eq!(counters.people_on_board.count(), 1);

    ship.crew.pop();
    cache.on_after_save(&ship).unwrap();
    assert_eq!(
        cache.get(&Identifier::Int(11), "people_on_board").unwrap(),
        Some(FieldValue::from(2u64))
    );

    cache.on_before_destroy(&ship).unwrap();
    assert!(cache.backend().is_empty());
}

#[test]
fn test_single_flight_under_contention() {
    let config = CacheConfig::new().with_recompute_mode(RecomputeMode::SingleFlight);
    let (cache, counters) = in_memory_cache(config);
    let ship = apollo();

    std::thread::scope(|scope| {
        for _ in 0..6 {
            scope.spawn(|| {
                let value = cache.smart_fetch(&ship, "people_on_board").unwrap();
                assert_eq!(value, Some(FieldValue::from(3u64)));
            });
        }
    });
    assert_eq!(counters.people_on_board.count(), 1);
}

#[test]
fn test_lmdb_backend_end_to_end() {
    let (cache, counters, _dir) = lmdb_cache();
    let ship = apollo();

    assert_eq!(cache.smart_fetch(&ship, "title").unwrap(), Some("Apollo 11".into()));
    let launched = cache.smart_fetch(&ship, "launched_at").unwrap().unwrap();
    assert_eq!(launched.as_time(), ship.launched_at.map(|t| t.fixed_offset()));

    cache.smart_fetch(&ship, "people_on_board").unwrap();
    cache.smart_fetch(&ship, "people_on_board").unwrap();
    assert_eq!(counters.people_on_board.count(), 1);

    assert!(cache.clear_all(&Identifier::Int(11), Duration::ZERO).unwrap());
    assert_eq!(cache.get(&Identifier::Int(11), "title").unwrap(), None);
}
