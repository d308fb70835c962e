//! Cached nearest-vehicle answers never outlive the vehicle state they name.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{harness, offline_config, point};
use dispatch_lib::cache::NearestQuery;
use dispatch_lib::{
    CacheBackend, CacheConfig, CacheError, CachedNearest, DispatchCache, DispatchCoordinator,
    NewIncident, RoutingClient, StatusFilter, VehicleStatus,
};

#[test]
fn repeated_queries_are_served_from_cache() {
    let h = harness();
    let c = &h.coordinator;
    c.register_vehicle("v1", point(3.35, 6.60), VehicleStatus::Available)
        .expect("v1 registers");
    let query = point(3.345, 6.597);

    let first = c
        .find_nearest_vehicle(query, StatusFilter::available())
        .expect("valid query")
        .expect("a vehicle matches");
    let key = DispatchCache::nearest_key(&NearestQuery::Point(query), StatusFilter::available());
    assert!(h.backend.get(&key).expect("memory backend").is_some());
    assert_eq!(
        h.backend.keys("nearest-ref:v1:*").expect("memory backend").len(),
        1
    );

    let second = c
        .find_nearest_vehicle(query, StatusFilter::available())
        .expect("valid query")
        .expect("a vehicle matches");
    assert_eq!(first, second);
}

#[test]
fn status_change_invalidates_entries_naming_the_vehicle() {
    let h = harness();
    let c = &h.coordinator;
    c.register_vehicle("near", point(3.346, 6.598), VehicleStatus::Available)
        .expect("near registers");
    c.register_vehicle("far", point(3.40, 6.65), VehicleStatus::Available)
        .expect("far registers");
    let query = point(3.345, 6.597);

    let hit = c
        .find_nearest_vehicle(query, StatusFilter::available())
        .expect("valid query")
        .expect("a vehicle matches");
    assert_eq!(hit.vehicle.id, "near");

    c.update_vehicle_status("near", VehicleStatus::Busy)
        .expect("status update");
    assert!(h.backend.keys("nearest-ref:near:*").expect("memory backend").is_empty());

    let hit = c
        .find_nearest_vehicle(query, StatusFilter::available())
        .expect("valid query")
        .expect("a vehicle matches");
    assert_eq!(hit.vehicle.id, "far");
}

#[test]
fn position_change_invalidates_entries_naming_the_vehicle() {
    let h = harness();
    let c = &h.coordinator;
    c.register_vehicle("a", point(3.346, 6.598), VehicleStatus::Available)
        .expect("a registers");
    c.register_vehicle("b", point(3.36, 6.61), VehicleStatus::Available)
        .expect("b registers");
    let query = point(3.345, 6.597);

    assert_eq!(
        c.find_nearest_vehicle(query, StatusFilter::available())
            .expect("valid query")
            .expect("a vehicle matches")
            .vehicle
            .id,
        "a"
    );

    c.update_vehicle_position("a", point(4.0, 7.5))
        .expect("position update");
    let hit = c
        .find_nearest_vehicle(query, StatusFilter::available())
        .expect("valid query")
        .expect("a vehicle matches");
    assert_eq!(hit.vehicle.id, "b");
}

#[test]
fn stale_entries_are_rejected_even_without_invalidation() {
    let h = harness();
    let c = &h.coordinator;
    let before = c
        .register_vehicle("v1", point(3.346, 6.598), VehicleStatus::Available)
        .expect("v1 registers");
    c.register_vehicle("v2", point(3.36, 6.61), VehicleStatus::Available)
        .expect("v2 registers");
    c.update_vehicle_status("v1", VehicleStatus::Busy)
        .expect("status update");

    // Plant an answer captured before the status change, as a lagging
    // writer could.
    let query = point(3.345, 6.597);
    let key = DispatchCache::nearest_key(&NearestQuery::Point(query), StatusFilter::available());
    c.cache().put(
        &key,
        &CachedNearest {
            vehicle: before,
            distance_meters: 150.0,
        },
        Duration::from_secs(3600),
    );

    let hit = c
        .find_nearest_vehicle(query, StatusFilter::available())
        .expect("valid query")
        .expect("a vehicle matches");
    assert_eq!(hit.vehicle.id, "v2");

    // Dispatch ignores the same stale entry.
    let incident = c
        .create_incident(NewIncident::new("Ajah", query))
        .expect("incident created");
    c.cache().put(
        &key,
        &CachedNearest {
            vehicle: c.get_vehicle("v1").expect("v1 exists"),
            distance_meters: 150.0,
        },
        Duration::from_secs(3600),
    );
    assert_eq!(
        c.dispatch(&incident.id).expect("dispatch").vehicle.id,
        "v2"
    );
}

#[test]
fn dispatch_invalidates_cached_answers_for_the_vehicle() {
    let h = harness();
    let c = &h.coordinator;
    c.register_vehicle("v1", point(3.35, 6.60), VehicleStatus::Available)
        .expect("v1 registers");
    let query = point(3.345, 6.597);
    c.find_nearest_vehicle(query, StatusFilter::available())
        .expect("valid query")
        .expect("a vehicle matches");

    let incident = c
        .create_incident(NewIncident::new("Yaba", query))
        .expect("incident created");
    c.dispatch(&incident.id).expect("dispatch");

    assert!(c
        .find_nearest_vehicle(query, StatusFilter::available())
        .expect("valid query")
        .is_none());
    let any = c
        .find_nearest_vehicle(query, StatusFilter::any())
        .expect("valid query")
        .expect("the dispatched vehicle still exists");
    assert_eq!(any.vehicle.status, VehicleStatus::Dispatched);
}

struct DownBackend;

impl CacheBackend for DownBackend {
    fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    fn put(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    fn keys(&self, _pattern: &str) -> Result<Vec<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    fn delete(&self, _keys: &[String]) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

#[test]
fn unavailable_cache_never_fails_a_request() {
    let config = offline_config();
    let cache = DispatchCache::new(Arc::new(DownBackend), &CacheConfig::default());
    let c = DispatchCoordinator::builder(config.clone())
        .cache(cache.clone())
        .routing(RoutingClient::offline(cache, config.routing.fallback_speed_mps))
        .build()
        .expect("coordinator builds");

    c.register_vehicle("v1", point(3.35, 6.60), VehicleStatus::Available)
        .expect("v1 registers");
    let query = point(3.345, 6.597);
    assert!(c
        .find_nearest_vehicle(query, StatusFilter::available())
        .expect("valid query")
        .is_some());

    let incident = c
        .create_incident(NewIncident::new("Surulere", query))
        .expect("incident created");
    let result = c.dispatch(&incident.id).expect("dispatch succeeds");
    assert!(result.eta_seconds > 0.0);
    c.update_vehicle_position("v1", point(3.36, 6.61))
        .expect("position update");
}
