//! Shared fixtures for the dispatch integration tests.

use std::sync::Arc;

use dispatch_lib::{
    CacheConfig, DispatchCache, DispatchConfig, DispatchCoordinator, GeoPoint, MemoryCache,
    MemorySink, RoutingClient, VehicleStatus,
};

/// Shorthand for a point known to be valid.
pub fn point(longitude: f64, latitude: f64) -> GeoPoint {
    GeoPoint::new(longitude, latitude).expect("valid test coordinates")
}

/// Configuration that never calls the routing provider.
pub fn offline_config() -> DispatchConfig {
    let mut config = DispatchConfig::default();
    config.routing.offline = true;
    config
}

/// Coordinator with handles on its cache backend and event sink.
#[allow(dead_code)]
pub struct Harness {
    pub coordinator: DispatchCoordinator,
    pub backend: Arc<MemoryCache>,
    pub events: Arc<MemorySink>,
}

#[allow(dead_code)]
pub fn harness() -> Harness {
    let config = offline_config();
    let backend = Arc::new(MemoryCache::new());
    let cache = DispatchCache::new(backend.clone(), &CacheConfig::default());
    let events = Arc::new(MemorySink::new());
    let coordinator = DispatchCoordinator::builder(config.clone())
        .cache(cache.clone())
        .routing(RoutingClient::offline(
            cache,
            config.routing.fallback_speed_mps,
        ))
        .event_sink(events.clone())
        .build()
        .expect("coordinator builds");
    Harness {
        coordinator,
        backend,
        events,
    }
}

/// Register `count` available vehicles spread along a line of longitude.
#[allow(dead_code)]
pub fn register_line(coordinator: &DispatchCoordinator, prefix: &str, count: usize) {
    for i in 0..count {
        coordinator
            .register_vehicle(
                &format!("{prefix}-{i:03}"),
                point(3.30 + i as f64 * 0.001, 6.50),
                VehicleStatus::Available,
            )
            .expect("vehicle registers");
    }
}
