//! Routing client behavior when the provider cannot help.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dispatch_lib::{
    CacheConfig, DispatchCache, GeoPoint, ProviderError, RouteProvider, RouteResult, RouteSource,
    RoutingClient, RoutingConfig,
};

struct UnreachableProvider {
    calls: AtomicUsize,
}

impl RouteProvider for UnreachableProvider {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn route(
        &self,
        _origin: &GeoPoint,
        _destination: &GeoPoint,
    ) -> Result<RouteResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Unreachable("connection refused".into()))
    }
}

fn client() -> (RoutingClient, Arc<UnreachableProvider>) {
    let provider = Arc::new(UnreachableProvider {
        calls: AtomicUsize::new(0),
    });
    let client = RoutingClient::new(
        provider.clone(),
        DispatchCache::in_memory(&CacheConfig::default()),
        RoutingConfig::default().fallback_speed_mps,
    );
    (client, provider)
}

#[test]
fn fallback_is_symmetric() {
    let (client, _) = client();
    let a = GeoPoint::new(3.35, 6.60).expect("valid");
    let b = GeoPoint::new(3.421, 6.452).expect("valid");

    let ab = client.route(&a, &b);
    let ba = client.route(&b, &a);
    assert_eq!(ab.source, RouteSource::Fallback);
    assert!((ab.distance_meters - ba.distance_meters).abs() < 1e-6);
    for route in [&ab, &ba] {
        assert!(route.duration_seconds.is_finite());
        assert!(route.duration_seconds > 0.0);
    }
}

#[test]
fn fallback_uses_fifteen_meters_per_second() {
    let (client, _) = client();
    let a = GeoPoint::new(0.0, 0.0).expect("valid");
    let b = GeoPoint::new(0.0, 1.0).expect("valid");
    let route = client.route(&a, &b);
    assert!((route.distance_meters - 111_194.93).abs() < 1.0);
    assert!((route.duration_seconds - route.distance_meters / 15.0).abs() < 1e-6);
}

#[test]
fn provider_outage_does_not_poison_the_cache() {
    let (client, provider) = client();
    let a = GeoPoint::new(3.35, 6.60).expect("valid");
    let b = GeoPoint::new(3.345, 6.597).expect("valid");
    for _ in 0..3 {
        client.route(&a, &b);
    }
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn offline_client_never_calls_out() {
    let config = RoutingConfig {
        offline: true,
        ..RoutingConfig::default()
    };
    let client = RoutingClient::from_config(&config, DispatchCache::in_memory(&CacheConfig::default()))
        .expect("client builds");
    assert!(client.is_offline());
    let a = GeoPoint::new(3.35, 6.60).expect("valid");
    let b = GeoPoint::new(3.345, 6.597).expect("valid");
    assert_eq!(client.route(&a, &b).source, RouteSource::Fallback);
}
