//! TTL cache for nearest-vehicle lookups and routes.
//!
//! The cache is an optimization layer. [`DispatchCache`] swallows every
//! backend failure: reads degrade to a miss, writes and invalidations are
//! logged and dropped. Callers always keep an authoritative path (the spatial
//! index or the routing provider) and never see a cache error.
//!
//! # Key layout
//!
//! ```text
//! nearest:{filter}:pt:{lon}:{lat}         nearest match for a query point
//! nearest:{filter}:poi:{poi_id}           nearest match for a point of interest
//! nearest-ref:{vehicle_id}:{primary key}  marker naming the vehicle a primary entry points at
//! route:{olon}:{olat}:{dlon}:{dlat}       route between two rounded points
//! ```
//!
//! Invalidating a vehicle pattern-matches `nearest-ref:{vehicle_id}:*` and
//! deletes each marker together with the primary entry it names.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::geo::GeoPoint;
use crate::model::StatusFilter;

const NEAREST_PREFIX: &str = "nearest:";
const NEAREST_REF_PREFIX: &str = "nearest-ref:";
const ROUTE_PREFIX: &str = "route:";

/// Failure reported by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached or timed out.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Storage behind the cache layer.
///
/// Values are opaque strings (JSON in practice), mirroring a networked
/// key-value store. Patterns use `*` as the only wildcard.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;
    fn delete(&self, keys: &[String]) -> Result<usize, CacheError>;
}

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// In-process backend with lazy expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now() + ttl;
        self.lock()
            .insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.lock();
        entries.retain(|_, entry| entry.expires_at > now);
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, keys: &[String]) -> Result<usize, CacheError> {
        let mut entries = self.lock();
        Ok(keys.iter().filter(|k| entries.remove(*k).is_some()).count())
    }
}

/// Match `key` against `pattern`, where `*` matches any run of characters.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };

    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        // No wildcard at all.
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

/// What a nearest-vehicle entry answers.
#[derive(Debug, Clone, PartialEq)]
pub enum NearestQuery {
    Point(GeoPoint),
    PointOfInterest(String),
}

/// Typed, failure-tolerant facade over a [`CacheBackend`].
#[derive(Clone)]
pub struct DispatchCache {
    backend: Arc<dyn CacheBackend>,
    nearest_ttl: Duration,
    route_ttl: Duration,
}

impl DispatchCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        Self {
            backend,
            nearest_ttl: config.nearest_ttl(),
            route_ttl: config.route_ttl(),
        }
    }

    /// Cache backed by a fresh [`MemoryCache`].
    pub fn in_memory(config: &CacheConfig) -> Self {
        Self::new(Arc::new(MemoryCache::new()), config)
    }

    pub fn nearest_ttl(&self) -> Duration {
        self.nearest_ttl
    }

    pub fn route_ttl(&self) -> Duration {
        self.route_ttl
    }

    /// Key for a nearest-vehicle entry.
    pub fn nearest_key(query: &NearestQuery, filter: StatusFilter) -> String {
        match query {
            NearestQuery::Point(point) => format!(
                "{}{}:pt:{}",
                NEAREST_PREFIX,
                filter.cache_tag(),
                point.cache_fragment()
            ),
            NearestQuery::PointOfInterest(id) => {
                format!("{}{}:poi:{}", NEAREST_PREFIX, filter.cache_tag(), id)
            }
        }
    }

    /// Key for a route between two points.
    pub fn route_key(origin: &GeoPoint, destination: &GeoPoint) -> String {
        format!(
            "{}{}:{}",
            ROUTE_PREFIX,
            origin.rounded_fragment(),
            destination.rounded_fragment()
        )
    }

    /// Read and decode a value. Any failure is a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "discarding undecodable cache entry");
                self.delete(&[key.to_string()]);
                None
            }
        }
    }

    /// Encode and store a value with a TTL. Failures are logged.
    pub fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "failed to encode cache entry");
                return;
            }
        };
        if let Err(e) = self.backend.put(key, raw, ttl) {
            warn!(key, error = %e, "cache write failed");
        }
    }

    /// Delete every key matching `pattern`. Returns the number removed.
    pub fn invalidate(&self, pattern: &str) -> usize {
        match self.backend.keys(pattern) {
            Ok(keys) if keys.is_empty() => 0,
            Ok(keys) => self.delete(&keys),
            Err(e) => {
                warn!(pattern, error = %e, "cache invalidation failed");
                0
            }
        }
    }

    /// Store a nearest-vehicle entry and its per-vehicle marker.
    pub fn put_nearest<T: Serialize>(&self, key: &str, vehicle_id: &str, value: &T) {
        self.put(key, value, self.nearest_ttl);
        let marker = format!("{}{}:{}", NEAREST_REF_PREFIX, vehicle_id, key);
        self.put(&marker, &key, self.nearest_ttl);
    }

    /// Drop every nearest-vehicle entry that points at `vehicle_id`.
    pub fn invalidate_vehicle(&self, vehicle_id: &str) -> usize {
        let marker_prefix = format!("{}{}:", NEAREST_REF_PREFIX, vehicle_id);
        let markers = match self.backend.keys(&format!("{}*", marker_prefix)) {
            Ok(markers) => markers,
            Err(e) => {
                warn!(vehicle_id, error = %e, "cache invalidation failed");
                return 0;
            }
        };
        if markers.is_empty() {
            return 0;
        }

        let mut doomed: Vec<String> = markers
            .iter()
            .filter_map(|marker| marker.strip_prefix(&marker_prefix))
            .map(str::to_string)
            .collect();
        let primaries = doomed.len();
        doomed.extend(markers);
        self.delete(&doomed);

        debug!(vehicle_id, entries = primaries, "invalidated nearest-vehicle entries");
        primaries
    }

    fn delete(&self, keys: &[String]) -> usize {
        match self.backend.delete(keys) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(keys = keys.len(), error = %e, "cache delete failed");
                0
            }
        }
    }
}

impl std::fmt::Debug for DispatchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchCache")
            .field("nearest_ttl", &self.nearest_ttl)
            .field("route_ttl", &self.route_ttl)
            .finish()
    }
}

/// Payload stored for a nearest-vehicle entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedNearest<V> {
    pub vehicle: V,
    pub distance_meters: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CacheConfig {
        CacheConfig::default()
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
    fn glob_matching() {
        assert!(glob_match("nearest-ref:amb-1:*", "nearest-ref:amb-1:nearest:available:pt:1:2"));
        assert!(!glob_match("nearest-ref:amb-1:*", "nearest-ref:amb-10:x"));
        assert!(glob_match("route:*", "route:1:2:3:4"));
        assert!(glob_match("*:poi:*", "nearest:available:poi:h1"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exact-not"));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXcYYb"));
        assert!(glob_match("ab*b", "abb"));
        assert!(!glob_match("ab*b", "ab"));
    }

    #[test]
    fn memory_cache_expires_entries() {
        let cache = MemoryCache::new();
        cache
            .put("k", "v".into(), Duration::from_millis(20))
            .unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("v"));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("k").unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn typed_round_trip_returns_fresh_copies() {
        let cache = DispatchCache::in_memory(&config());
        let value = CachedNearest {
            vehicle: "amb-1".to_string(),
            distance_meters: 12.5,
        };
        cache.put("nearest:available:pt:1:2", &value, Duration::from_secs(60));

        let mut first: CachedNearest<String> = cache.get("nearest:available:pt:1:2").unwrap();
        first.distance_meters = 0.0;
        let second: CachedNearest<String> = cache.get("nearest:available:pt:1:2").unwrap();
        assert_eq!(second.distance_meters, 12.5);
    }

    #[test]
    fn invalidate_vehicle_removes_only_its_entries() {
        let backend = Arc::new(MemoryCache::new());
        let cache = DispatchCache::new(backend.clone(), &config());
        let a = DispatchCache::nearest_key(
            &NearestQuery::Point(GeoPoint::new(1.0, 2.0).unwrap()),
            StatusFilter::available(),
        );
        let b = DispatchCache::nearest_key(
            &NearestQuery::PointOfInterest("h1".into()),
            StatusFilter::available(),
        );
        cache.put_nearest(&a, "amb-1", &1u32);
        cache.put_nearest(&b, "amb-10", &2u32);

        assert_eq!(cache.invalidate_vehicle("amb-1"), 1);
        assert_eq!(cache.get::<u32>(&a), None);
        assert_eq!(cache.get::<u32>(&b), Some(2));
        // Only b and its marker remain.
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn invalidate_by_pattern() {
        let cache = DispatchCache::in_memory(&config());
        cache.put("route:a", &1u8, Duration::from_secs(60));
        cache.put("route:b", &2u8, Duration::from_secs(60));
        cache.put("nearest:x", &3u8, Duration::from_secs(60));
        assert_eq!(cache.invalidate("route:*"), 2);
        assert_eq!(cache.get::<u8>("nearest:x"), Some(3));
    }

    #[test]
    fn unavailable_backend_degrades_to_miss() {
        let cache = DispatchCache::new(Arc::new(DownBackend), &config());
        cache.put("k", &1u8, Duration::from_secs(1));
        assert_eq!(cache.get::<u8>("k"), None);
        assert_eq!(cache.invalidate("*"), 0);
        assert_eq!(cache.invalidate_vehicle("amb-1"), 0);
    }

    #[test]
    fn corrupt_entries_are_discarded() {
        let backend = Arc::new(MemoryCache::new());
        backend
            .put("k", "{not json".into(), Duration::from_secs(60))
            .unwrap();
        let cache = DispatchCache::new(backend.clone(), &config());
        assert_eq!(cache.get::<u8>("k"), None);
        assert!(backend.is_empty());
    }

    #[test]
    fn key_rendering() {
        let point = GeoPoint::new(3.345, 6.597).unwrap();
        assert_eq!(
            DispatchCache::nearest_key(&NearestQuery::Point(point), StatusFilter::available()),
            "nearest:available:pt:3.345000:6.597000"
        );
        let dest = GeoPoint::new(3.35, 6.6).unwrap();
        assert_eq!(
            DispatchCache::route_key(&point, &dest),
            "route:3.34500:6.59700:3.35000:6.60000"
        );
    }
}
