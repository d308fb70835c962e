//! Engine configuration.
//!
//! # Environment Variables
//!
//! - `DISPATCH_OSRM_BASE_URL`: routing provider base URL
//!   (default `https://router.project-osrm.org`)
//! - `DISPATCH_ROUTING_TIMEOUT_MS`: provider timeout (default 5000)
//! - `DISPATCH_ROUTING_OFFLINE`: `1`/`true`/`yes`/`on` skips the provider and
//!   always uses the straight-line estimate
//! - `DISPATCH_NEAREST_TTL_SECS`: nearest-vehicle cache TTL (default 60)
//! - `DISPATCH_ROUTE_TTL_SECS`: route cache TTL (default 300)
//! - `DISPATCH_EVENT_QUEUE_CAPACITY`: outbound event queue size (default 1024)

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_OSRM_BASE_URL: &str = "https://router.project-osrm.org";

/// Average speed assumed by the straight-line fallback, in meters per second.
pub const DEFAULT_FALLBACK_SPEED_MPS: f64 = 15.0;

/// Routing provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub fallback_speed_mps: f64,
    /// Never call the provider.
    pub offline: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OSRM_BASE_URL.to_string(),
            timeout_ms: 5_000,
            fallback_speed_mps: DEFAULT_FALLBACK_SPEED_MPS,
            offline: false,
        }
    }
}

impl RoutingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Cache TTLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub nearest_ttl_secs: u64,
    pub route_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            nearest_ttl_secs: 60,
            route_ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn nearest_ttl(&self) -> Duration {
        Duration::from_secs(self.nearest_ttl_secs)
    }

    pub fn route_ttl(&self) -> Duration {
        Duration::from_secs(self.route_ttl_secs)
    }
}

/// Event notifier settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventConfig {
    pub queue_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub events: EventConfig,
}

impl DispatchConfig {
    /// Create configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// Tests use this instead of mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("DISPATCH_OSRM_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config.routing.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(ms) = parse_var(&lookup, "DISPATCH_ROUTING_TIMEOUT_MS")? {
            config.routing.timeout_ms = ms;
        }
        if let Some(raw) = lookup("DISPATCH_ROUTING_OFFLINE") {
            config.routing.offline = parse_bool(&raw);
        }
        if let Some(secs) = parse_var(&lookup, "DISPATCH_NEAREST_TTL_SECS")? {
            config.cache.nearest_ttl_secs = secs;
        }
        if let Some(secs) = parse_var(&lookup, "DISPATCH_ROUTE_TTL_SECS")? {
            config.cache.route_ttl_secs = secs;
        }
        if let Some(capacity) = parse_var::<usize, _>(&lookup, "DISPATCH_EVENT_QUEUE_CAPACITY")? {
            if capacity == 0 {
                return Err(Error::validation(
                    "DISPATCH_EVENT_QUEUE_CAPACITY",
                    "must be at least 1",
                ));
            }
            config.events.queue_capacity = capacity;
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::validation(name, format!("'{}' is not a valid number", raw))),
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = DispatchConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, DispatchConfig::default());
        assert_eq!(config.cache.nearest_ttl(), Duration::from_secs(60));
        assert_eq!(config.cache.route_ttl(), Duration::from_secs(300));
        assert_eq!(config.routing.fallback_speed_mps, 15.0);
        assert_eq!(config.routing.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn overrides_from_variables() {
        let config = DispatchConfig::from_lookup(lookup_from(&[
            ("DISPATCH_OSRM_BASE_URL", "http://localhost:5000/"),
            ("DISPATCH_ROUTING_TIMEOUT_MS", "250"),
            ("DISPATCH_ROUTING_OFFLINE", "Yes"),
            ("DISPATCH_NEAREST_TTL_SECS", "5"),
            ("DISPATCH_EVENT_QUEUE_CAPACITY", "8"),
        ]))
        .unwrap();

        assert_eq!(config.routing.base_url, "http://localhost:5000");
        assert_eq!(config.routing.timeout_ms, 250);
        assert!(config.routing.offline);
        assert_eq!(config.cache.nearest_ttl_secs, 5);
        assert_eq!(config.cache.route_ttl_secs, 300);
        assert_eq!(config.events.queue_capacity, 8);
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let err = DispatchConfig::from_lookup(lookup_from(&[(
            "DISPATCH_ROUTE_TTL_SECS",
            "five minutes",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("DISPATCH_ROUTE_TTL_SECS"));
    }

    #[test]
    fn zero_queue_capacity_rejected() {
        assert!(DispatchConfig::from_lookup(lookup_from(&[(
            "DISPATCH_EVENT_QUEUE_CAPACITY",
            "0"
        )]))
        .is_err());
    }
}
