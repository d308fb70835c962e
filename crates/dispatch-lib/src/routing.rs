//! Route/ETA computation with a straight-line fallback.
//!
//! [`RoutingClient::route`] never fails. A provider answer is cached for the
//! route TTL; when the provider is unreachable, slow or has no route, the
//! client returns a great-circle estimate at a constant speed and does not
//! cache it.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::DispatchCache;
use crate::config::RoutingConfig;
use crate::error::{Error, Result};
use crate::geo::{haversine_distance, GeoPoint};

/// Where a [`RouteResult`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    Provider,
    Fallback,
}

/// Distance, duration and geometry between two points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub distance_meters: f64,
    pub duration_seconds: f64,
    /// `[longitude, latitude]` pairs from origin to destination.
    pub polyline: Vec<[f64; 2]>,
    pub source: RouteSource,
}

impl RouteResult {
    /// Great-circle estimate at a constant average speed.
    pub fn straight_line(origin: &GeoPoint, destination: &GeoPoint, speed_mps: f64) -> Self {
        let distance_meters = haversine_distance(origin, destination);
        Self {
            distance_meters,
            duration_seconds: distance_meters / speed_mps,
            polyline: vec![origin.to_pair(), destination.to_pair()],
            source: RouteSource::Fallback,
        }
    }
}

/// Failure reported by a [`RouteProvider`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("provider returned no route")]
    NoRoute,

    #[error("malformed provider response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Unreachable(err.to_string())
        }
    }
}

/// External road-routing service.
pub trait RouteProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn route(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> std::result::Result<RouteResult, ProviderError>;
}

/// Client for the OSRM HTTP route service.
#[derive(Debug, Clone)]
pub struct OsrmProvider {
    client: Client,
    base_url: String,
}

impl OsrmProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &RoutingConfig) -> Result<Self> {
        Self::new(config.base_url.clone(), config.timeout())
    }

    /// URL of the driving route between two points.
    pub fn route_url(&self, origin: &GeoPoint, destination: &GeoPoint) -> String {
        format!(
            "{}/route/v1/driving/{},{};{},{}?overview=full&geometries=geojson",
            self.base_url,
            origin.longitude,
            origin.latitude,
            destination.longitude,
            destination.latitude
        )
    }
}

fn user_agent() -> String {
    format!("dispatch-lib/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    #[serde(default)]
    geometry: Option<OsrmGeometry>,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    #[serde(default)]
    coordinates: Vec<[f64; 2]>,
}

/// Turn an OSRM response body into a [`RouteResult`].
fn parse_osrm_response(body: OsrmResponse) -> std::result::Result<RouteResult, ProviderError> {
    if body.code != "Ok" {
        return match body.code.as_str() {
            "NoRoute" | "NoSegment" => Err(ProviderError::NoRoute),
            code => Err(ProviderError::InvalidResponse(format!(
                "code {}: {}",
                code,
                body.message.unwrap_or_default()
            ))),
        };
    }

    let route = body.routes.into_iter().next().ok_or(ProviderError::NoRoute)?;
    if !route.distance.is_finite()
        || !route.duration.is_finite()
        || route.distance < 0.0
        || route.duration < 0.0
    {
        return Err(ProviderError::InvalidResponse(format!(
            "distance {} / duration {}",
            route.distance, route.duration
        )));
    }

    Ok(RouteResult {
        distance_meters: route.distance,
        duration_seconds: route.duration,
        polyline: route.geometry.map(|g| g.coordinates).unwrap_or_default(),
        source: RouteSource::Provider,
    })
}

impl RouteProvider for OsrmProvider {
    fn name(&self) -> &str {
        "osrm"
    }

    fn route(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> std::result::Result<RouteResult, ProviderError> {
        let url = self.route_url(origin, destination);
        debug!(%url, "requesting route");

        let response = self.client.get(&url).send()?;
        // OSRM reports NoRoute with a 400 status and a JSON body.
        let body = response.json::<OsrmResponse>()?;
        parse_osrm_response(body)
    }
}

/// Cache-checked routing with a never-failing fallback.
#[derive(Clone)]
pub struct RoutingClient {
    provider: Option<Arc<dyn RouteProvider>>,
    cache: DispatchCache,
    fallback_speed_mps: f64,
}

impl RoutingClient {
    pub fn new(provider: Arc<dyn RouteProvider>, cache: DispatchCache, fallback_speed_mps: f64) -> Self {
        Self {
            provider: Some(provider),
            cache,
            fallback_speed_mps,
        }
    }

    /// Client that never calls a provider.
    pub fn offline(cache: DispatchCache, fallback_speed_mps: f64) -> Self {
        Self {
            provider: None,
            cache,
            fallback_speed_mps,
        }
    }

    /// Build from configuration: an [`OsrmProvider`] unless `offline` is set.
    pub fn from_config(config: &RoutingConfig, cache: DispatchCache) -> Result<Self> {
        if config.offline {
            return Ok(Self::offline(cache, config.fallback_speed_mps));
        }
        let provider = OsrmProvider::from_config(config)?;
        Ok(Self::new(
            Arc::new(provider),
            cache,
            config.fallback_speed_mps,
        ))
    }

    pub fn is_offline(&self) -> bool {
        self.provider.is_none()
    }

    /// Route between two points.
    pub fn route(&self, origin: &GeoPoint, destination: &GeoPoint) -> RouteResult {
        let key = DispatchCache::route_key(origin, destination);
        if let Some(cached) = self.cache.get::<RouteResult>(&key) {
            return cached;
        }

        let Some(provider) = &self.provider else {
            return self.fallback(origin, destination);
        };

        match provider.route(origin, destination) {
            Ok(route) => {
                self.cache.put(&key, &route, self.cache.route_ttl());
                route
            }
            Err(e) => {
                warn!(
                    provider = provider.name(),
                    error = %e,
                    "routing provider failed, using straight-line estimate"
                );
                self.fallback(origin, destination)
            }
        }
    }

    fn fallback(&self, origin: &GeoPoint, destination: &GeoPoint) -> RouteResult {
        RouteResult::straight_line(origin, destination, self.fallback_speed_mps)
    }
}

impl std::fmt::Debug for RoutingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingClient")
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("fallback_speed_mps", &self.fallback_speed_mps)
            .finish()
    }
}
