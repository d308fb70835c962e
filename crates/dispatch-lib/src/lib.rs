//! Dispatch engine library entry points.
//!
//! This crate matches emergency incidents to the nearest available response
//! vehicle, computes a route/ETA for the match and keeps incident and vehicle
//! state consistent under concurrent requests. Front ends (the CLI, a future
//! HTTP layer) should drive everything through [`DispatchCoordinator`]
//! instead of reimplementing behavior.
//!

#![deny(warnings)]

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod geo;
pub mod model;
pub mod routing;
pub mod spatial;
pub mod store;

pub use cache::{CacheBackend, CacheError, CachedNearest, DispatchCache, MemoryCache};
pub use config::{CacheConfig, DispatchConfig, EventConfig, RoutingConfig};
pub use coordinator::{
    CoordinatorBuilder, DispatchCoordinator, DispatchResult, LoadSummary, NearestVehicle,
};
pub use error::{EntityKind, Error, ErrorKind, Result};
pub use events::{DispatchEvent, EventError, EventNotifier, EventSink, MemorySink, TracingSink};
pub use geo::{haversine_distance, GeoPoint, EARTH_RADIUS_METERS};
pub use model::{
    Incident, IncidentId, IncidentPriority, IncidentStatus, NewIncident, PointOfInterest, PoiId,
    StatusFilter, Vehicle, VehicleId, VehicleStatus,
};
pub use routing::{OsrmProvider, ProviderError, RouteProvider, RouteResult, RouteSource, RoutingClient};
pub use spatial::{Neighbour, SpatialIndex};
pub use store::{DispatchStore, SqliteStore};
