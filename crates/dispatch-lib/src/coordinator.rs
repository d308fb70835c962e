//! Dispatch coordinator: the only writer of vehicle and incident state.
//!
//! # Locking
//!
//! Every vehicle and incident sits behind its own mutex. Operations that
//! touch both take the incident lock first, then the vehicle lock, then the
//! spatial index write lock. The dispatch claim (check AVAILABLE, flip both
//! entities) and the release on a terminal incident status each happen inside
//! one such critical section, so no intermediate state is observable.
//!
//! Routing, cache invalidation and event publication run after the locks are
//! dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CachedNearest, DispatchCache, NearestQuery};
use crate::config::DispatchConfig;
use crate::error::{EntityKind, Error, Result};
use crate::events::{DispatchEvent, EventNotifier, EventSink, TracingSink};
use crate::geo::GeoPoint;
use crate::model::{
    validate_entity_id, Incident, IncidentId, IncidentStatus, NewIncident, PointOfInterest,
    PoiId, StatusFilter, Vehicle, VehicleId, VehicleStatus,
};
use crate::routing::{RouteResult, RoutingClient};
use crate::spatial::SpatialIndex;
use crate::store::DispatchStore;

/// Claim rounds before a dispatch gives up with [`Error::NoCapacity`].
pub const MAX_CLAIM_ROUNDS: usize = 3;

/// Candidates tried per claim round.
const CANDIDATES_PER_ROUND: usize = 8;

/// Outcome of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub incident: Incident,
    pub vehicle: Vehicle,
    pub distance_meters: f64,
    pub eta_seconds: f64,
    pub route: RouteResult,
}

/// A nearest-vehicle answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestVehicle {
    pub vehicle: Vehicle,
    pub distance_meters: f64,
}

/// Counts of records loaded by [`DispatchCoordinator::load_from_store`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub vehicles: usize,
    pub incidents: usize,
    pub points_of_interest: usize,
}

/// Result of trying to claim one candidate vehicle.
enum Claim {
    Won(Box<(Incident, Vehicle)>),
    Lost,
}

/// Builder wiring the coordinator's collaborators.
pub struct CoordinatorBuilder {
    config: DispatchConfig,
    cache: Option<DispatchCache>,
    routing: Option<RoutingClient>,
    store: Option<Arc<dyn DispatchStore>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl CoordinatorBuilder {
    pub fn cache(mut self, cache: DispatchCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn routing(mut self, routing: RoutingClient) -> Self {
        self.routing = Some(routing);
        self
    }

    pub fn store(mut self, store: Arc<dyn DispatchStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the coordinator, filling unset collaborators from the config:
    /// an in-memory cache, a routing client and a tracing event sink.
    pub fn build(self) -> Result<DispatchCoordinator> {
        let cache = self
            .cache
            .unwrap_or_else(|| DispatchCache::in_memory(&self.config.cache));
        let routing = match self.routing {
            Some(routing) => routing,
            None => RoutingClient::from_config(&self.config.routing, cache.clone())?,
        };
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn EventSink>);
        let events = EventNotifier::new(sink, &self.config.events)?;

        Ok(DispatchCoordinator {
            vehicles: RwLock::new(HashMap::new()),
            incidents: RwLock::new(HashMap::new()),
            points_of_interest: RwLock::new(HashMap::new()),
            index: SpatialIndex::new(),
            cache,
            routing,
            store: self.store,
            events,
        })
    }
}

type Shared<T> = Arc<Mutex<T>>;

/// Owns the entity store and drives the incident/vehicle state machine.
pub struct DispatchCoordinator {
    vehicles: RwLock<HashMap<VehicleId, Shared<Vehicle>>>,
    incidents: RwLock<HashMap<IncidentId, Shared<Incident>>>,
    points_of_interest: RwLock<HashMap<PoiId, PointOfInterest>>,
    index: SpatialIndex,
    cache: DispatchCache,
    routing: RoutingClient,
    store: Option<Arc<dyn DispatchStore>>,
    events: EventNotifier,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DispatchCoordinator {
    pub fn builder(config: DispatchConfig) -> CoordinatorBuilder {
        CoordinatorBuilder {
            config,
            cache: None,
            routing: None,
            store: None,
            sink: None,
        }
    }

    pub fn cache(&self) -> &DispatchCache {
        &self.cache
    }

    pub fn spatial_index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Populate the entity store and spatial index from the persistent store.
    ///
    /// Meant for startup; records already in memory are overwritten.
    pub fn load_from_store(&self) -> Result<LoadSummary> {
        let Some(store) = &self.store else {
            return Ok(LoadSummary::default());
        };

        let vehicles = store.load_vehicles()?;
        let incidents = store.load_incidents()?;
        let pois = store.load_points_of_interest()?;
        let summary = LoadSummary {
            vehicles: vehicles.len(),
            incidents: incidents.len(),
            points_of_interest: pois.len(),
        };

        {
            let mut map = self.vehicles.write().unwrap_or_else(PoisonError::into_inner);
            for vehicle in vehicles {
                self.index
                    .upsert(&vehicle.id, vehicle.position, vehicle.status);
                map.insert(vehicle.id.clone(), Arc::new(Mutex::new(vehicle)));
            }
        }
        {
            let mut map = self.incidents.write().unwrap_or_else(PoisonError::into_inner);
            for incident in incidents {
                map.insert(incident.id.clone(), Arc::new(Mutex::new(incident)));
            }
        }
        {
            let mut map = self
                .points_of_interest
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for poi in pois {
                map.insert(poi.id.clone(), poi);
            }
        }
        self.cache.invalidate("nearest*");

        info!(
            vehicles = summary.vehicles,
            incidents = summary.incidents,
            points_of_interest = summary.points_of_interest,
            "loaded dispatch state"
        );
        Ok(summary)
    }

    /// Add a vehicle to the entity set.
    pub fn register_vehicle(
        &self,
        id: &str,
        position: GeoPoint,
        status: VehicleStatus,
    ) -> Result<Vehicle> {
        validate_entity_id("vehicle id", id)?;
        position.validate()?;
        if status == VehicleStatus::Dispatched {
            return Err(Error::validation(
                "vehicle status",
                "vehicles can only become dispatched through dispatch",
            ));
        }

        let vehicle = Vehicle {
            id: id.to_string(),
            status,
            position,
            last_updated: Utc::now(),
            assigned_incident: None,
        };

        {
            let mut map = self.vehicles.write().unwrap_or_else(PoisonError::into_inner);
            if map.contains_key(id) {
                return Err(Error::already_exists(EntityKind::Vehicle, id));
            }
            self.index.upsert(id, position, status);
            map.insert(vehicle.id.clone(), Arc::new(Mutex::new(vehicle.clone())));
        }
        self.persist_vehicle(&vehicle);

        info!(vehicle_id = %vehicle.id, status = %status, "registered vehicle");
        Ok(vehicle)
    }

    /// Add a point of interest such as a hospital.
    pub fn register_point_of_interest(
        &self,
        id: &str,
        name: &str,
        position: GeoPoint,
    ) -> Result<PointOfInterest> {
        validate_entity_id("point of interest id", id)?;
        if name.trim().is_empty() {
            return Err(Error::validation("name", "must not be empty"));
        }
        position.validate()?;

        let poi = PointOfInterest {
            id: id.to_string(),
            name: name.trim().to_string(),
            position,
            created_at: Utc::now(),
        };
        {
            let mut map = self
                .points_of_interest
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if map.contains_key(id) {
                return Err(Error::already_exists(EntityKind::PointOfInterest, id));
            }
            map.insert(poi.id.clone(), poi.clone());
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.save_point_of_interest(&poi) {
                warn!(poi_id = %poi.id, error = %e, "failed to persist point of interest");
            }
        }
        Ok(poi)
    }

    /// Create a PENDING incident.
    pub fn create_incident(&self, new: NewIncident) -> Result<Incident> {
        let address = new.address.trim();
        if address.is_empty() {
            return Err(Error::validation("address", "must not be empty"));
        }
        new.position.validate()?;

        let now = Utc::now();
        let incident = Incident {
            id: Uuid::now_v7().to_string(),
            address: address.to_string(),
            position: new.position,
            priority: new.priority,
            note: new.note.filter(|n| !n.trim().is_empty()),
            status: IncidentStatus::Pending,
            assigned_vehicle: None,
            created_at: now,
            updated_at: now,
        };

        self.incidents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(incident.id.clone(), Arc::new(Mutex::new(incident.clone())));
        self.persist_incident(&incident);

        info!(incident_id = %incident.id, priority = %incident.priority, "incident created");
        self.events.publish(DispatchEvent::IncidentCreated {
            incident: incident.clone(),
        });
        Ok(incident)
    }

    /// Assign the nearest AVAILABLE vehicle to a PENDING incident.
    pub fn dispatch(&self, incident_id: &str) -> Result<DispatchResult> {
        let incident_cell = self.incident_cell(incident_id)?;
        let target = {
            let incident = lock(&incident_cell);
            if incident.status != IncidentStatus::Pending {
                return Err(Error::invalid_state(
                    EntityKind::Incident,
                    incident_id,
                    incident.status,
                    IncidentStatus::Dispatched,
                ));
            }
            incident.position
        };

        let filter = StatusFilter::available();
        let mut claimed = None;
        let mut tried_cached = false;

        'rounds: for round in 0..MAX_CLAIM_ROUNDS {
            let mut candidates: Vec<VehicleId> = Vec::new();
            if !tried_cached {
                tried_cached = true;
                if let Some(hit) = self.cached_nearest(&NearestQuery::Point(target), filter) {
                    candidates.push(hit.vehicle.id);
                }
            }
            candidates.extend(
                self.index
                    .nearest_n(target, filter, CANDIDATES_PER_ROUND)
                    .into_iter()
                    .map(|n| n.vehicle_id),
            );
            if candidates.is_empty() {
                break;
            }

            for vehicle_id in &candidates {
                match self.try_claim(&incident_cell, vehicle_id)? {
                    Claim::Won(pair) => {
                        claimed = Some(*pair);
                        break 'rounds;
                    }
                    Claim::Lost => {
                        debug!(incident_id, vehicle_id = %vehicle_id, round, "candidate already claimed");
                    }
                }
            }
        }

        let Some((incident, vehicle)) = claimed else {
            info!(incident_id, "no vehicle available for dispatch");
            return Err(Error::NoCapacity {
                incident_id: incident_id.to_string(),
            });
        };

        let route = self.routing.route(&vehicle.position, &incident.position);
        self.cache.invalidate_vehicle(&vehicle.id);

        info!(
            incident_id = %incident.id,
            vehicle_id = %vehicle.id,
            distance_m = route.distance_meters,
            eta_s = route.duration_seconds,
            "incident dispatched"
        );
        self.events.publish(DispatchEvent::VehicleStatusChanged {
            vehicle_id: vehicle.id.clone(),
            from: VehicleStatus::Available,
            to: VehicleStatus::Dispatched,
            incident_id: Some(incident.id.clone()),
        });
        self.events.publish(DispatchEvent::IncidentDispatched {
            incident_id: incident.id.clone(),
            vehicle_id: vehicle.id.clone(),
            distance_meters: route.distance_meters,
            eta_seconds: route.duration_seconds,
        });

        Ok(DispatchResult {
            distance_meters: route.distance_meters,
            eta_seconds: route.duration_seconds,
            incident,
            vehicle,
            route,
        })
    }

    /// Atomically pair a PENDING incident with an AVAILABLE vehicle.
    fn try_claim(&self, incident_cell: &Shared<Incident>, vehicle_id: &str) -> Result<Claim> {
        let Some(vehicle_cell) = self.vehicle_cell_opt(vehicle_id) else {
            return Ok(Claim::Lost);
        };

        let mut incident = lock(incident_cell);
        if incident.status != IncidentStatus::Pending {
            // A concurrent dispatch of the same incident won.
            return Err(Error::invalid_state(
                EntityKind::Incident,
                incident.id.clone(),
                incident.status,
                IncidentStatus::Dispatched,
            ));
        }

        let mut vehicle = lock(&vehicle_cell);
        if vehicle.status != VehicleStatus::Available {
            return Ok(Claim::Lost);
        }

        let now = Utc::now();
        vehicle.status = VehicleStatus::Dispatched;
        vehicle.assigned_incident = Some(incident.id.clone());
        vehicle.last_updated = now;
        self.index.set_status(&vehicle.id, VehicleStatus::Dispatched);

        incident.status = IncidentStatus::Dispatched;
        incident.assigned_vehicle = Some(vehicle.id.clone());
        incident.updated_at = now;

        self.persist_vehicle(&vehicle);
        self.persist_incident(&incident);

        Ok(Claim::Won(Box::new((incident.clone(), vehicle.clone()))))
    }

    /// Apply an explicit incident status change.
    ///
    /// Moving to RESOLVED or CANCELLED releases the assigned vehicle back to
    /// AVAILABLE in the same critical section.
    pub fn update_incident_status(
        &self,
        incident_id: &str,
        status: IncidentStatus,
    ) -> Result<Incident> {
        let incident_cell = self.incident_cell(incident_id)?;
        let (incident, from, released) = {
            let mut incident = lock(&incident_cell);
            let from = incident.status;
            if !from.can_update_to(status) {
                return Err(Error::invalid_state(
                    EntityKind::Incident,
                    incident_id,
                    from,
                    status,
                ));
            }

            let now = Utc::now();
            let mut released = None;
            if status.is_terminal() {
                if let Some(vehicle_id) = incident.assigned_vehicle.clone() {
                    if let Some(vehicle_cell) = self.vehicle_cell_opt(&vehicle_id) {
                        let mut vehicle = lock(&vehicle_cell);
                        if vehicle.assigned_incident.as_deref() == Some(incident_id) {
                            let previous = vehicle.status;
                            vehicle.status = VehicleStatus::Available;
                            vehicle.assigned_incident = None;
                            vehicle.last_updated = now;
                            self.index.set_status(&vehicle.id, VehicleStatus::Available);
                            self.persist_vehicle(&vehicle);
                            released = Some((vehicle_id, previous));
                        }
                    }
                }
            }

            incident.status = status;
            incident.updated_at = now;
            self.persist_incident(&incident);
            (incident.clone(), from, released)
        };

        info!(incident_id, from = %from, to = %status, "incident status changed");
        if let Some((vehicle_id, previous)) = &released {
            self.cache.invalidate_vehicle(vehicle_id);
            info!(incident_id, vehicle_id = %vehicle_id, "vehicle released");
            self.events.publish(DispatchEvent::VehicleStatusChanged {
                vehicle_id: vehicle_id.clone(),
                from: *previous,
                to: VehicleStatus::Available,
                incident_id: Some(incident_id.to_string()),
            });
        }
        self.events.publish(DispatchEvent::IncidentStatusChanged {
            incident_id: incident_id.to_string(),
            from,
            to: status,
            released_vehicle: released.map(|(id, _)| id),
        });
        Ok(incident)
    }

    /// Move a vehicle.
    pub fn update_vehicle_position(&self, vehicle_id: &str, position: GeoPoint) -> Result<Vehicle> {
        position.validate()?;
        let vehicle_cell = self.vehicle_cell(vehicle_id)?;
        let vehicle = {
            let mut vehicle = lock(&vehicle_cell);
            vehicle.position = position;
            vehicle.last_updated = Utc::now();
            self.index.upsert(&vehicle.id, position, vehicle.status);
            self.persist_vehicle(&vehicle);
            vehicle.clone()
        };

        self.cache.invalidate_vehicle(vehicle_id);
        debug!(vehicle_id, %position, "vehicle moved");
        self.events.publish(DispatchEvent::VehiclePositionChanged {
            vehicle_id: vehicle_id.to_string(),
            position,
        });
        Ok(vehicle)
    }

    /// Change a vehicle's operational status.
    ///
    /// DISPATCHED is reserved for [`dispatch`](Self::dispatch). A vehicle
    /// paired with an active incident may go BUSY but not AVAILABLE; it is
    /// freed when that incident is resolved or cancelled. Setting the current
    /// status again is a no-op.
    pub fn update_vehicle_status(&self, vehicle_id: &str, status: VehicleStatus) -> Result<Vehicle> {
        let vehicle_cell = self.vehicle_cell(vehicle_id)?;
        if status == VehicleStatus::Dispatched {
            let from = lock(&vehicle_cell).status;
            return Err(Error::invalid_state(
                EntityKind::Vehicle,
                vehicle_id,
                from,
                status,
            ));
        }

        let (vehicle, from) = loop {
            // Incident before vehicle; retry if the pairing moved in between.
            let assigned = lock(&vehicle_cell).assigned_incident.clone();
            let incident_cell = assigned
                .as_deref()
                .and_then(|id| self.incident_cell(id).ok());
            let incident = incident_cell.as_ref().map(|cell| lock(cell));
            let mut vehicle = lock(&vehicle_cell);
            if vehicle.assigned_incident != assigned {
                continue;
            }

            let from = vehicle.status;
            if from == status {
                return Ok(vehicle.clone());
            }
            let active = incident.as_ref().is_some_and(|i| !i.status.is_terminal());
            if status == VehicleStatus::Available {
                if active {
                    return Err(Error::invalid_state(
                        EntityKind::Vehicle,
                        vehicle_id,
                        from,
                        status,
                    ));
                }
                vehicle.assigned_incident = None;
            }

            vehicle.status = status;
            vehicle.last_updated = Utc::now();
            self.index.set_status(&vehicle.id, status);
            self.persist_vehicle(&vehicle);
            break (vehicle.clone(), from);
        };

        self.cache.invalidate_vehicle(vehicle_id);
        info!(vehicle_id, from = %from, to = %status, "vehicle status changed");
        self.events.publish(DispatchEvent::VehicleStatusChanged {
            vehicle_id: vehicle_id.to_string(),
            from,
            to: status,
            incident_id: None,
        });
        Ok(vehicle)
    }

    /// Route between two points through the routing client: cached provider
    /// answer, fresh provider answer, or the straight-line fallback.
    pub fn route(&self, origin: GeoPoint, destination: GeoPoint) -> Result<RouteResult> {
        origin.validate()?;
        destination.validate()?;
        Ok(self.routing.route(&origin, &destination))
    }

    /// Nearest vehicle to a point whose status passes `filter`.
    pub fn find_nearest_vehicle(
        &self,
        point: GeoPoint,
        filter: StatusFilter,
    ) -> Result<Option<NearestVehicle>> {
        point.validate()?;
        Ok(self.nearest_with_cache(&NearestQuery::Point(point), point, filter))
    }

    /// Nearest vehicle to a registered point of interest.
    pub fn find_nearest_vehicle_to_point_of_interest(
        &self,
        poi_id: &str,
        filter: StatusFilter,
    ) -> Result<Option<NearestVehicle>> {
        let position = self.get_point_of_interest(poi_id)?.position;
        Ok(self.nearest_with_cache(
            &NearestQuery::PointOfInterest(poi_id.to_string()),
            position,
            filter,
        ))
    }

    fn nearest_with_cache(
        &self,
        query: &NearestQuery,
        point: GeoPoint,
        filter: StatusFilter,
    ) -> Option<NearestVehicle> {
        if let Some(hit) = self.cached_nearest(query, filter) {
            return Some(hit);
        }

        // The index and the entity store are updated under the same vehicle
        // lock, but a vehicle can change between the query and the snapshot.
        for neighbour in self.index.nearest_n(point, filter, CANDIDATES_PER_ROUND) {
            let Some(vehicle) = self.vehicle_snapshot(&neighbour.vehicle_id) else {
                continue;
            };
            if !filter.matches(vehicle.status) || vehicle.position != neighbour.position {
                continue;
            }
            let key = DispatchCache::nearest_key(query, filter);
            let answer = NearestVehicle {
                vehicle,
                distance_meters: neighbour.distance_meters,
            };
            self.cache.put_nearest(
                &key,
                &answer.vehicle.id,
                &CachedNearest {
                    vehicle: answer.vehicle.clone(),
                    distance_meters: answer.distance_meters,
                },
            );
            return Some(answer);
        }
        None
    }

    /// Cached answer, if the vehicle it names is unchanged since it was cached.
    fn cached_nearest(&self, query: &NearestQuery, filter: StatusFilter) -> Option<NearestVehicle> {
        let key = DispatchCache::nearest_key(query, filter);
        let cached: CachedNearest<Vehicle> = self.cache.get(&key)?;
        let current = self.vehicle_snapshot(&cached.vehicle.id);
        match current {
            Some(vehicle)
                if filter.matches(vehicle.status)
                    && vehicle.last_updated == cached.vehicle.last_updated
                    && vehicle.position == cached.vehicle.position =>
            {
                Some(NearestVehicle {
                    vehicle,
                    distance_meters: cached.distance_meters,
                })
            }
            _ => {
                debug!(key = %key, "discarding stale nearest-vehicle entry");
                self.cache.invalidate(&key);
                None
            }
        }
    }

    pub fn get_vehicle(&self, vehicle_id: &str) -> Result<Vehicle> {
        self.vehicle_snapshot(vehicle_id)
            .ok_or_else(|| Error::not_found(EntityKind::Vehicle, vehicle_id))
    }

    pub fn get_incident(&self, incident_id: &str) -> Result<Incident> {
        let cell = self.incident_cell(incident_id)?;
        let incident = lock(&cell).clone();
        Ok(incident)
    }

    pub fn get_point_of_interest(&self, poi_id: &str) -> Result<PointOfInterest> {
        self.points_of_interest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(poi_id)
            .cloned()
            .ok_or_else(|| Error::not_found(EntityKind::PointOfInterest, poi_id))
    }

    /// All vehicles, most recently updated first.
    pub fn vehicles(&self) -> Vec<Vehicle> {
        let cells: Vec<Shared<Vehicle>> = self
            .vehicles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut vehicles: Vec<Vehicle> = cells.iter().map(|cell| lock(cell).clone()).collect();
        vehicles.sort_by(|a, b| {
            b.last_updated
                .cmp(&a.last_updated)
                .then_with(|| a.id.cmp(&b.id))
        });
        vehicles
    }

    /// All incidents, newest first.
    pub fn incidents(&self) -> Vec<Incident> {
        let cells: Vec<Shared<Incident>> = self
            .incidents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut incidents: Vec<Incident> = cells.iter().map(|cell| lock(cell).clone()).collect();
        incidents.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        incidents
    }

    /// All points of interest ordered by id.
    pub fn points_of_interest(&self) -> Vec<PointOfInterest> {
        let mut pois: Vec<PointOfInterest> = self
            .points_of_interest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        pois.sort_by(|a, b| a.id.cmp(&b.id));
        pois
    }

    /// Flush queued events and stop the event worker.
    pub fn shutdown(&self) {
        self.events.shutdown();
    }

    fn vehicle_cell_opt(&self, vehicle_id: &str) -> Option<Shared<Vehicle>> {
        self.vehicles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(vehicle_id)
            .cloned()
    }

    fn vehicle_cell(&self, vehicle_id: &str) -> Result<Shared<Vehicle>> {
        self.vehicle_cell_opt(vehicle_id)
            .ok_or_else(|| Error::not_found(EntityKind::Vehicle, vehicle_id))
    }

    fn vehicle_snapshot(&self, vehicle_id: &str) -> Option<Vehicle> {
        self.vehicle_cell_opt(vehicle_id)
            .map(|cell| lock(&cell).clone())
    }

    fn incident_cell(&self, incident_id: &str) -> Result<Shared<Incident>> {
        self.incidents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(incident_id)
            .cloned()
            .ok_or_else(|| Error::not_found(EntityKind::Incident, incident_id))
    }

    fn persist_vehicle(&self, vehicle: &Vehicle) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_vehicle(vehicle) {
                warn!(vehicle_id = %vehicle.id, error = %e, "failed to persist vehicle");
            }
        }
    }

    fn persist_incident(&self, incident: &Incident) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_incident(incident) {
                warn!(incident_id = %incident.id, error = %e, "failed to persist incident");
            }
        }
    }
}

impl std::fmt::Debug for DispatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchCoordinator")
            .field("index", &self.index)
            .field("cache", &self.cache)
            .field("routing", &self.routing)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}
