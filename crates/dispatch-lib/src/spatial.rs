//! Mutable KD-tree spatial index for nearest-vehicle queries.
//!
//! # Overview
//!
//! The `SpatialIndex` answers "which vehicle matching this status filter is
//! closest to a point" in O(log n) average time. Vehicles are stored in a
//! KD-tree (k=3) keyed by their position projected onto the unit sphere:
//!
//! - Squared chord length between unit vectors is a monotonic function of
//!   great-circle distance, so the tree ordering equals haversine ordering.
//! - Reported distances are always recomputed with haversine in meters.
//!
//! # Filtering
//!
//! Status filtering happens after the tree lookup. The query over-fetches and
//! doubles the fetch window until enough candidates match or the whole index
//! has been scanned. Equal distances are broken by the lowest vehicle id,
//! which needs every point on the boundary radius, so the final candidate set
//! is collected with a radius query rather than a fixed `k`.
//!
//! # Concurrency
//!
//! All state sits behind one `RwLock`: lookups share the read lock, position
//! and status updates take the write lock, so a reader never observes an
//! entry whose tree slot and metadata disagree.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use kiddo::float::kdtree::KdTree;
use kiddo::SquaredEuclidean;
use once_cell::sync::Lazy;
use tracing::{debug, info};

use crate::geo::GeoPoint;
use crate::model::{StatusFilter, Vehicle, VehicleId, VehicleStatus};

/// KD-tree bucket size (kiddo default).
const BUCKET_SIZE: usize = 32;

/// Slack added to the boundary radius so points at exactly the same distance
/// survive floating point noise from the frame rotation.
const TIE_EPSILON: f64 = 1e-12;

type Tree = KdTree<f64, usize, 3, BUCKET_SIZE, u32>;

/// Fixed rotation applied before indexing.
///
/// kiddo cannot split a bucket whose points all share one value on the split
/// axis. Vehicles on a common parallel share `z` exactly in the unrotated
/// frame; an arbitrary rotation removes those coincidences while preserving
/// every pairwise distance.
static FRAME: Lazy<[[f64; 3]; 3]> = Lazy::new(|| {
    let (a, b, c) = (0.517_f64, 0.729_f64, 1.113_f64);
    let rx = [[1.0, 0.0, 0.0], [0.0, a.cos(), -a.sin()], [0.0, a.sin(), a.cos()]];
    let ry = [[b.cos(), 0.0, b.sin()], [0.0, 1.0, 0.0], [-b.sin(), 0.0, b.cos()]];
    let rz = [[c.cos(), -c.sin(), 0.0], [c.sin(), c.cos(), 0.0], [0.0, 0.0, 1.0]];
    mat_mul(&rz, &mat_mul(&ry, &rx))
});

fn mat_mul(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn tree_coords(position: &GeoPoint) -> [f64; 3] {
    let v = position.to_unit_vector();
    let m = &*FRAME;
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn coords_key(coords: &[f64; 3]) -> [u64; 3] {
    [coords[0].to_bits(), coords[1].to_bits(), coords[2].to_bits()]
}

/// Indexed snapshot of a vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub vehicle_id: VehicleId,
    pub position: GeoPoint,
    pub status: VehicleStatus,
    group: usize,
}

/// A query hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbour {
    pub vehicle_id: VehicleId,
    pub position: GeoPoint,
    pub status: VehicleStatus,
    /// Great-circle distance from the query point in meters.
    pub distance_meters: f64,
}

/// Vehicles sharing one exact position. The tree holds one point per group,
/// so any number of co-located vehicles fit in a bucket.
#[derive(Debug, Clone)]
struct Group {
    coords: [f64; 3],
    members: Vec<usize>,
}

struct IndexState {
    /// Tree items are indexes into `groups`.
    tree: Tree,
    groups: Vec<Group>,
    group_by_coords: HashMap<[u64; 3], usize>,
    free_groups: Vec<usize>,
    slots: Vec<IndexEntry>,
    id_to_slot: HashMap<VehicleId, usize>,
}

/// Concurrent nearest-neighbour index over vehicle positions.
pub struct SpatialIndex {
    state: RwLock<IndexState>,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(IndexState::new()),
        }
    }

    /// Build an index from a set of vehicles.
    pub fn build<'a>(vehicles: impl IntoIterator<Item = &'a Vehicle>) -> Self {
        let index = Self::new();
        {
            let mut state = index.write();
            for vehicle in vehicles {
                state.upsert(&vehicle.id, vehicle.position, vehicle.status);
            }
            info!(
                node_count = state.slots.len(),
                distinct_positions = state.group_by_coords.len(),
                "built spatial index"
            );
        }
        index
    }

    /// Number of indexed vehicles.
    pub fn len(&self) -> usize {
        self.read().slots.len()
    }

    /// Returns true if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.read().slots.is_empty()
    }

    /// Current indexed snapshot of a vehicle.
    pub fn entry(&self, vehicle_id: &str) -> Option<IndexEntry> {
        let state = self.read();
        state
            .id_to_slot
            .get(vehicle_id)
            .map(|&slot| state.slots[slot].clone())
    }

    /// Insert a vehicle or move it to a new position/status.
    pub fn upsert(&self, vehicle_id: &str, position: GeoPoint, status: VehicleStatus) {
        self.write().upsert(vehicle_id, position, status);
    }

    /// Update only the status of an indexed vehicle.
    ///
    /// Returns false when the vehicle is not indexed.
    pub fn set_status(&self, vehicle_id: &str, status: VehicleStatus) -> bool {
        let mut state = self.write();
        let Some(&slot) = state.id_to_slot.get(vehicle_id) else {
            return false;
        };
        state.slots[slot].status = status;
        true
    }

    /// Nearest vehicle whose status passes `filter`.
    ///
    /// Returns `None` when the index is empty or nothing matches.
    pub fn nearest(&self, point: GeoPoint, filter: StatusFilter) -> Option<Neighbour> {
        self.nearest_n(point, filter, 1).into_iter().next()
    }

    /// Up to `k` nearest vehicles whose status passes `filter`.
    ///
    /// Results are sorted by distance, then by vehicle id.
    pub fn nearest_n(&self, point: GeoPoint, filter: StatusFilter, k: usize) -> Vec<Neighbour> {
        let state = self.read();
        let total = state.group_by_coords.len();
        if k == 0 || total == 0 {
            return Vec::new();
        }

        let query = tree_coords(&point);

        // Over-fetch to account for filtering, widening until k matches are seen.
        let mut fetch = k.saturating_mul(2).max(k + 10).min(total);
        let boundary = loop {
            let candidates = state.tree.nearest_n::<SquaredEuclidean>(&query, fetch);
            let mut matched = 0usize;
            let mut boundary = None;
            for neighbour in &candidates {
                let hits = state.groups[neighbour.item]
                    .members
                    .iter()
                    .filter(|&&slot| filter.matches(state.slots[slot].status))
                    .count();
                if hits > 0 {
                    matched += hits;
                    boundary = Some(neighbour.distance);
                }
                if matched >= k {
                    break;
                }
            }

            if matched >= k || fetch >= total {
                break boundary;
            }
            fetch = fetch.saturating_mul(2).min(total);
        };

        let Some(boundary) = boundary else {
            debug!(filter = %filter.cache_tag(), "no vehicle matched filter");
            return Vec::new();
        };

        let mut results: Vec<Neighbour> = state
            .tree
            .within::<SquaredEuclidean>(&query, boundary + TIE_EPSILON)
            .into_iter()
            .flat_map(|n| state.groups[n.item].members.iter())
            .map(|&slot| &state.slots[slot])
            .filter(|entry| filter.matches(entry.status))
            .map(|entry| Neighbour {
                vehicle_id: entry.vehicle_id.clone(),
                position: entry.position,
                status: entry.status,
                distance_meters: point.distance_to(&entry.position),
            })
            .collect();

        results.sort_by(|a, b| {
            a.distance_meters
                .partial_cmp(&b.distance_meters)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.vehicle_id.cmp(&b.vehicle_id))
        });
        results.truncate(k);
        results
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IndexState {
    fn new() -> Self {
        Self {
            tree: KdTree::new(),
            groups: Vec::new(),
            group_by_coords: HashMap::new(),
            free_groups: Vec::new(),
            slots: Vec::new(),
            id_to_slot: HashMap::new(),
        }
    }

    fn upsert(&mut self, vehicle_id: &str, position: GeoPoint, status: VehicleStatus) {
        let coords = tree_coords(&position);

        if let Some(&slot) = self.id_to_slot.get(vehicle_id) {
            if self.groups[self.slots[slot].group].coords != coords {
                self.detach(slot);
                let group = self.attach(coords, slot);
                self.slots[slot].group = group;
            }
            let entry = &mut self.slots[slot];
            entry.position = position;
            entry.status = status;
            return;
        }

        let slot = self.slots.len();
        let group = self.attach(coords, slot);
        self.slots.push(IndexEntry {
            vehicle_id: vehicle_id.to_string(),
            position,
            status,
            group,
        });
        self.id_to_slot.insert(vehicle_id.to_string(), slot);
    }

    fn attach(&mut self, coords: [f64; 3], slot: usize) -> usize {
        let key = coords_key(&coords);
        if let Some(&group) = self.group_by_coords.get(&key) {
            self.groups[group].members.push(slot);
            return group;
        }

        let fresh = Group {
            coords,
            members: vec![slot],
        };
        let group = match self.free_groups.pop() {
            Some(reused) => {
                self.groups[reused] = fresh;
                reused
            }
            None => {
                self.groups.push(fresh);
                self.groups.len() - 1
            }
        };
        self.tree.add(&coords, group);
        self.group_by_coords.insert(key, group);
        group
    }

    fn detach(&mut self, slot: usize) {
        let group = self.slots[slot].group;
        let members = &mut self.groups[group].members;
        members.retain(|&member| member != slot);
        if members.is_empty() {
            let coords = self.groups[group].coords;
            self.tree.remove(&coords, group);
            self.group_by_coords.remove(&coords_key(&coords));
            self.free_groups.push(group);
        }
    }
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("SpatialIndex")
            .field("node_count", &state.slots.len())
            .field(
                "available",
                &state
                    .slots
                    .iter()
                    .filter(|e| e.status == VehicleStatus::Available)
                    .count(),
            )
            .finish()
    }
}
