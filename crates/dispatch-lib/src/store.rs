//! Durable storage for vehicles, incidents and points of interest.
//!
//! The coordinator loads everything at startup and writes each record back
//! after a committed mutation. During the process lifetime the in-memory
//! state is authoritative; the store is a durability sink.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::{Error, Result};
use crate::geo::GeoPoint;
use crate::model::{Incident, PointOfInterest, Vehicle};

/// Persistence collaborator of the coordinator.
pub trait DispatchStore: Send + Sync {
    fn load_vehicles(&self) -> Result<Vec<Vehicle>>;
    fn load_incidents(&self) -> Result<Vec<Incident>>;
    fn load_points_of_interest(&self) -> Result<Vec<PointOfInterest>>;
    fn save_vehicle(&self, vehicle: &Vehicle) -> Result<()>;
    fn save_incident(&self, incident: &Incident) -> Result<()>;
    fn save_point_of_interest(&self, poi: &PointOfInterest) -> Result<()>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS vehicles (
    id TEXT PRIMARY KEY NOT NULL,
    status TEXT NOT NULL,
    longitude REAL NOT NULL,
    latitude REAL NOT NULL,
    last_updated TEXT NOT NULL,
    assigned_incident TEXT
);
CREATE TABLE IF NOT EXISTS incidents (
    id TEXT PRIMARY KEY NOT NULL,
    address TEXT NOT NULL,
    longitude REAL NOT NULL,
    latitude REAL NOT NULL,
    priority TEXT NOT NULL,
    note TEXT,
    status TEXT NOT NULL,
    assigned_vehicle TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS points_of_interest (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    longitude REAL NOT NULL,
    latitude REAL NOT NULL,
    created_at TEXT NOT NULL
);
";

/// SQLite-backed [`DispatchStore`].
#[derive(Debug)]
pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) a database file and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let connection = Connection::open(path)?;
        debug!(path = %path.display(), "opened dispatch database");
        Self::with_connection(connection)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> Result<Self> {
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

struct VehicleRow {
    id: String,
    status: String,
    longitude: f64,
    latitude: f64,
    last_updated: String,
    assigned_incident: Option<String>,
}

impl VehicleRow {
    fn decode(self) -> Result<Vehicle> {
        let status = self
            .status
            .parse()
            .map_err(|e| corrupt("vehicles", &self.id, e))?;
        let last_updated = parse_timestamp("vehicles", &self.id, &self.last_updated)?;
        Ok(Vehicle {
            position: decode_point("vehicles", &self.id, self.longitude, self.latitude)?,
            id: self.id,
            status,
            last_updated,
            assigned_incident: self.assigned_incident,
        })
    }
}

struct IncidentRow {
    id: String,
    address: String,
    longitude: f64,
    latitude: f64,
    priority: String,
    note: Option<String>,
    status: String,
    assigned_vehicle: Option<String>,
    created_at: String,
    updated_at: String,
}

impl IncidentRow {
    fn decode(self) -> Result<Incident> {
        let priority = self
            .priority
            .parse()
            .map_err(|e| corrupt("incidents", &self.id, e))?;
        let status = self
            .status
            .parse()
            .map_err(|e| corrupt("incidents", &self.id, e))?;
        let created_at = parse_timestamp("incidents", &self.id, &self.created_at)?;
        let updated_at = parse_timestamp("incidents", &self.id, &self.updated_at)?;
        Ok(Incident {
            position: decode_point("incidents", &self.id, self.longitude, self.latitude)?,
            id: self.id,
            address: self.address,
            priority,
            note: self.note,
            status,
            assigned_vehicle: self.assigned_vehicle,
            created_at,
            updated_at,
        })
    }
}

fn corrupt(table: &'static str, id: &str, message: impl ToString) -> Error {
    Error::CorruptRecord {
        table,
        id: id.to_string(),
        message: message.to_string(),
    }
}

fn parse_timestamp(table: &'static str, id: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| corrupt(table, id, format!("timestamp '{}': {}", value, e)))
}

fn decode_point(table: &'static str, id: &str, longitude: f64, latitude: f64) -> Result<GeoPoint> {
    GeoPoint::new(longitude, latitude).map_err(|e| corrupt(table, id, e))
}

impl DispatchStore for SqliteStore {
    fn load_vehicles(&self) -> Result<Vec<Vehicle>> {
        let connection = self.connection();
        let mut stmt = connection.prepare(
            "SELECT id, status, longitude, latitude, last_updated, assigned_incident
             FROM vehicles ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(VehicleRow {
                id: row.get(0)?,
                status: row.get(1)?,
                longitude: row.get(2)?,
                latitude: row.get(3)?,
                last_updated: row.get(4)?,
                assigned_incident: row.get(5)?,
            })
        })?;

        let mut vehicles = Vec::new();
        for row in rows {
            vehicles.push(row?.decode()?);
        }
        Ok(vehicles)
    }

    fn load_incidents(&self) -> Result<Vec<Incident>> {
        let connection = self.connection();
        let mut stmt = connection.prepare(
            "SELECT id, address, longitude, latitude, priority, note, status,
                    assigned_vehicle, created_at, updated_at
             FROM incidents ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(IncidentRow {
                id: row.get(0)?,
                address: row.get(1)?,
                longitude: row.get(2)?,
                latitude: row.get(3)?,
                priority: row.get(4)?,
                note: row.get(5)?,
                status: row.get(6)?,
                assigned_vehicle: row.get(7)?,
                created_at: row.get(8)?,
                updated_at: row.get(9)?,
            })
        })?;

        let mut incidents = Vec::new();
        for row in rows {
            incidents.push(row?.decode()?);
        }
        Ok(incidents)
    }

    fn load_points_of_interest(&self) -> Result<Vec<PointOfInterest>> {
        let connection = self.connection();
        let mut stmt = connection.prepare(
            "SELECT id, name, longitude, latitude, created_at
             FROM points_of_interest ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut pois = Vec::new();
        for row in rows {
            let (id, name, longitude, latitude, created_at) = row?;
            pois.push(PointOfInterest {
                position: decode_point("points_of_interest", &id, longitude, latitude)?,
                created_at: parse_timestamp("points_of_interest", &id, &created_at)?,
                id,
                name,
            });
        }
        Ok(pois)
    }

    fn save_vehicle(&self, vehicle: &Vehicle) -> Result<()> {
        self.connection().execute(
            "INSERT INTO vehicles (id, status, longitude, latitude, last_updated, assigned_incident)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                longitude = excluded.longitude,
                latitude = excluded.latitude,
                last_updated = excluded.last_updated,
                assigned_incident = excluded.assigned_incident",
            params![
                vehicle.id,
                vehicle.status.as_str(),
                vehicle.position.longitude,
                vehicle.position.latitude,
                vehicle.last_updated.to_rfc3339(),
                vehicle.assigned_incident,
            ],
        )?;
        Ok(())
    }

    fn save_incident(&self, incident: &Incident) -> Result<()> {
        self.connection().execute(
            "INSERT INTO incidents (id, address, longitude, latitude, priority, note, status,
                                    assigned_vehicle, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                address = excluded.address,
                longitude = excluded.longitude,
                latitude = excluded.latitude,
                priority = excluded.priority,
                note = excluded.note,
                status = excluded.status,
                assigned_vehicle = excluded.assigned_vehicle,
                updated_at = excluded.updated_at",
            params![
                incident.id,
                incident.address,
                incident.position.longitude,
                incident.position.latitude,
                incident.priority.as_str(),
                incident.note,
                incident.status.as_str(),
                incident.assigned_vehicle,
                incident.created_at.to_rfc3339(),
                incident.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn save_point_of_interest(&self, poi: &PointOfInterest) -> Result<()> {
        self.connection().execute(
            "INSERT INTO points_of_interest (id, name, longitude, latitude, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                longitude = excluded.longitude,
                latitude = excluded.latitude",
            params![
                poi.id,
                poi.name,
                poi.position.longitude,
                poi.position.latitude,
                poi.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IncidentPriority, IncidentStatus, VehicleStatus};

    fn vehicle(id: &str) -> Vehicle {
        Vehicle {
            id: id.to_string(),
            status: VehicleStatus::Available,
            position: GeoPoint::new(3.35, 6.60).unwrap(),
            last_updated: Utc::now(),
            assigned_incident: None,
        }
    }

    #[test]
    fn vehicle_upsert_overwrites() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut v = vehicle("amb-1");
        store.save_vehicle(&v).unwrap();

        v.status = VehicleStatus::Dispatched;
        v.assigned_incident = Some("i-1".into());
        store.save_vehicle(&v).unwrap();

        let loaded = store.load_vehicles().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, VehicleStatus::Dispatched);
        assert_eq!(loaded[0].assigned_incident.as_deref(), Some("i-1"));
        assert_eq!(loaded[0].last_updated, v.last_updated);
    }

    #[test]
    fn incident_fields_survive_storage() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        let incident = Incident {
            id: "i-1".into(),
            address: "12 Marina Rd".into(),
            position: GeoPoint::new(3.345, 6.597).unwrap(),
            priority: IncidentPriority::Critical,
            note: Some("two casualties".into()),
            status: IncidentStatus::InProgress,
            assigned_vehicle: Some("amb-1".into()),
            created_at: now,
            updated_at: now,
        };
        store.save_incident(&incident).unwrap();
        assert_eq!(store.load_incidents().unwrap(), vec![incident]);
    }

    #[test]
    fn corrupt_rows_are_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .connection()
            .execute(
                "INSERT INTO vehicles VALUES ('amb-9', 'parked', 0.0, 0.0, '2024-01-01T00:00:00Z', NULL)",
                [],
            )
            .unwrap();
        let err = store.load_vehicles().unwrap_err();
        assert!(matches!(err, Error::CorruptRecord { table: "vehicles", .. }));
    }
}
