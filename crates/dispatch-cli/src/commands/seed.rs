//! `init` and `seed` commands.
//!
//! The seed set is a small Lagos fleet: ten hospitals, eight ambulances
//! alternating between AVAILABLE and BUSY, and three pending incidents around
//! Ikeja. Each table is only seeded while it is empty, so `seed` can be run
//! repeatedly.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use dispatch_lib::{DispatchCoordinator, GeoPoint, IncidentPriority, NewIncident, VehicleStatus};

use crate::commands::AppContext;

/// (id, name, longitude, latitude)
const HOSPITALS: [(&str, &str, f64, f64); 10] = [
    ("h-01", "Lagos University Teaching Hospital (LUTH)", 3.3516, 6.4944),
    ("h-02", "Lagos State University Teaching Hospital (LASUTH), Ikeja", 3.3422, 6.5895),
    ("h-03", "Reddington Hospital", 3.3578709, 6.586960347),
    ("h-04", "Eko Hospital", 3.341, 6.585),
    ("h-05", "St. Nicholas Hospital", 3.37, 6.56),
    ("h-06", "Duchess International Hospital", 3.352313, 6.585562),
    ("h-07", "Ikeja Medical Centre", 3.352, 6.597),
    ("h-08", "George's Memorial Medical Centre", 3.46, 6.45),
    ("h-09", "Gbagada General Hospital", 3.3868, 6.5523),
    ("h-10", "Ikeja Central Hospital", 3.35, 6.6),
];

/// (longitude, latitude); ids are `amb-01`.. in order.
const AMBULANCES: [(f64, f64); 8] = [
    (3.3475, 6.6030),
    (3.3552, 6.5987),
    (3.3418, 6.6075),
    (3.3612, 6.5938),
    (3.3526, 6.6059),
    (3.3391, 6.5998),
    (3.3589, 6.5884),
    (3.3655, 6.5799),
];

/// (address, longitude, latitude, priority, note)
const INCIDENTS: [(&str, f64, f64, IncidentPriority, &str); 3] = [
    (
        "Computer Village, Ikeja, Lagos",
        3.3453,
        6.5966,
        IncidentPriority::High,
        "Multiple vehicle collision reported near Computer Village.",
    ),
    (
        "Allen Avenue, Ikeja, Lagos",
        3.3495,
        6.6038,
        IncidentPriority::Medium,
        "Pedestrian hit-and-run reported along Allen Avenue.",
    ),
    (
        "Ikeja City Mall, Alausa, Lagos",
        3.3615,
        6.6175,
        IncidentPriority::Critical,
        "Crowd incident reported inside Ikeja City Mall.",
    ),
];

/// Records inserted by one `seed` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub points_of_interest: usize,
    pub vehicles: usize,
    pub incidents: usize,
}

/// Insert the seed set into every empty table.
pub fn seed(coordinator: &DispatchCoordinator) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    if coordinator.points_of_interest().is_empty() {
        for (id, name, lon, lat) in HOSPITALS {
            coordinator
                .register_point_of_interest(id, name, GeoPoint::new(lon, lat)?)
                .with_context(|| format!("failed to seed hospital {id}"))?;
            summary.points_of_interest += 1;
        }
    }

    if coordinator.vehicles().is_empty() {
        for (i, (lon, lat)) in AMBULANCES.into_iter().enumerate() {
            let id = format!("amb-{:02}", i + 1);
            let status = if i % 2 == 0 {
                VehicleStatus::Available
            } else {
                VehicleStatus::Busy
            };
            coordinator
                .register_vehicle(&id, GeoPoint::new(lon, lat)?, status)
                .with_context(|| format!("failed to seed vehicle {id}"))?;
            summary.vehicles += 1;
        }
    }

    if coordinator.incidents().is_empty() {
        for (address, lon, lat, priority, note) in INCIDENTS {
            let new = NewIncident::new(address, GeoPoint::new(lon, lat)?)
                .with_priority(priority)
                .with_note(note);
            coordinator
                .create_incident(new)
                .with_context(|| format!("failed to seed incident at {address}"))?;
            summary.incidents += 1;
        }
    }

    info!(
        points_of_interest = summary.points_of_interest,
        vehicles = summary.vehicles,
        incidents = summary.incidents,
        "seeded dispatch data"
    );
    Ok(summary)
}

pub fn handle_seed(ctx: &AppContext) -> Result<()> {
    let summary = seed(&ctx.coordinator)?;
    ctx.output.emit(&summary, |_| {
        format!(
            "Seeded {} points of interest, {} vehicles, {} incidents",
            summary.points_of_interest, summary.vehicles, summary.incidents
        )
    })
}

/// Create the database and schema. Opening the coordinator already did the
/// work; this only reports where it lives.
pub fn handle_init(ctx: &AppContext, db_path: &Path) -> Result<()> {
    #[derive(Serialize)]
    struct InitReport<'a> {
        database: &'a Path,
    }
    ctx.output.emit(&InitReport { database: db_path }, |_| {
        format!("Database ready at {}", db_path.display())
    })
}
