//! `vehicle` command group.

use anyhow::Result;

use dispatch_lib::{GeoPoint, VehicleStatus};

use crate::commands::AppContext;
use crate::output::{render_vehicle, render_vehicles};

/// Register a new vehicle.
pub fn handle_add(
    ctx: &AppContext,
    id: &str,
    position: GeoPoint,
    status: VehicleStatus,
) -> Result<()> {
    let vehicle = ctx.coordinator.register_vehicle(id, position, status)?;
    ctx.output
        .emit(&vehicle, |p| format!("Added {}", render_vehicle(&vehicle, p)))
}

/// Report a new vehicle position.
pub fn handle_move(ctx: &AppContext, id: &str, position: GeoPoint) -> Result<()> {
    let vehicle = ctx.coordinator.update_vehicle_position(id, position)?;
    ctx.output.emit(&vehicle, |p| render_vehicle(&vehicle, p))
}

/// Set a vehicle status. DISPATCHED is only reachable through `dispatch`.
pub fn handle_status(ctx: &AppContext, id: &str, status: VehicleStatus) -> Result<()> {
    let vehicle = ctx.coordinator.update_vehicle_status(id, status)?;
    ctx.output.emit(&vehicle, |p| render_vehicle(&vehicle, p))
}

pub fn handle_list(ctx: &AppContext, status: Option<VehicleStatus>) -> Result<()> {
    let vehicles: Vec<_> = ctx
        .coordinator
        .vehicles()
        .into_iter()
        .filter(|v| status.map_or(true, |s| v.status == s))
        .collect();
    ctx.output.emit(&vehicles, |p| render_vehicles(&vehicles, p))
}
