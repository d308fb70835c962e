//! `dispatch` and `nearest` commands.

use anyhow::Result;

use dispatch_lib::{GeoPoint, StatusFilter};

use crate::commands::AppContext;
use crate::output::{render_dispatch, render_nearest};

/// Where a nearest-vehicle lookup is anchored.
#[derive(Debug, Clone)]
pub enum NearestTarget {
    Point(GeoPoint),
    PointOfInterest(String),
}

/// Assign the nearest available vehicle to an incident.
pub fn handle_dispatch(ctx: &AppContext, incident_id: &str) -> Result<()> {
    let result = ctx.coordinator.dispatch(incident_id)?;
    ctx.output.emit(&result, |p| render_dispatch(&result, p))
}

/// Report the nearest vehicle passing `filter` without claiming it.
pub fn handle_nearest(ctx: &AppContext, target: &NearestTarget, filter: StatusFilter) -> Result<()> {
    let nearest = match target {
        NearestTarget::Point(point) => ctx.coordinator.find_nearest_vehicle(*point, filter)?,
        NearestTarget::PointOfInterest(id) => ctx
            .coordinator
            .find_nearest_vehicle_to_point_of_interest(id, filter)?,
    };
    ctx.output
        .emit(&nearest, |p| render_nearest(nearest.as_ref(), p))
}
