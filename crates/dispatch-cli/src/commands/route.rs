//! `route` command.

use anyhow::Result;

use dispatch_lib::GeoPoint;

use crate::commands::AppContext;
use crate::output::render_route;

/// Distance and travel time between two points.
pub fn handle_route(ctx: &AppContext, origin: GeoPoint, destination: GeoPoint) -> Result<()> {
    let route = ctx.coordinator.route(origin, destination)?;
    ctx.output.emit(&route, |p| render_route(&route, p))
}
