//! `poi` command group.

use anyhow::Result;

use crate::commands::AppContext;
use crate::output::render_points_of_interest;

pub fn handle_list(ctx: &AppContext) -> Result<()> {
    let pois = ctx.coordinator.points_of_interest();
    ctx.output
        .emit(&pois, |p| render_points_of_interest(&pois, p))
}
