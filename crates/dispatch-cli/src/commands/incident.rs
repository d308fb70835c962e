//! `incident` command group.

use anyhow::Result;

use dispatch_lib::{IncidentStatus, NewIncident};

use crate::commands::AppContext;
use crate::output::{render_incident, render_incidents};

/// Create a PENDING incident.
pub fn handle_create(ctx: &AppContext, new: NewIncident) -> Result<()> {
    let incident = ctx.coordinator.create_incident(new)?;
    ctx.output.emit(&incident, |p| render_incident(&incident, p))
}

/// Move an incident through its lifecycle. Resolving or cancelling releases
/// the assigned vehicle.
pub fn handle_status(ctx: &AppContext, id: &str, status: IncidentStatus) -> Result<()> {
    let incident = ctx.coordinator.update_incident_status(id, status)?;
    ctx.output.emit(&incident, |p| render_incident(&incident, p))
}

pub fn handle_show(ctx: &AppContext, id: &str) -> Result<()> {
    let incident = ctx.coordinator.get_incident(id)?;
    ctx.output.emit(&incident, |p| render_incident(&incident, p))
}

pub fn handle_list(ctx: &AppContext, status: Option<IncidentStatus>) -> Result<()> {
    let incidents: Vec<_> = ctx
        .coordinator
        .incidents()
        .into_iter()
        .filter(|i| status.map_or(true, |s| i.status == s))
        .collect();
    ctx.output
        .emit(&incidents, |p| render_incidents(&incidents, p))
}
