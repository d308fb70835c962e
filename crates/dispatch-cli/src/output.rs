//! Rendering of command results as text or JSON.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use dispatch_lib::{
    DispatchResult, Incident, NearestVehicle, PointOfInterest, RouteResult, RouteSource, Vehicle,
};

use crate::terminal::{format_distance, format_duration, ColorPalette};

/// Output format selected with `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Writes command results to stdout in the selected format.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    format: OutputFormat,
    palette: ColorPalette,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        let palette = match format {
            OutputFormat::Text => ColorPalette::detect(),
            OutputFormat::Json => ColorPalette::plain(),
        };
        Self { format, palette }
    }

    /// Print `value` as pretty JSON, or the text produced by `text`.
    pub fn emit<T, F>(&self, value: &T, text: F) -> Result<()>
    where
        T: Serialize + ?Sized,
        F: FnOnce(&ColorPalette) -> String,
    {
        match self.format {
            OutputFormat::Json => {
                let json =
                    serde_json::to_string_pretty(value).context("failed to encode output")?;
                println!("{json}");
            }
            OutputFormat::Text => {
                let rendered = text(&self.palette);
                print!("{rendered}");
                if !rendered.ends_with('\n') {
                    println!();
                }
            }
        }
        Ok(())
    }
}

pub fn render_vehicle(vehicle: &Vehicle, p: &ColorPalette) -> String {
    let mut line = format!(
        "{bold}{id:<10}{reset} {color}{status:<10}{reset} {pos}",
        bold = p.bold,
        id = vehicle.id,
        reset = p.reset,
        color = p.vehicle_status(vehicle.status),
        status = vehicle.status.as_str(),
        pos = vehicle.position,
    );
    if let Some(incident) = &vehicle.assigned_incident {
        let _ = write!(line, "  {}-> {}{}", p.gray, incident, p.reset);
    }
    line
}

pub fn render_vehicles(vehicles: &[Vehicle], p: &ColorPalette) -> String {
    if vehicles.is_empty() {
        return "No vehicles.".to_string();
    }
    let mut out = String::new();
    for vehicle in vehicles {
        let _ = writeln!(out, "{}", render_vehicle(vehicle, p));
    }
    out
}

pub fn render_incident_line(incident: &Incident, p: &ColorPalette) -> String {
    format!(
        "{id}  {color}{status:<11}{reset} {prio}{priority:<8}{reset} {address}",
        id = incident.id,
        color = p.incident_status(incident.status),
        status = incident.status.as_str(),
        reset = p.reset,
        prio = p.priority(incident.priority),
        priority = incident.priority.as_str(),
        address = incident.address,
    )
}

pub fn render_incidents(incidents: &[Incident], p: &ColorPalette) -> String {
    if incidents.is_empty() {
        return "No incidents.".to_string();
    }
    let mut out = String::new();
    for incident in incidents {
        let _ = writeln!(out, "{}", render_incident_line(incident, p));
    }
    out
}

pub fn render_incident(incident: &Incident, p: &ColorPalette) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}Incident {}{}", p.bold, incident.id, p.reset);
    let _ = writeln!(out, "  address:  {}", incident.address);
    let _ = writeln!(out, "  position: {}", incident.position);
    let _ = writeln!(
        out,
        "  priority: {}{}{}",
        p.priority(incident.priority),
        incident.priority,
        p.reset
    );
    let _ = writeln!(
        out,
        "  status:   {}{}{}",
        p.incident_status(incident.status),
        incident.status,
        p.reset
    );
    if let Some(vehicle) = &incident.assigned_vehicle {
        let _ = writeln!(out, "  vehicle:  {}", vehicle);
    }
    if let Some(note) = &incident.note {
        let _ = writeln!(out, "  note:     {}", note);
    }
    let _ = writeln!(out, "  created:  {}", incident.created_at.to_rfc3339());
    let _ = writeln!(out, "  updated:  {}", incident.updated_at.to_rfc3339());
    out
}

pub fn render_points_of_interest(pois: &[PointOfInterest], p: &ColorPalette) -> String {
    if pois.is_empty() {
        return "No points of interest.".to_string();
    }
    let mut out = String::new();
    for poi in pois {
        let _ = writeln!(
            out,
            "{}{:<6}{} {} {}{}{}",
            p.bold, poi.id, p.reset, poi.name, p.gray, poi.position, p.reset
        );
    }
    out
}

pub fn render_nearest(nearest: Option<&NearestVehicle>, p: &ColorPalette) -> String {
    match nearest {
        Some(hit) => format!(
            "{}  ({} away)",
            render_vehicle(&hit.vehicle, p),
            format_distance(hit.distance_meters)
        ),
        None => "No matching vehicle.".to_string(),
    }
}

pub fn render_dispatch(result: &DispatchResult, p: &ColorPalette) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}Dispatched{} {} to incident {}",
        p.green, p.reset, result.vehicle.id, result.incident.id
    );
    let _ = writeln!(out, "  address:  {}", result.incident.address);
    let _ = writeln!(out, "  distance: {}", format_distance(result.distance_meters));
    let _ = writeln!(out, "  eta:      {}", format_duration(result.eta_seconds));
    let _ = writeln!(
        out,
        "  route:    {}{}{}",
        p.gray,
        source_label(result.route.source),
        p.reset
    );
    out
}

pub fn render_route(route: &RouteResult, p: &ColorPalette) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "distance: {}", format_distance(route.distance_meters));
    let _ = writeln!(out, "duration: {}", format_duration(route.duration_seconds));
    let _ = writeln!(
        out,
        "source:   {}{}{} ({} points)",
        p.gray,
        source_label(route.source),
        p.reset,
        route.polyline.len()
    );
    out
}

fn source_label(source: RouteSource) -> &'static str {
    match source {
        RouteSource::Provider => "road network",
        RouteSource::Fallback => "straight-line estimate",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_lib::{GeoPoint, VehicleStatus};

    fn vehicle() -> Vehicle {
        Vehicle {
            id: "amb-01".into(),
            status: VehicleStatus::Available,
            position: GeoPoint::new(3.3475, 6.603).unwrap(),
            last_updated: "2024-05-01T10:00:00Z".parse().unwrap(),
            assigned_incident: None,
        }
    }

    #[test]
    fn plain_vehicle_line() {
        let line = render_vehicle(&vehicle(), &ColorPalette::plain());
        assert_eq!(line, "amb-01     available  (3.3475, 6.603)");
    }

    #[test]
    fn nearest_includes_distance() {
        let hit = NearestVehicle {
            vehicle: vehicle(),
            distance_meters: 1_250.0,
        };
        let text = render_nearest(Some(&hit), &ColorPalette::plain());
        assert!(text.ends_with("(1.25 km away)"));
        assert_eq!(
            render_nearest(None, &ColorPalette::plain()),
            "No matching vehicle."
        );
    }

    #[test]
    fn fallback_route_is_labelled() {
        let a = GeoPoint::new(3.35, 6.60).unwrap();
        let b = GeoPoint::new(3.345, 6.597).unwrap();
        let route = RouteResult::straight_line(&a, &b, 15.0);
        let text = render_route(&route, &ColorPalette::plain());
        assert!(text.contains("straight-line estimate (2 points)"));
    }

    #[test]
    fn empty_lists() {
        let p = ColorPalette::plain();
        assert_eq!(render_vehicles(&[], &p), "No vehicles.");
        assert_eq!(render_incidents(&[], &p), "No incidents.");
    }
}
