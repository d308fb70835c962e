//! Vehicles, incidents, points of interest and their status enums.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo::GeoPoint;

/// Opaque vehicle identifier.
pub type VehicleId = String;

/// Opaque incident identifier.
pub type IncidentId = String;

/// Identifier of a point of interest (for example a hospital).
pub type PoiId = String;

/// Operational status of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Available,
    Busy,
    Dispatched,
}

impl VehicleStatus {
    pub const ALL: [VehicleStatus; 3] = [
        VehicleStatus::Available,
        VehicleStatus::Busy,
        VehicleStatus::Dispatched,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VehicleStatus::Available => "available",
            VehicleStatus::Busy => "busy",
            VehicleStatus::Dispatched => "dispatched",
        }
    }

    fn bit(self) -> u8 {
        match self {
            VehicleStatus::Available => 0b001,
            VehicleStatus::Busy => 0b010,
            VehicleStatus::Dispatched => 0b100,
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(VehicleStatus::Available),
            "busy" => Ok(VehicleStatus::Busy),
            "dispatched" => Ok(VehicleStatus::Dispatched),
            other => Err(Error::validation(
                "vehicle status",
                format!("'{}' is not one of available, busy, dispatched", other),
            )),
        }
    }
}

/// Lifecycle status of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Pending,
    Dispatched,
    InProgress,
    Resolved,
    Cancelled,
}

impl IncidentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IncidentStatus::Pending => "pending",
            IncidentStatus::Dispatched => "dispatched",
            IncidentStatus::InProgress => "in_progress",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, IncidentStatus::Resolved | IncidentStatus::Cancelled)
    }

    /// Transitions accepted by an explicit status update.
    ///
    /// `Pending -> Dispatched` is absent; only dispatch takes that edge.
    pub fn can_update_to(self, next: IncidentStatus) -> bool {
        use IncidentStatus::*;
        matches!(
            (self, next),
            (Pending, Cancelled)
                | (Dispatched, InProgress)
                | (Dispatched, Cancelled)
                | (InProgress, Resolved)
                | (InProgress, Cancelled)
        )
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(IncidentStatus::Pending),
            "dispatched" => Ok(IncidentStatus::Dispatched),
            "in_progress" => Ok(IncidentStatus::InProgress),
            "resolved" => Ok(IncidentStatus::Resolved),
            "cancelled" | "canceled" => Ok(IncidentStatus::Cancelled),
            other => Err(Error::validation(
                "incident status",
                format!(
                    "'{}' is not one of pending, dispatched, in_progress, resolved, cancelled",
                    other
                ),
            )),
        }
    }
}

/// Incident priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IncidentPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl IncidentPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            IncidentPriority::Low => "low",
            IncidentPriority::Medium => "medium",
            IncidentPriority::High => "high",
            IncidentPriority::Critical => "critical",
        }
    }
}

impl fmt::Display for IncidentPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentPriority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(IncidentPriority::Low),
            "medium" => Ok(IncidentPriority::Medium),
            "high" => Ok(IncidentPriority::High),
            "critical" => Ok(IncidentPriority::Critical),
            other => Err(Error::validation(
                "incident priority",
                format!("'{}' is not one of low, medium, high, critical", other),
            )),
        }
    }
}

/// Set of vehicle statuses a nearest query accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusFilter {
    mask: u8,
}

impl StatusFilter {
    /// Accept a single status.
    pub fn only(status: VehicleStatus) -> Self {
        Self { mask: status.bit() }
    }

    /// Accept vehicles in any status.
    pub fn any() -> Self {
        Self { mask: 0b111 }
    }

    /// Shorthand for the filter used by dispatch.
    pub fn available() -> Self {
        Self::only(VehicleStatus::Available)
    }

    /// Add a status to the filter.
    pub fn or(mut self, status: VehicleStatus) -> Self {
        self.mask |= status.bit();
        self
    }

    pub fn matches(&self, status: VehicleStatus) -> bool {
        self.mask & status.bit() != 0
    }

    /// Stable rendering used in cache keys, e.g. `available+busy`.
    pub fn cache_tag(&self) -> String {
        VehicleStatus::ALL
            .iter()
            .filter(|s| self.matches(**s))
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl Default for StatusFilter {
    fn default() -> Self {
        Self::available()
    }
}

impl FromStr for StatusFilter {
    type Err = Error;

    /// Parse `any` or a comma separated list of vehicle statuses.
    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("any") {
            return Ok(Self::any());
        }
        let mut mask = 0u8;
        for part in s.split(',').filter(|p| !p.trim().is_empty()) {
            mask |= part.parse::<VehicleStatus>()?.bit();
        }
        if mask == 0 {
            return Err(Error::validation("status filter", "no statuses given"));
        }
        Ok(Self { mask })
    }
}

/// A response vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub status: VehicleStatus,
    pub position: GeoPoint,
    pub last_updated: DateTime<Utc>,
    /// Incident that claimed this vehicle through dispatch, while still attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_incident: Option<IncidentId>,
}

/// An emergency incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub address: String,
    pub position: GeoPoint,
    pub priority: IncidentPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub status: IncidentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_vehicle: Option<VehicleId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an incident.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIncident {
    pub address: String,
    pub position: GeoPoint,
    pub priority: IncidentPriority,
    pub note: Option<String>,
}

impl NewIncident {
    /// Medium priority incident without a note.
    pub fn new(address: impl Into<String>, position: GeoPoint) -> Self {
        Self {
            address: address.into(),
            position,
            priority: IncidentPriority::default(),
            note: None,
        }
    }

    pub fn with_priority(mut self, priority: IncidentPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// A fixed location vehicles can be matched against (hospitals in practice).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub id: PoiId,
    pub name: String,
    pub position: GeoPoint,
    pub created_at: DateTime<Utc>,
}

/// Check that an identifier can be embedded in cache keys.
pub(crate) fn validate_entity_id(field: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    if id
        .chars()
        .any(|c| c.is_whitespace() || c == '*' || c == ':')
    {
        return Err(Error::validation(
            field,
            format!("'{}' contains whitespace, '*' or ':'", id),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_statuses_case_insensitively() {
        assert_eq!("AVAILABLE".parse::<VehicleStatus>().unwrap(), VehicleStatus::Available);
        assert_eq!(
            "in-progress".parse::<IncidentStatus>().unwrap(),
            IncidentStatus::InProgress
        );
        assert_eq!(
            "Critical".parse::<IncidentPriority>().unwrap(),
            IncidentPriority::Critical
        );
    }

    #[test]
    fn unknown_status_is_a_validation_error() {
        let err = "parked".parse::<VehicleStatus>().unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        let err = "closed".parse::<IncidentStatus>().unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn incident_transition_table() {
        use IncidentStatus::*;
        assert!(Pending.can_update_to(Cancelled));
        assert!(!Pending.can_update_to(Dispatched));
        assert!(!Pending.can_update_to(Resolved));
        assert!(Dispatched.can_update_to(InProgress));
        assert!(InProgress.can_update_to(Resolved));
        for terminal in [Resolved, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Dispatched, InProgress, Resolved, Cancelled] {
                assert!(!terminal.can_update_to(next));
            }
        }
    }

    #[test]
    fn status_filter_matching_and_tags() {
        let filter = StatusFilter::available();
        assert!(filter.matches(VehicleStatus::Available));
        assert!(!filter.matches(VehicleStatus::Busy));
        assert_eq!(filter.cache_tag(), "available");

        let both = StatusFilter::only(VehicleStatus::Busy).or(VehicleStatus::Available);
        assert_eq!(both.cache_tag(), "available+busy");
        assert_eq!("busy,available".parse::<StatusFilter>().unwrap(), both);
        assert_eq!("any".parse::<StatusFilter>().unwrap(), StatusFilter::any());
        assert!("".parse::<StatusFilter>().is_err());
    }

    #[test]
    fn entity_ids_must_be_key_safe() {
        assert!(validate_entity_id("vehicle id", "amb-01").is_ok());
        assert!(validate_entity_id("vehicle id", "").is_err());
        assert!(validate_entity_id("vehicle id", "amb*").is_err());
        assert!(validate_entity_id("vehicle id", "a:b").is_err());
        assert!(validate_entity_id("vehicle id", "a b").is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&IncidentStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
