//! Out-of-range input is rejected and leaves state untouched.

mod common;

use common::{harness, point};
use dispatch_lib::{
    Error, ErrorKind, GeoPoint, IncidentStatus, NewIncident, StatusFilter, VehicleStatus,
};

#[test]
fn out_of_range_position_update_is_rejected() {
    let h = harness();
    let c = &h.coordinator;
    let before = c
        .register_vehicle("v1", point(3.35, 6.60), VehicleStatus::Available)
        .expect("v1 registers");

    for bad in [
        GeoPoint {
            longitude: 181.0,
            latitude: 6.60,
        },
        GeoPoint {
            longitude: 3.35,
            latitude: -91.0,
        },
    ] {
        let err = c
            .update_vehicle_position("v1", bad)
            .expect_err("out of range");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    assert_eq!(c.get_vehicle("v1").expect("v1 exists"), before);
    assert_eq!(
        c.spatial_index().entry("v1").expect("indexed").position,
        before.position
    );
    assert!(h.events.names().iter().all(|n| n != "vehicle.position-changed"));
}

#[test]
fn out_of_range_queries_and_incidents_are_rejected() {
    let h = harness();
    let c = &h.coordinator;
    let bad = GeoPoint {
        longitude: -200.0,
        latitude: 0.0,
    };
    assert!(matches!(
        c.find_nearest_vehicle(bad, StatusFilter::available()),
        Err(Error::Validation { .. })
    ));
    assert!(matches!(
        c.create_incident(NewIncident::new("Nowhere", bad)),
        Err(Error::Validation { .. })
    ));
    assert!(matches!(
        c.register_vehicle("v1", bad, VehicleStatus::Available),
        Err(Error::Validation { .. })
    ));
    assert!(c.vehicles().is_empty());
    assert!(c.incidents().is_empty());
}

#[test]
fn unknown_status_strings_are_validation_errors() {
    assert_eq!(
        "on-fire"
            .parse::<IncidentStatus>()
            .expect_err("unknown status")
            .kind(),
        ErrorKind::Validation
    );
    assert_eq!(
        "parked"
            .parse::<VehicleStatus>()
            .expect_err("unknown status")
            .kind(),
        ErrorKind::Validation
    );
}

#[test]
fn unsafe_vehicle_ids_are_rejected() {
    let h = harness();
    for id in ["", "amb 1", "amb*", "amb:1"] {
        let err = h
            .coordinator
            .register_vehicle(id, point(3.35, 6.60), VehicleStatus::Available)
            .expect_err("unsafe id");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
