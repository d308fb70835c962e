//! WGS84 points and great-circle distance.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mean Earth radius in meters (spherical model).
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A longitude/latitude pair in degrees.
///
/// Construct through [`GeoPoint::new`] to get range validation. The fields are
/// public so callers can build points from untrusted input and let the
/// coordinator reject them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    /// Create a validated point.
    pub fn new(longitude: f64, latitude: f64) -> Result<Self> {
        let point = Self {
            longitude,
            latitude,
        };
        point.validate()?;
        Ok(point)
    }

    /// Reject coordinates outside the WGS84 range (and non-finite values).
    pub fn validate(&self) -> Result<()> {
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::validation(
                "longitude",
                format!("{} is outside [-180, 180]", self.longitude),
            ));
        }
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::validation(
                "latitude",
                format!("{} is outside [-90, 90]", self.latitude),
            ));
        }
        Ok(())
    }

    /// Great-circle distance to another point in meters (haversine).
    pub fn distance_to(&self, other: &Self) -> f64 {
        haversine_distance(self, other)
    }

    /// Position on the unit sphere.
    ///
    /// Chord length between two such vectors grows monotonically with the
    /// great-circle distance, so Euclidean nearest-neighbour search over these
    /// coordinates returns the same ordering as haversine.
    pub fn to_unit_vector(&self) -> [f64; 3] {
        let lat = self.latitude.to_radians();
        let lon = self.longitude.to_radians();
        [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
    }

    /// Canonical rendering used in cache keys (six decimals, roughly 0.1 m).
    pub fn cache_fragment(&self) -> String {
        format!("{:.6}:{:.6}", self.longitude, self.latitude)
    }

    /// Coarser rendering used for route keys (five decimals, roughly 1 m).
    pub fn rounded_fragment(&self) -> String {
        format!("{:.5}:{:.5}", self.longitude, self.latitude)
    }

    /// `[longitude, latitude]` as used in GeoJSON polylines.
    pub fn to_pair(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.longitude, self.latitude)
    }
}

/// Haversine distance between two points on a sphere of radius
/// [`EARTH_RADIUS_METERS`].
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_METERS * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(GeoPoint::new(181.0, 0.0).is_err());
        assert!(GeoPoint::new(-180.5, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -91.0).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(180.0, -90.0).is_ok());
    }

    #[test]
    fn validation_error_names_the_field() {
        let err = GeoPoint::new(0.0, 95.0).unwrap_err();
        assert!(err.to_string().contains("latitude"));
    }

    #[test]
    fn one_degree_of_latitude() {
        let a = GeoPoint::new(0.0, 0.0).unwrap();
        let b = GeoPoint::new(0.0, 1.0).unwrap();
        let d = haversine_distance(&a, &b);
        // 2 * pi * R / 360
        assert!((d - 111_194.93).abs() < 1.0, "got {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = GeoPoint::new(3.35, 6.60).unwrap();
        let b = GeoPoint::new(3.345, 6.597).unwrap();
        assert!((a.distance_to(&b) - b.distance_to(&a)).abs() < 1e-9);
        assert!(a.distance_to(&b) > 0.0);
    }

    #[test]
    fn unit_vector_has_unit_length() {
        let v = GeoPoint::new(-73.98, 40.75).unwrap().to_unit_vector();
        let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        assert!((len - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cache_fragments() {
        let p = GeoPoint::new(3.345, 6.597).unwrap();
        assert_eq!(p.cache_fragment(), "3.345000:6.597000");
        assert_eq!(p.rounded_fragment(), "3.34500:6.59700");
    }
}
