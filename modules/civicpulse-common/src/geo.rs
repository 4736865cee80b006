use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Mean Earth radius used for all great-circle math.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

// --- Geo Types ---

/// A WGS-84 point. Construction validates range and finiteness, so every
/// `GeoPoint` in the system is a usable coordinate pair.
///
/// Serialized as a GeoJSON point: `{"type": "Point", "coordinates": [lng, lat]}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeoJsonPoint", into = "GeoJsonPoint")]
pub struct GeoPoint {
    lng: f64,
    lat: f64,
}

impl GeoPoint {
    pub fn new(lng: f64, lat: f64) -> Result<Self, DomainError> {
        if !lng.is_finite() || !lat.is_finite() {
            return Err(DomainError::InvalidCoordinates(
                "coordinates must be finite numbers".to_string(),
            ));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(DomainError::InvalidCoordinates(format!(
                "longitude {lng} outside [-180, 180]"
            )));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(DomainError::InvalidCoordinates(format!(
                "latitude {lat} outside [-90, 90]"
            )));
        }
        Ok(Self { lng, lat })
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Great-circle distance in meters.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        haversine_m(self.lat, self.lng, other.lat, other.lng)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoJsonPoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<f64>,
}

impl TryFrom<GeoJsonPoint> for GeoPoint {
    type Error = DomainError;

    fn try_from(value: GeoJsonPoint) -> Result<Self, Self::Error> {
        if value.kind != "Point" {
            return Err(DomainError::InvalidCoordinates(format!(
                "expected geometry type Point, got {}",
                value.kind
            )));
        }
        match value.coordinates.as_slice() {
            [lng, lat] => GeoPoint::new(*lng, *lat),
            other => Err(DomainError::InvalidCoordinates(format!(
                "expected [longitude, latitude], got {} values",
                other.len()
            ))),
        }
    }
}

impl From<GeoPoint> for GeoJsonPoint {
    fn from(point: GeoPoint) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: vec![point.lng, point.lat],
        }
    }
}

/// Haversine great-circle distance between two lat/lng points in meters.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1 for antipodal points.
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();
    EARTH_RADIUS_M * c
}

// --- Bounding boxes ---

/// Lat/lng box containing every point within a great-circle radius of a centre.
///
/// Longitudes may run past ±180 when the circle crosses the antimeridian;
/// use [`BoundingBox::lng_ranges`] to get the wrapped intervals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn around(center: &GeoPoint, radius_m: f64) -> Self {
        let angular = radius_m.max(0.0) / EARTH_RADIUS_M;
        if angular >= PI {
            return Self::world();
        }

        let angular_deg = angular.to_degrees();
        let min_lat = center.lat - angular_deg;
        let max_lat = center.lat + angular_deg;

        // Circle covers a pole: every longitude is reachable.
        if max_lat >= 90.0 || min_lat <= -90.0 {
            return Self {
                min_lat: min_lat.max(-90.0),
                max_lat: max_lat.min(90.0),
                min_lng: -180.0,
                max_lng: 180.0,
            };
        }

        let lng_delta = (angular.sin() / center.lat.to_radians().cos())
            .clamp(-1.0, 1.0)
            .asin()
            .to_degrees();

        Self {
            min_lat,
            max_lat,
            min_lng: center.lng - lng_delta,
            max_lng: center.lng + lng_delta,
        }
    }

    pub fn world() -> Self {
        Self {
            min_lat: -90.0,
            max_lat: 90.0,
            min_lng: -180.0,
            max_lng: 180.0,
        }
    }

    /// Longitude intervals inside [-180, 180], split at the antimeridian.
    pub fn lng_ranges(&self) -> Vec<(f64, f64)> {
        if self.max_lng - self.min_lng >= 360.0 {
            vec![(-180.0, 180.0)]
        } else if self.min_lng < -180.0 {
            vec![(self.min_lng + 360.0, 180.0), (-180.0, self.max_lng)]
        } else if self.max_lng > 180.0 {
            vec![(self.min_lng, 180.0), (-180.0, self.max_lng - 360.0)]
        } else {
            vec![(self.min_lng, self.max_lng)]
        }
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        if point.lat < self.min_lat || point.lat > self.max_lat {
            return false;
        }
        self.lng_ranges()
            .iter()
            .any(|(lo, hi)| point.lng >= *lo && point.lng <= *hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_and_non_finite() {
        assert!(GeoPoint::new(180.1, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -90.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).is_err());
        assert!(GeoPoint::new(-180.0, 90.0).is_ok());
    }

    #[test]
    fn geojson_roundtrip_preserves_exact_coordinates() {
        let point = GeoPoint::new(78.40, 17.44).unwrap();
        let json = serde_json::to_value(point).unwrap();
        assert_eq!(json["type"], "Point");
        assert_eq!(json["coordinates"][0].as_f64(), Some(78.40));
        assert_eq!(json["coordinates"][1].as_f64(), Some(17.44));

        let back: GeoPoint = serde_json::from_value(json).unwrap();
        assert_eq!(back, point);
    }

    #[test]
    fn geojson_wrong_arity_is_rejected() {
        let json = serde_json::json!({"type": "Point", "coordinates": [78.4]});
        assert!(serde_json::from_value::<GeoPoint>(json).is_err());

        let json = serde_json::json!({"type": "Point", "coordinates": [78.4, 17.4, 3.0]});
        assert!(serde_json::from_value::<GeoPoint>(json).is_err());
    }

    #[test]
    fn haversine_one_degree_of_latitude() {
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn haversine_is_spherical_near_poles() {
        // One degree of longitude at 89°N is ~1.9km, not ~111km.
        let d = haversine_m(89.0, 0.0, 89.0, 1.0);
        assert!(d < 2_000.0 && d > 1_900.0, "got {d}");
    }

    #[test]
    fn haversine_antipodes_is_half_circumference() {
        let d = haversine_m(0.0, 0.0, 0.0, 180.0);
        assert!((d - PI * EARTH_RADIUS_M).abs() < 1.0);
    }

    #[test]
    fn bbox_contains_points_on_circle() {
        let center = GeoPoint::new(78.4013, 17.4458).unwrap();
        let bbox = BoundingBox::around(&center, 1_000.0);
        // Due east and due north at ~999m.
        let east = GeoPoint::new(78.4013 + 0.0094, 17.4458).unwrap();
        let north = GeoPoint::new(78.4013, 17.4458 + 0.0089).unwrap();
        assert!(center.distance_m(&east) < 1_000.0);
        assert!(bbox.contains(&east));
        assert!(bbox.contains(&north));
    }

    #[test]
    fn bbox_over_pole_spans_all_longitudes() {
        let center = GeoPoint::new(10.0, 89.9).unwrap();
        let bbox = BoundingBox::around(&center, 50_000.0);
        assert_eq!(bbox.lng_ranges(), vec![(-180.0, 180.0)]);
        assert_eq!(bbox.max_lat, 90.0);
    }

    #[test]
    fn bbox_wraps_antimeridian() {
        let center = GeoPoint::new(179.99, 0.0).unwrap();
        let bbox = BoundingBox::around(&center, 10_000.0);
        let ranges = bbox.lng_ranges();
        assert_eq!(ranges.len(), 2);
        let across = GeoPoint::new(-179.99, 0.0).unwrap();
        assert!(bbox.contains(&across));
    }
}
