//! Geofence classification of a GPS fix relative to an agency location.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Fixes at or within this distance count as inside the agency premises.
pub const INSIDE_RADIUS_M: f64 = 150.0;

/// Fixes at or within this distance (and beyond [`INSIDE_RADIUS_M`]) count as field work.
pub const IN_FIELD_RADIUS_M: f64 = 500.0;

/// A (latitude, longitude) pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    #[schema(example = 14.0)]
    pub latitude: f64,
    #[schema(example = 121.0)]
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Builds a point only when both coordinates are present.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(lat), Some(lng)) => Some(Self::new(lat, lng)),
            _ => None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, AsRefStr,
)]
pub enum LocationType {
    #[serde(rename = "Inside")]
    #[strum(serialize = "Inside")]
    Inside,
    #[serde(rename = "In-field")]
    #[strum(serialize = "In-field")]
    InField,
    #[serde(rename = "Outside")]
    #[strum(serialize = "Outside")]
    Outside,
}

impl LocationType {
    /// Maps a distance in meters onto the geofence bands.
    pub fn from_distance(distance_m: f64) -> Self {
        if distance_m <= INSIDE_RADIUS_M {
            LocationType::Inside
        } else if distance_m <= IN_FIELD_RADIUS_M {
            LocationType::InField
        } else {
            LocationType::Outside
        }
    }
}

/// Great-circle distance between two points, in meters.
pub fn haversine_distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Classifies `point` against the agency location.
///
/// Returns `None` when the agency has no registered location.
pub fn classify_location(point: GeoPoint, agency: Option<GeoPoint>) -> Option<LocationType> {
    let agency = agency?;
    Some(LocationType::from_distance(haversine_distance_m(point, agency)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agency() -> GeoPoint {
        GeoPoint::new(14.0, 121.0)
    }

    #[test]
    fn test_about_111_meters_is_inside() {
        let student = GeoPoint::new(14.0010, 121.0);
        let d = haversine_distance_m(student, agency());
        assert!((d - 111.19).abs() < 0.5, "distance was {d}");
        assert_eq!(classify_location(student, Some(agency())), Some(LocationType::Inside));
    }

    #[test]
    fn test_about_333_meters_is_in_field() {
        let student = GeoPoint::new(14.0030, 121.0);
        assert_eq!(classify_location(student, Some(agency())), Some(LocationType::InField));
    }

    #[test]
    fn test_about_1110_meters_is_outside() {
        let student = GeoPoint::new(14.0100, 121.0);
        assert_eq!(classify_location(student, Some(agency())), Some(LocationType::Outside));
    }

    #[test]
    fn test_missing_agency_location_skips_classification() {
        assert_eq!(classify_location(agency(), None), None);
    }

    #[test]
    fn test_band_edges_are_inclusive() {
        assert_eq!(LocationType::from_distance(150.0), LocationType::Inside);
        assert_eq!(LocationType::from_distance(150.01), LocationType::InField);
        assert_eq!(LocationType::from_distance(500.0), LocationType::InField);
        assert_eq!(LocationType::from_distance(500.01), LocationType::Outside);
    }

    #[test]
    fn test_same_point_is_zero_distance() {
        assert_eq!(haversine_distance_m(agency(), agency()), 0.0);
    }

    #[test]
    fn test_classification_is_symmetric() {
        let pairs = [
            (GeoPoint::new(14.0, 121.0), GeoPoint::new(14.0012, 121.0009)),
            (GeoPoint::new(-33.8688, 151.2093), GeoPoint::new(-33.8700, 151.2110)),
            (GeoPoint::new(51.5007, -0.1246), GeoPoint::new(51.5033, -0.1196)),
            (GeoPoint::new(0.0, 179.999), GeoPoint::new(0.0, -179.999)),
        ];

        for (a, b) in pairs {
            let ab = haversine_distance_m(a, b);
            let ba = haversine_distance_m(b, a);
            assert!((ab - ba).abs() < 1e-6);
            assert_eq!(classify_location(a, Some(b)), classify_location(b, Some(a)));
        }
    }

    #[test]
    fn test_antimeridian_pair_is_close() {
        let d = haversine_distance_m(GeoPoint::new(0.0, 179.999), GeoPoint::new(0.0, -179.999));
        assert!(d < 250.0, "distance was {d}");
    }

    #[test]
    fn test_from_parts_requires_both_coordinates() {
        assert_eq!(GeoPoint::from_parts(Some(1.0), None), None);
        assert_eq!(GeoPoint::from_parts(None, Some(1.0)), None);
        assert_eq!(GeoPoint::from_parts(Some(1.0), Some(2.0)), Some(GeoPoint::new(1.0, 2.0)));
    }

    #[test]
    fn test_location_type_string_forms() {
        assert_eq!(LocationType::InField.as_ref(), "In-field");
        assert_eq!("Outside".parse::<LocationType>().ok(), Some(LocationType::Outside));
        assert_eq!(
            serde_json::to_string(&LocationType::InField).ok().as_deref(),
            Some("\"In-field\"")
        );
    }
}
