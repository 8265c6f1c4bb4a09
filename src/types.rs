use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GaugeId(pub String);

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for GaugeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metres per degree of arc, the same constant for latitude and longitude.
/// Only valid over a single metro-sized extent: no cos(latitude) correction
/// is applied to longitude, so east-west distances are overstated away from
/// the equator.
pub const METRES_PER_DEGREE: f64 = 111_000.0;

/// [`METRES_PER_DEGREE`] expressed per radian, for distances measured in the
/// radian-space gauge index.
pub const METRES_PER_RADIAN: f64 = METRES_PER_DEGREE * 180.0 / std::f64::consts::PI;

/// Mean Earth radius used by the haversine distance.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPoint { lat, lon }
    }

    /// Euclidean distance treating (lon, lat) degrees as a plane.
    pub fn planar_distance_deg(&self, other: &GeoPoint) -> f64 {
        let dlat = self.lat - other.lat;
        let dlon = self.lon - other.lon;
        (dlat * dlat + dlon * dlon).sqrt()
    }

    /// Planar degree distance scaled by [`METRES_PER_DEGREE`]. This is the
    /// distance every model component uses; see the module docs of
    /// `correlation` and `depth`.
    pub fn approx_distance_m(&self, other: &GeoPoint) -> f64 {
        self.planar_distance_deg(other) * METRES_PER_DEGREE
    }

    /// Great-circle distance in metres. Reporting only.
    pub fn haversine_m(&self, other: &GeoPoint) -> f64 {
        let (lat1, lon1) = (self.lat.to_radians(), self.lon.to_radians());
        let (lat2, lon2) = (other.lat.to_radians(), other.lon.to_radians());
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// `[lat, lon]` in radians, the coordinate space of `SpatialIndex`.
    pub fn to_radians(&self) -> [f64; 2] {
        [self.lat.to_radians(), self.lon.to_radians()]
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Construction category of a property. Drives the damage multiplier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BuildingType {
    #[default]
    Residential,
    Commercial,
    Industrial,
    Other(String),
}

impl BuildingType {
    /// Case-insensitive parse; anything unrecognised is kept as `Other`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "residential" => BuildingType::Residential,
            "commercial" => BuildingType::Commercial,
            "industrial" => BuildingType::Industrial,
            other => BuildingType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BuildingType::Residential => "residential",
            BuildingType::Commercial => "commercial",
            BuildingType::Industrial => "industrial",
            BuildingType::Other(s) => s,
        }
    }
}

impl From<String> for BuildingType {
    fn from(s: String) -> Self {
        BuildingType::parse(&s)
    }
}

impl From<BuildingType> for String {
    fn from(t: BuildingType) -> Self {
        t.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn approx_distance_uses_degree_scale() {
        let a = GeoPoint::new(51.5, -0.1);
        let b = GeoPoint::new(51.51, -0.1);
        assert_relative_eq!(a.approx_distance_m(&b), 1_110.0, epsilon = 1e-6);
    }

    #[test]
    fn haversine_is_close_to_planar_for_latitude_steps() {
        let a = GeoPoint::new(51.5, -0.1);
        let b = GeoPoint::new(51.6, -0.1);
        let h = a.haversine_m(&b);
        assert!((h - 11_120.0).abs() < 20.0, "haversine {h}");
    }

    #[test]
    fn building_type_parse_is_case_insensitive() {
        assert_eq!(BuildingType::parse("Commercial"), BuildingType::Commercial);
        assert_eq!(BuildingType::parse(" INDUSTRIAL "), BuildingType::Industrial);
        assert_eq!(BuildingType::parse("barn"), BuildingType::Other("barn".to_string()));
    }

    #[test]
    fn invalid_points_are_rejected() {
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::NAN).is_valid());
        assert!(GeoPoint::new(-33.9, 151.2).is_valid());
    }
}
