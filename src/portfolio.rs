//! Property, gauge and flood-event records, validated at the ingestion
//! boundary. The `Raw*` structs mirror what the data-standardisation layer
//! emits (every field optional); `TryFrom` turns them into the strict types
//! the model works with.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FloodRiskError, Result};
use crate::types::{BuildingType, GaugeId, GeoPoint, PropertyId};

/// A property in the portfolio. Immutable for the lifetime of a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub id: PropertyId,
    pub location: GeoPoint,
    /// Market value, currency-agnostic.
    pub value: f64,
    /// Height of the lowest habitable floor above ground, metres.
    pub floor_height: f64,
    pub building_type: BuildingType,
    /// Ground elevation above datum, metres.
    pub elevation: Option<f64>,
    /// Any further numeric attributes the standardiser attached.
    pub extra: BTreeMap<String, f64>,
}

impl Property {
    pub fn new(id: impl Into<String>, lat: f64, lon: f64, value: f64) -> Self {
        Property {
            id: PropertyId(id.into()),
            location: GeoPoint::new(lat, lon),
            value,
            floor_height: 0.0,
            building_type: BuildingType::Residential,
            elevation: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_floor_height(mut self, floor_height: f64) -> Self {
        self.floor_height = floor_height;
        self
    }

    pub fn with_building_type(mut self, building_type: BuildingType) -> Self {
        self.building_type = building_type;
        self
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    /// Re-check the invariants `TryFrom<RawProperty>` enforces, for records
    /// built in code rather than parsed.
    pub fn validate(&self) -> Result<()> {
        let record = format!("property {}", self.id);
        if self.id.0.trim().is_empty() {
            return Err(FloodRiskError::input(record, "id", "is empty"));
        }
        check_point(&record, self.location)?;
        if !self.value.is_finite() || self.value < 0.0 {
            return Err(FloodRiskError::input(
                record,
                "value",
                format!("must be a finite non-negative number, got {}", self.value),
            ));
        }
        if !self.floor_height.is_finite() {
            return Err(FloodRiskError::input(record, "floor_height", "is not finite"));
        }
        if let Some(e) = self.elevation
            && !e.is_finite()
        {
            return Err(FloodRiskError::input(record, "elevation", "is not finite"));
        }
        Ok(())
    }
}

fn check_point(record: &str, p: GeoPoint) -> Result<()> {
    if !p.lat.is_finite() || !(-90.0..=90.0).contains(&p.lat) {
        return Err(FloodRiskError::input(record, "latitude", format!("out of range: {}", p.lat)));
    }
    if !p.lon.is_finite() || !(-180.0..=180.0).contains(&p.lon) {
        return Err(FloodRiskError::input(record, "longitude", format!("out of range: {}", p.lon)));
    }
    Ok(())
}

fn required<T>(record: &str, field: &'static str, v: Option<T>) -> Result<T> {
    v.ok_or_else(|| FloodRiskError::input(record, field, "is missing"))
}

/// A numeric field of a raw record. `null` counts as absent; anything else
/// that is not a JSON number is an input error naming the field.
fn numeric(record: &str, field: &'static str, v: Option<serde_json::Value>) -> Result<Option<f64>> {
    match v {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| FloodRiskError::input(record, field, format!("is not representable as f64: {n}"))),
        Some(other) => Err(FloodRiskError::input(record, field, format!("is not numeric, got {other}"))),
    }
}

/// Property record as emitted by the standardiser. Numeric fields are kept
/// as raw JSON so a malformed number surfaces as an input error on the
/// record rather than a parse failure of the whole document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProperty {
    #[serde(alias = "property_id")]
    pub id: Option<String>,
    pub latitude: Option<serde_json::Value>,
    pub longitude: Option<serde_json::Value>,
    pub value: Option<serde_json::Value>,
    #[serde(alias = "floor_level_metres")]
    pub floor_height: Option<serde_json::Value>,
    #[serde(alias = "property_type")]
    pub building_type: Option<String>,
    pub elevation: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TryFrom<RawProperty> for Property {
    type Error = FloodRiskError;

    fn try_from(raw: RawProperty) -> Result<Self> {
        let id = required("property <unnamed>", "id", raw.id)?;
        let record = format!("property {id}");
        let lat = required(&record, "latitude", numeric(&record, "latitude", raw.latitude)?)?;
        let lon = required(&record, "longitude", numeric(&record, "longitude", raw.longitude)?)?;
        let value = required(&record, "value", numeric(&record, "value", raw.value)?)?;
        let floor_height = numeric(&record, "floor_height", raw.floor_height)?.unwrap_or(0.0);
        let elevation = numeric(&record, "elevation", raw.elevation)?;

        // Non-numeric extras are dropped; the model only reads numbers.
        let extra = raw
            .extra
            .into_iter()
            .filter_map(|(k, v)| v.as_f64().map(|f| (k, f)))
            .collect();

        let property = Property {
            id: PropertyId(id),
            location: GeoPoint::new(lat, lon),
            value,
            floor_height,
            building_type: raw.building_type.as_deref().map(BuildingType::parse).unwrap_or_default(),
            elevation,
            extra,
        };
        property.validate()?;
        Ok(property)
    }
}

/// A single water-level observation at a gauge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeReading {
    pub id: GaugeId,
    pub location: GeoPoint,
    /// Water depth above local ground at the gauge, metres.
    pub water_level: f64,
}

impl GaugeReading {
    pub fn new(id: impl Into<String>, lat: f64, lon: f64, water_level: f64) -> Self {
        GaugeReading { id: GaugeId(id.into()), location: GeoPoint::new(lat, lon), water_level }
    }

    pub fn validate(&self) -> Result<()> {
        let record = format!("gauge {}", self.id);
        check_point(&record, self.location)?;
        if !self.water_level.is_finite() {
            return Err(FloodRiskError::input(record, "water_level", "is not finite"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGaugeReading {
    #[serde(alias = "gauge_id")]
    pub id: Option<String>,
    pub latitude: Option<serde_json::Value>,
    pub longitude: Option<serde_json::Value>,
    pub water_level: Option<serde_json::Value>,
}

impl TryFrom<RawGaugeReading> for GaugeReading {
    type Error = FloodRiskError;

    fn try_from(raw: RawGaugeReading) -> Result<Self> {
        let id = required("gauge <unnamed>", "id", raw.id)?;
        let record = format!("gauge {id}");
        let reading = GaugeReading {
            location: GeoPoint::new(
                required(&record, "latitude", numeric(&record, "latitude", raw.latitude)?)?,
                required(&record, "longitude", numeric(&record, "longitude", raw.longitude)?)?,
            ),
            water_level: required(&record, "water_level", numeric(&record, "water_level", raw.water_level)?)?,
            id: GaugeId(id),
        };
        reading.validate()?;
        Ok(reading)
    }
}

/// One centre of a flood scenario. Depth decays linearly from `max_depth_m`
/// at the centre to zero at `radius_m`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodCenter {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "center_lat")]
    pub lat: f64,
    #[serde(rename = "center_lon")]
    pub lon: f64,
    #[serde(rename = "radius")]
    pub radius_m: f64,
    #[serde(rename = "max_depth")]
    pub max_depth_m: f64,
}

impl FloodCenter {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

/// A discrete flood scenario: one or more centres. Where centres overlap a
/// property takes the deepest of them.
///
/// Deserialises from either `{"centers": [...]}` or a single bare
/// `{center_lat, center_lon, radius, max_depth}` descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FloodEventRepr")]
pub struct FloodEvent {
    pub centers: Vec<FloodCenter>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FloodEventRepr {
    Centres { centers: Vec<FloodCenter> },
    Single(FloodCenter),
}

impl From<FloodEventRepr> for FloodEvent {
    fn from(repr: FloodEventRepr) -> Self {
        match repr {
            FloodEventRepr::Centres { centers } => FloodEvent { centers },
            FloodEventRepr::Single(mut c) => {
                if c.name.is_empty() {
                    c.name = "event".to_string();
                }
                FloodEvent { centers: vec![c] }
            }
        }
    }
}

impl FloodEvent {
    pub fn single(lat: f64, lon: f64, radius_m: f64, max_depth_m: f64) -> Self {
        FloodEvent {
            centers: vec![FloodCenter { name: "event".to_string(), lat, lon, radius_m, max_depth_m }],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.centers.is_empty() {
            return Err(FloodRiskError::input("flood event", "centers", "is empty"));
        }
        for c in &self.centers {
            let record = format!("flood centre {}", c.name);
            check_point(&record, c.location())?;
            if !c.radius_m.is_finite() || c.radius_m <= 0.0 {
                return Err(FloodRiskError::config(format!(
                    "flood centre {} radius must be > 0, got {}",
                    c.name, c.radius_m
                )));
            }
            if !c.max_depth_m.is_finite() || c.max_depth_m < 0.0 {
                return Err(FloodRiskError::config(format!(
                    "flood centre {} max depth must be >= 0, got {}",
                    c.name, c.max_depth_m
                )));
            }
        }
        Ok(())
    }
}
