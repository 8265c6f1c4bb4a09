//! Flood scenario derived from river-gauge stations.
//!
//! Each station's peak reading is scored against its warning thresholds;
//! the most vulnerable stations become flood centres whose radius and depth
//! grow with the score.

use serde::{Deserialize, Serialize};

use crate::portfolio::{FloodCenter, FloodEvent};
use crate::types::{GaugeId, GeoPoint};

/// At most this many centres are placed.
pub const MAX_CENTERS: usize = 5;
/// Stations scoring above this count towards the number of centres.
pub const VULNERABILITY_THRESHOLD: f64 = 0.1;

const MIN_RADIUS_M: f64 = 1_000.0;
const RADIUS_SPAN_M: f64 = 4_000.0;
const MAX_DEPTH_CAP_M: f64 = 3.0;

/// A monitoring station with its flood thresholds and recent readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeStation {
    #[serde(alias = "gauge_id")]
    pub id: GaugeId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(alias = "gauge_latitude")]
    pub latitude: f64,
    #[serde(alias = "gauge_longitude")]
    pub longitude: f64,
    #[serde(default, alias = "flood_alert")]
    pub alert_level: f64,
    #[serde(default, alias = "flood_warning")]
    pub warning_level: f64,
    #[serde(default, alias = "severe_flood_warning")]
    pub severe_level: f64,
    /// Water levels in metres, any order.
    #[serde(default)]
    pub readings: Vec<f64>,
}

impl GaugeStation {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Highest finite reading.
    pub fn peak_level(&self) -> Option<f64> {
        self.readings.iter().copied().filter(|x| x.is_finite()).reduce(f64::max)
    }

    /// Stations without a location, a severe threshold or any reading can't
    /// be scored.
    fn usable(&self) -> bool {
        self.location().is_valid() && self.severe_level > 0.0 && self.peak_level().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationVulnerability {
    pub id: GaugeId,
    pub name: String,
    pub location: GeoPoint,
    pub peak_level: f64,
    /// `min(peak / severe, 1)`.
    pub severe_proximity: f64,
    /// `max(peak - alert, 0)`, zero when no alert level is set.
    pub alert_exceedance: f64,
    /// `0.6 * severe_proximity + 0.4 * alert_exceedance`.
    pub score: f64,
}

impl StationVulnerability {
    pub fn assess(station: &GaugeStation) -> Option<Self> {
        if !station.usable() {
            return None;
        }
        let peak = station.peak_level()?;
        let severe_proximity = (peak / station.severe_level).min(1.0);
        let alert_exceedance = if station.alert_level > 0.0 { (peak - station.alert_level).max(0.0) } else { 0.0 };
        Some(StationVulnerability {
            id: station.id.clone(),
            name: station.name.clone().unwrap_or_else(|| station.id.to_string()),
            location: station.location(),
            peak_level: peak,
            severe_proximity,
            alert_exceedance,
            score: 0.6 * severe_proximity + 0.4 * alert_exceedance,
        })
    }

    /// Radius 1 to 5 km and depth 0.2 m upwards (capped at 3 m), both
    /// growing with the score.
    pub fn to_center(&self) -> FloodCenter {
        let radius = (MIN_RADIUS_M + self.score * RADIUS_SPAN_M).floor();
        let depth = (0.2 + 1.8 * self.score + (0.5 * self.alert_exceedance).min(1.0)).min(MAX_DEPTH_CAP_M);
        FloodCenter {
            name: self.name.clone(),
            lat: self.location.lat,
            lon: self.location.lon,
            radius_m: radius,
            max_depth_m: (depth * 100.0).round() / 100.0,
        }
    }
}

/// Central London, used when no station can be scored.
pub fn default_event() -> FloodEvent {
    FloodEvent {
        centers: vec![FloodCenter {
            name: "Default_Thames".into(),
            lat: 51.5074,
            lon: -0.1278,
            radius_m: 2_000.0,
            max_depth_m: 0.5,
        }],
    }
}

/// Score every usable station, most vulnerable first. Ties keep input order.
pub fn rank_stations(stations: &[GaugeStation]) -> Vec<StationVulnerability> {
    let mut ranked: Vec<StationVulnerability> = stations.iter().filter_map(StationVulnerability::assess).collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

/// Multi-centre event from the `min(5, max(1, #score > 0.1))` most
/// vulnerable stations.
pub fn event_from_stations(stations: &[GaugeStation]) -> FloodEvent {
    let ranked = rank_stations(stations);
    if ranked.is_empty() {
        log::debug!("no usable gauge stations; using default flood centre");
        return default_event();
    }
    let n = ranked.iter().filter(|v| v.score > VULNERABILITY_THRESHOLD).count().clamp(1, MAX_CENTERS);
    let centers: Vec<FloodCenter> = ranked.iter().take(n).map(StationVulnerability::to_center).collect();
    log::debug!("{} flood centres from {} scored stations", centers.len(), ranked.len());
    FloodEvent { centers }
}
