//! Per-property flood depth.
//!
//! Two sources, chosen up front by whether any gauge readings exist:
//! radial decay from the event centres, or inverse-distance-squared
//! weighting of the nearest gauges. A property with no gauge in range falls
//! back to radial decay. Either way the property's floor height is then
//! subtracted and the result floored at zero.

use serde::Serialize;

use crate::error::ModelWarning;
use crate::portfolio::{FloodEvent, GaugeReading, Property};
use crate::spatial::SpatialIndex;
use crate::types::{GeoPoint, METRES_PER_RADIAN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DepthSource {
    Radial,
    GaugeInterpolated,
}

impl DepthSource {
    pub fn for_gauges(gauges: &[GaugeReading]) -> Self {
        if gauges.is_empty() { DepthSource::Radial } else { DepthSource::GaugeInterpolated }
    }
}

/// Depths for a portfolio, index-aligned with the property slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DepthField {
    /// Metres above the lowest floor, never negative.
    pub depths: Vec<f64>,
    /// Where each depth came from after any per-property fallback.
    pub sources: Vec<DepthSource>,
    pub warnings: Vec<ModelWarning>,
}

#[derive(Debug, Clone)]
pub struct DepthInterpolator {
    event: FloodEvent,
    gauges: Vec<GaugeReading>,
    index: SpatialIndex,
    source: DepthSource,
    neighbours: usize,
    max_distance_m: f64,
}

impl DepthInterpolator {
    pub fn new(event: FloodEvent, gauges: Vec<GaugeReading>, neighbours: usize, max_distance_m: f64) -> Self {
        let source = DepthSource::for_gauges(&gauges);
        let locations: Vec<GeoPoint> = gauges.iter().map(|g| g.location).collect();
        DepthInterpolator {
            index: SpatialIndex::build(&locations),
            event,
            gauges,
            source,
            neighbours,
            max_distance_m,
        }
    }

    pub fn source(&self) -> DepthSource {
        self.source
    }

    pub fn event(&self) -> &FloodEvent {
        &self.event
    }

    pub fn gauges(&self) -> &[GaugeReading] {
        &self.gauges
    }

    /// Ground-level water depth from the event centres: the deepest of
    /// `max_depth * (1 - d / radius)` over centres with `d < radius`.
    pub fn radial_depth(&self, at: &GeoPoint) -> f64 {
        self.event
            .centers
            .iter()
            .map(|c| {
                let d = at.approx_distance_m(&c.location());
                if d < c.radius_m { (c.max_depth_m * (1.0 - d / c.radius_m)).max(0.0) } else { 0.0 }
            })
            .fold(0.0, f64::max)
    }

    fn gauge_depth(&self, property: &Property, warnings: &mut Vec<ModelWarning>) -> Option<f64> {
        let max_rad = self.max_distance_m / METRES_PER_RADIAN;
        let near = self.index.nearest(&property.location, self.neighbours, max_rad);
        let first = near.first()?;
        if first.distance == 0.0 {
            let gauge = &self.gauges[first.index];
            warnings.push(ModelWarning::ExactGaugeMatch { property: property.id.clone(), gauge: gauge.id.clone() });
            return Some(gauge.water_level);
        }
        let (mut num, mut den) = (0.0, 0.0);
        for n in &near {
            let d_m = n.distance * METRES_PER_RADIAN;
            let w = 1.0 / (d_m * d_m);
            num += w * self.gauges[n.index].water_level;
            den += w;
        }
        Some(num / den)
    }

    /// Ground-level depth and its source for one property.
    fn ground_depth(&self, property: &Property, warnings: &mut Vec<ModelWarning>) -> (f64, DepthSource) {
        match self.source {
            DepthSource::Radial => (self.radial_depth(&property.location), DepthSource::Radial),
            DepthSource::GaugeInterpolated => match self.gauge_depth(property, warnings) {
                Some(d) => (d, DepthSource::GaugeInterpolated),
                None => {
                    warnings.push(ModelWarning::GaugeFallbackToRadial { property: property.id.clone() });
                    (self.radial_depth(&property.location), DepthSource::Radial)
                }
            },
        }
    }

    pub fn depths(&self, properties: &[Property]) -> DepthField {
        let mut field = DepthField {
            depths: Vec::with_capacity(properties.len()),
            sources: Vec::with_capacity(properties.len()),
            warnings: Vec::new(),
        };
        for p in properties {
            let (ground, source) = self.ground_depth(p, &mut field.warnings);
            field.depths.push((ground - p.floor_height).max(0.0));
            field.sources.push(source);
        }
        log::debug!(
            "depths: {} properties, {} flooded, {} warnings",
            properties.len(),
            field.depths.iter().filter(|d| **d > 0.0).count(),
            field.warnings.len()
        );
        field
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::portfolio::FloodCenter;
    use crate::types::METRES_PER_DEGREE;

    fn north_of(origin: GeoPoint, metres: f64) -> GeoPoint {
        GeoPoint::new(origin.lat + metres / METRES_PER_DEGREE, origin.lon)
    }

    fn radial(event: FloodEvent) -> DepthInterpolator {
        DepthInterpolator::new(event, Vec::new(), 5, 5_000.0)
    }

    #[test]
    fn centre_property_gets_max_depth() {
        let interp = radial(FloodEvent::single(51.5, -0.1, 1_000.0, 2.0));
        let field = interp.depths(&[Property::new("P", 51.5, -0.1, 100.0)]);
        assert_eq!(field.depths, vec![2.0]);
        assert_eq!(field.sources, vec![DepthSource::Radial]);
    }

    #[test]
    fn radial_depth_decays_and_is_zero_beyond_radius() {
        let centre = GeoPoint::new(51.5, -0.1);
        let interp = radial(FloodEvent::single(centre.lat, centre.lon, 1_000.0, 2.0));
        assert_relative_eq!(interp.radial_depth(&north_of(centre, 500.0)), 1.0, epsilon = 1e-6);
        assert_eq!(interp.radial_depth(&north_of(centre, 1_000.5)), 0.0);
        assert_eq!(interp.radial_depth(&north_of(centre, 5_000.0)), 0.0);
        let mut prev = f64::INFINITY;
        for m in (0..1_200).step_by(50) {
            let d = interp.radial_depth(&north_of(centre, m as f64));
            assert!(d <= prev && d >= 0.0);
            prev = d;
        }
    }

    #[test]
    fn floor_height_is_subtracted_and_floored() {
        let interp = radial(FloodEvent::single(51.5, -0.1, 1_000.0, 2.0));
        let props = [
            Property::new("low", 51.5, -0.1, 1.0).with_floor_height(0.5),
            Property::new("high", 51.5, -0.1, 1.0).with_floor_height(3.0),
        ];
        assert_eq!(interp.depths(&props).depths, vec![1.5, 0.0]);
    }

    #[test]
    fn overlapping_centres_take_the_deeper() {
        let event = FloodEvent {
            centers: vec![
                FloodCenter { name: "a".into(), lat: 51.5, lon: -0.1, radius_m: 1_000.0, max_depth_m: 1.0 },
                FloodCenter { name: "b".into(), lat: 51.5, lon: -0.1, radius_m: 2_000.0, max_depth_m: 3.0 },
            ],
        };
        assert_relative_eq!(radial(event).radial_depth(&GeoPoint::new(51.5, -0.1)), 3.0);
    }

    #[test]
    fn idw_weights_by_inverse_square_distance() {
        let origin = GeoPoint::new(51.5, -0.1);
        let g1 = north_of(origin, 100.0);
        let g2 = north_of(origin, -200.0);
        let gauges = vec![
            GaugeReading::new("G1", g1.lat, g1.lon, 1.0),
            GaugeReading::new("G2", g2.lat, g2.lon, 2.0),
        ];
        let interp = DepthInterpolator::new(FloodEvent::single(0.0, 0.0, 1.0, 0.0), gauges, 5, 5_000.0);
        let field = interp.depths(&[Property::new("P", origin.lat, origin.lon, 1.0)]);
        // weights 1/100² and 1/200² → (4·1 + 1·2) / 5
        assert_relative_eq!(field.depths[0], 1.2, epsilon = 1e-3);
        assert_eq!(field.sources[0], DepthSource::GaugeInterpolated);
        assert!(field.warnings.is_empty());
    }

    #[test]
    fn property_on_a_gauge_takes_its_reading() {
        let gauges = vec![
            GaugeReading::new("G1", 51.5, -0.1, 1.7),
            GaugeReading::new("G2", 51.501, -0.1, 0.2),
        ];
        let interp = DepthInterpolator::new(FloodEvent::single(0.0, 0.0, 1.0, 0.0), gauges, 5, 5_000.0);
        let field = interp.depths(&[Property::new("P", 51.5, -0.1, 1.0)]);
        assert_eq!(field.depths, vec![1.7]);
        assert!(matches!(field.warnings[0], ModelWarning::ExactGaugeMatch { .. }));
    }

    #[test]
    fn no_gauge_in_range_falls_back_to_radial() {
        let gauges = vec![GaugeReading::new("far", 53.0, -0.1, 4.0)];
        let interp = DepthInterpolator::new(FloodEvent::single(51.5, -0.1, 1_000.0, 2.0), gauges, 5, 5_000.0);
        assert_eq!(interp.source(), DepthSource::GaugeInterpolated);
        let field = interp.depths(&[Property::new("P", 51.5, -0.1, 1.0)]);
        assert_eq!(field.depths, vec![2.0]);
        assert_eq!(field.sources, vec![DepthSource::Radial]);
        assert!(matches!(field.warnings[0], ModelWarning::GaugeFallbackToRadial { .. }));
    }

    #[test]
    fn search_radius_uses_the_planar_metre_scale() {
        let origin = GeoPoint::new(51.5, -0.1);
        let near_edge = north_of(origin, 4_995.0);
        let past_edge = north_of(origin, 5_005.0);
        let event = FloodEvent::single(0.0, 0.0, 1.0, 0.0);
        let inside = DepthInterpolator::new(
            event.clone(),
            vec![GaugeReading::new("G", near_edge.lat, near_edge.lon, 1.3)],
            5,
            5_000.0,
        );
        let field = inside.depths(&[Property::new("P", origin.lat, origin.lon, 1.0)]);
        assert_eq!(field.sources, vec![DepthSource::GaugeInterpolated]);
        assert_relative_eq!(field.depths[0], 1.3);

        let outside =
            DepthInterpolator::new(event, vec![GaugeReading::new("G", past_edge.lat, past_edge.lon, 1.3)], 5, 5_000.0);
        let field = outside.depths(&[Property::new("P", origin.lat, origin.lon, 1.0)]);
        assert_eq!(field.sources, vec![DepthSource::Radial]);
    }

    #[test]
    fn oversized_neighbour_count_does_not_overflow() {
        let gauges = vec![GaugeReading::new("G1", 51.501, -0.1, 0.8)];
        let interp = DepthInterpolator::new(FloodEvent::single(51.5, -0.1, 1_000.0, 2.0), gauges, usize::MAX / 2, 5_000.0);
        let field = interp.depths(&[Property::new("P", 51.5, -0.1, 1.0)]);
        assert_relative_eq!(field.depths[0], 0.8);
    }

    #[test]
    fn depths_are_idempotent() {
        let interp = radial(FloodEvent::single(51.5, -0.1, 3_000.0, 2.0));
        let props: Vec<Property> =
            (0..20).map(|i| Property::new(format!("P{i}"), 51.5 + i as f64 * 0.001, -0.1, 1.0)).collect();
        assert_eq!(interp.depths(&props), interp.depths(&props));
    }
}
