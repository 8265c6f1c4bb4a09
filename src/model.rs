//! The portfolio flood-risk model: one flood scenario over one portfolio.
//!
//! Inputs are validated once in [`FloodRiskModel::new`]; every method after
//! that is a pure function of the stored inputs and its arguments. The
//! correlation factor depends only on the property set, so it is built on
//! first use and shared by every later simulation of the same model.

use std::sync::OnceLock;
use std::sync::atomic::AtomicBool;

use rayon::prelude::*;

use serde::{Deserialize, Serialize};

use crate::cluster::{self, ClusterAnalysis};
use crate::config::ModelConfig;
use crate::correlation::CorrelationMatrix;
use crate::depth::{DepthField, DepthInterpolator, DepthSource};
use crate::error::{FloodRiskError, ModelWarning, Result};
use crate::metrics::{
    self, AdvancedMetrics, ElevationAnalysis, LossStatistics, PortfolioSummary, PropertyRiskDetail, SpatialConcentration,
};
use crate::portfolio::{FloodEvent, GaugeReading, Property, RawGaugeReading, RawProperty};
use crate::scenario::{self, GaugeStation};
use crate::simulation::{PortfolioSimulator, SimulationResult};

#[derive(Debug, Clone)]
pub struct FloodRiskModel {
    properties: Vec<Property>,
    interpolator: DepthInterpolator,
    config: ModelConfig,
    simulator: OnceLock<PortfolioSimulator>,
}

impl FloodRiskModel {
    pub fn new(
        properties: Vec<Property>,
        flood_event: FloodEvent,
        gauges: Vec<GaugeReading>,
        config: ModelConfig,
    ) -> Result<Self> {
        config.validate()?;
        flood_event.validate()?;
        for p in &properties {
            p.validate()?;
        }
        for g in &gauges {
            g.validate()?;
        }
        log::debug!(
            "model: {} properties, {} flood centres, {} gauges",
            properties.len(),
            flood_event.centers.len(),
            gauges.len()
        );
        let interpolator =
            DepthInterpolator::new(flood_event, gauges, config.gauge_neighbours, config.max_gauge_distance_m);
        Ok(FloodRiskModel { properties, interpolator, config, simulator: OnceLock::new() })
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn flood_event(&self) -> &FloodEvent {
        self.interpolator.event()
    }

    pub fn depth_source(&self) -> DepthSource {
        self.interpolator.source()
    }

    pub fn total_value(&self) -> f64 {
        self.properties.iter().map(|p| p.value).sum()
    }

    // ── Depth and damage ─────────────────────────────────────────────────────

    /// Depths together with their per-property source and any warnings.
    pub fn depth_field(&self) -> DepthField {
        self.interpolator.depths(&self.properties)
    }

    /// Water depth above each property's lowest floor, portfolio order.
    pub fn calculate_flood_depths(&self) -> Vec<f64> {
        self.depth_field().depths
    }

    /// Damage fraction in [0, 1] for each property at the given depths.
    pub fn calculate_direct_impacts(&self, depths: &[f64]) -> Result<Vec<f64>> {
        if depths.len() != self.properties.len() {
            return Err(FloodRiskError::input(
                "portfolio",
                "depths",
                format!("expected {} depths, got {}", self.properties.len(), depths.len()),
            ));
        }
        Ok(self.config.damage.impacts(&self.properties, depths))
    }

    fn depths_and_impacts(&self) -> (DepthField, Vec<f64>) {
        let field = self.depth_field();
        let impacts = self.config.damage.impacts(&self.properties, &field.depths);
        (field, impacts)
    }

    // ── Monte Carlo ──────────────────────────────────────────────────────────

    pub fn correlation_matrix(&self) -> CorrelationMatrix {
        CorrelationMatrix::for_properties(
            &self.properties,
            self.config.base_correlation,
            self.config.correlation_distance_m,
        )
    }

    /// The simulator over this portfolio's correlation factor, built once.
    pub fn simulator(&self) -> &PortfolioSimulator {
        self.simulator.get_or_init(|| {
            log::debug!("factoring {}x{} correlation matrix", self.properties.len(), self.properties.len());
            PortfolioSimulator::new(&self.correlation_matrix(), self.config.shock_factor, self.config.trial_batch_size)
        })
    }

    pub fn simulate_portfolio_impact(&self, n_trials: usize) -> Result<SimulationResult> {
        self.simulate_with_cancel(n_trials, self.config.seed, &AtomicBool::new(false))
    }

    /// Simulate under an explicit seed, checking `cancel` between trial
    /// batches. Depth warnings are carried onto the result.
    pub fn simulate_with_cancel(&self, n_trials: usize, seed: u64, cancel: &AtomicBool) -> Result<SimulationResult> {
        if n_trials == 0 {
            return Err(FloodRiskError::config("n_trials must be > 0"));
        }
        let (field, impacts) = self.depths_and_impacts();
        let values: Vec<f64> = self.properties.iter().map(|p| p.value).collect();
        let mut result = self.simulator().simulate_with_cancel(&values, &impacts, n_trials, seed, cancel)?;
        let mut warnings = field.warnings;
        warnings.append(&mut result.warnings);
        result.warnings = warnings;
        Ok(result)
    }

    /// Loss statistics for `runs` independent seeds `start_seed, start_seed + 1, ...`
    /// (wrapping), in seed order. Runs go in parallel over the shared factor.
    pub fn simulate_runs(&self, n_trials: usize, start_seed: u64, runs: u64) -> Result<Vec<LossStatistics>> {
        let never = AtomicBool::new(false);
        (0..runs)
            .into_par_iter()
            .map(|i| self.simulate_with_cancel(n_trials, start_seed.wrapping_add(i), &never).map(|r| r.statistics))
            .collect()
    }

    // ── Diagnostics ──────────────────────────────────────────────────────────

    pub fn analyze_spatial_concentration(&self) -> SpatialConcentration {
        let (field, impacts) = self.depths_and_impacts();
        metrics::spatial_concentration(&self.properties, &field.depths, &impacts, self.config.grid_size_m)
    }

    pub fn analyze_risk_clusters(&self, n_clusters: usize) -> Result<ClusterAnalysis> {
        let (field, impacts) = self.depths_and_impacts();
        cluster::risk_clusters(&self.properties, &field.depths, &impacts, n_clusters, self.config.seed)
    }

    /// Elbow choice of cluster count in `1..=max_k`.
    pub fn select_cluster_count(&self, max_k: usize) -> usize {
        let (field, impacts) = self.depths_and_impacts();
        cluster::select_cluster_count(&self.properties, &field.depths, &impacts, max_k, self.config.seed)
    }

    pub fn calculate_advanced_metrics(&self) -> AdvancedMetrics {
        let (field, impacts) = self.depths_and_impacts();
        metrics::advanced_metrics(&self.properties, &field.depths, &impacts, self.config.grid_size_m)
    }

    pub fn property_risk_details(&self) -> Vec<PropertyRiskDetail> {
        let (field, impacts) = self.depths_and_impacts();
        metrics::property_details(&self.properties, &field.depths, &impacts)
    }

    pub fn portfolio_summary(&self) -> PortfolioSummary {
        let (field, impacts) = self.depths_and_impacts();
        metrics::portfolio_summary(&self.properties, &field.depths, &impacts)
    }

    pub fn elevation_analysis(&self) -> Option<ElevationAnalysis> {
        metrics::elevation_analysis(&self.properties, &self.calculate_flood_depths())
    }

    /// Everything above in one pass. `n_clusters = None` picks the count by
    /// elbow over `1..=max_clusters`.
    pub fn assess(&self, n_trials: usize, n_clusters: Option<usize>, max_clusters: usize) -> Result<RiskReport> {
        let (field, impacts) = self.depths_and_impacts();
        let depths = &field.depths;
        let props = &self.properties;
        let seed = self.config.seed;

        let simulation = self.simulate_portfolio_impact(n_trials)?;
        let k = n_clusters.unwrap_or_else(|| cluster::select_cluster_count(props, depths, &impacts, max_clusters, seed));
        let clusters = cluster::risk_clusters(props, depths, &impacts, k.max(1), seed)?;

        Ok(RiskReport {
            depth_source: self.depth_source(),
            flood_event: self.flood_event().clone(),
            summary: metrics::portfolio_summary(props, depths, &impacts),
            advanced: metrics::advanced_metrics(props, depths, &impacts, self.config.grid_size_m),
            concentration: metrics::spatial_concentration(props, depths, &impacts, self.config.grid_size_m),
            clusters,
            elevation: metrics::elevation_analysis(props, depths),
            properties: metrics::property_details(props, depths, &impacts),
            warnings: simulation.warnings.clone(),
            simulation,
        })
    }
}

/// Full result of [`FloodRiskModel::assess`], ready for serialisation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskReport {
    pub depth_source: DepthSource,
    pub flood_event: FloodEvent,
    pub summary: PortfolioSummary,
    pub advanced: AdvancedMetrics,
    pub simulation: SimulationResult,
    pub concentration: SpatialConcentration,
    pub clusters: ClusterAnalysis,
    pub elevation: Option<ElevationAnalysis>,
    pub properties: Vec<PropertyRiskDetail>,
    pub warnings: Vec<ModelWarning>,
}

/// A portfolio document: properties plus either an explicit flood event or
/// gauge stations to derive one from.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelInput {
    pub properties: Vec<RawProperty>,
    pub flood_event: Option<FloodEvent>,
    pub gauges: Vec<RawGaugeReading>,
    pub stations: Vec<GaugeStation>,
}

impl ModelInput {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Validate every record and build the model. Without an explicit event
    /// the scenario is derived from `stations`.
    pub fn into_model(self, config: ModelConfig) -> Result<FloodRiskModel> {
        let properties = self.properties.into_iter().map(Property::try_from).collect::<Result<Vec<_>>>()?;
        let gauges = self.gauges.into_iter().map(GaugeReading::try_from).collect::<Result<Vec<_>>>()?;
        let event = match self.flood_event {
            Some(e) => e,
            None => scenario::event_from_stations(&self.stations),
        };
        FloodRiskModel::new(properties, event, gauges, config)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::types::BuildingType;

    fn riverside() -> Vec<Property> {
        vec![
            Property::new("P1", 51.5000, -0.1000, 300_000.0),
            Property::new("P2", 51.5010, -0.1000, 450_000.0).with_building_type(BuildingType::Commercial),
            Property::new("P3", 51.5050, -0.1020, 250_000.0).with_floor_height(0.5),
            Property::new("P4", 51.5300, -0.1000, 500_000.0),
        ]
    }

    fn model() -> FloodRiskModel {
        FloodRiskModel::new(riverside(), FloodEvent::single(51.5, -0.1, 1_000.0, 2.0), Vec::new(), ModelConfig::default())
            .unwrap()
    }

    #[test]
    fn depths_follow_radial_decay() {
        let d = model().calculate_flood_depths();
        assert_eq!(d[0], 2.0);
        assert!(d[1] > 0.0 && d[1] < 2.0);
        assert!(d[2] > 0.0);
        assert_eq!(d[3], 0.0);
    }

    #[test]
    fn impacts_are_fractions_and_zero_when_dry() {
        let m = model();
        let i = m.calculate_direct_impacts(&m.calculate_flood_depths()).unwrap();
        assert!(i.iter().all(|x| (0.0..=1.0).contains(x)));
        assert_eq!(i[3], 0.0);
        assert!(m.calculate_direct_impacts(&[1.0]).is_err());
    }

    #[test]
    fn simulation_is_seed_reproducible() {
        let m = model();
        let a = m.simulate_portfolio_impact(500).unwrap();
        let b = m.simulate_portfolio_impact(500).unwrap();
        assert_eq!(a.trial_losses, b.trial_losses);
        assert!(a.es_95() >= a.var_95());
        assert!(a.max() <= m.total_value());
    }

    #[test]
    fn seeds_share_one_correlation_factor() {
        let m = model();
        let first: *const PortfolioSimulator = m.simulator();
        let a = m.simulate_with_cancel(300, 1, &AtomicBool::new(false)).unwrap();
        let b = m.simulate_with_cancel(300, 2, &AtomicBool::new(false)).unwrap();
        assert!(std::ptr::eq(first, m.simulator()));
        assert!(m.simulator().is_correlated());
        assert_eq!(m.simulator().dim(), 4);
        assert_ne!(a.trial_losses, b.trial_losses);
    }

    #[test]
    fn runs_follow_consecutive_seeds() {
        let m = model();
        let runs = m.simulate_runs(200, 7, 3).unwrap();
        assert_eq!(runs.len(), 3);
        let second = m.simulate_with_cancel(200, 8, &AtomicBool::new(false)).unwrap();
        assert_eq!(runs[1], second.statistics);
    }

    #[test]
    fn run_seeds_wrap_at_the_top_of_the_range() {
        let m = model();
        let runs = m.simulate_runs(100, u64::MAX, 2).unwrap();
        let wrapped = m.simulate_with_cancel(100, 0, &AtomicBool::new(false)).unwrap();
        assert_eq!(runs[1], wrapped.statistics);
        assert!(m.simulate_runs(0, 1, 2).is_err());
    }

    #[test]
    fn zero_shock_matches_deterministic_expected_loss() {
        let config = ModelConfig { shock_factor: 0.0, ..ModelConfig::default() };
        let m = FloodRiskModel::new(riverside(), FloodEvent::single(51.5, -0.1, 1_000.0, 2.0), Vec::new(), config)
            .unwrap();
        let r = m.simulate_portfolio_impact(100).unwrap();
        assert!(r.trial_losses.iter().all(|l| *l == r.expected_loss));
        assert_relative_eq!(r.expected_loss, m.calculate_advanced_metrics().expected_loss, max_relative = 1e-12);
    }

    #[test]
    fn empty_portfolio_is_well_defined() {
        let m = FloodRiskModel::new(Vec::new(), FloodEvent::single(51.5, -0.1, 1_000.0, 2.0), Vec::new(), ModelConfig::default())
            .unwrap();
        assert!(m.calculate_flood_depths().is_empty());
        let r = m.simulate_portfolio_impact(10).unwrap();
        assert_eq!(r.trial_losses, vec![0.0; 10]);
        assert_eq!(m.analyze_spatial_concentration(), SpatialConcentration::default());
        assert!(m.analyze_risk_clusters(3).unwrap().clusters.is_empty());
        assert_eq!(m.portfolio_summary(), PortfolioSummary::default());
    }

    #[test]
    fn invalid_inputs_fail_fast() {
        let bad_radius = FloodEvent::single(51.5, -0.1, -5.0, 2.0);
        assert!(matches!(
            FloodRiskModel::new(riverside(), bad_radius, Vec::new(), ModelConfig::default()),
            Err(FloodRiskError::Configuration(_))
        ));
        let bad_config = ModelConfig { correlation_distance_m: 0.0, ..ModelConfig::default() };
        assert!(FloodRiskModel::new(riverside(), FloodEvent::single(51.5, -0.1, 1.0, 1.0), Vec::new(), bad_config).is_err());
        let mut props = riverside();
        props[0].value = f64::NAN;
        assert!(matches!(
            FloodRiskModel::new(props, FloodEvent::single(51.5, -0.1, 1.0, 1.0), Vec::new(), ModelConfig::default()),
            Err(FloodRiskError::Input { .. })
        ));
        assert!(matches!(model().simulate_portfolio_impact(0), Err(FloodRiskError::Configuration(_))));
    }

    #[test]
    fn gauges_switch_the_depth_source() {
        let gauges = vec![GaugeReading::new("G1", 51.5005, -0.1, 1.0)];
        let m = FloodRiskModel::new(riverside(), FloodEvent::single(51.5, -0.1, 1_000.0, 2.0), gauges, ModelConfig::default())
            .unwrap();
        assert_eq!(m.depth_source(), DepthSource::GaugeInterpolated);
        let field = m.depth_field();
        // P4 is ~3.3 km from the gauge, inside the 5 km search radius.
        assert_eq!(field.sources, vec![DepthSource::GaugeInterpolated; 4]);
        assert_eq!(field.depths[0], 1.0);
        assert_eq!(field.depths[2], 0.5);
    }

    #[test]
    fn assess_bundles_every_view() {
        let r = model().assess(200, None, 3).unwrap();
        assert_eq!(r.properties.len(), 4);
        assert_eq!(r.simulation.trial_losses.len(), 200);
        assert!(!r.clusters.clusters.is_empty());
        assert!(r.elevation.is_none());
        assert_eq!(r.depth_source, DepthSource::Radial);
        assert_relative_eq!(r.summary.total_value, 1_500_000.0);
    }

    #[test]
    fn input_document_without_event_uses_stations() {
        let doc = r#"{
            "properties": [
                {"property_id": "A", "latitude": 51.5, "longitude": -0.1, "value": 200000, "property_type": "Commercial"},
                {"id": "B", "latitude": 51.52, "longitude": -0.1, "value": 150000, "floor_level_metres": 0.3}
            ],
            "stations": [
                {"gauge_id": "G1", "gauge_latitude": 51.5, "gauge_longitude": -0.1,
                 "flood_alert": 1.0, "severe_flood_warning": 4.0, "readings": [0.8, 2.0]}
            ]
        }"#;
        let m = ModelInput::from_json_str(doc).unwrap().into_model(ModelConfig::default()).unwrap();
        assert_eq!(m.flood_event().centers.len(), 1);
        assert_eq!(m.flood_event().centers[0].radius_m, 3_800.0);
        assert_eq!(m.properties()[0].building_type, BuildingType::Commercial);
        assert_eq!(m.properties()[1].floor_height, 0.3);
    }

    #[test]
    fn input_document_accepts_a_bare_event_descriptor() {
        let doc = r#"{
            "properties": [{"id": "A", "latitude": 51.5, "longitude": -0.1, "value": 100000}],
            "flood_event": {"center_lat": 51.5, "center_lon": -0.1, "radius": 1000, "max_depth": 2.0}
        }"#;
        let m = ModelInput::from_json_str(doc).unwrap().into_model(ModelConfig::default()).unwrap();
        assert_eq!(m.flood_event(), &FloodEvent::single(51.5, -0.1, 1_000.0, 2.0));
        assert_eq!(m.calculate_flood_depths(), vec![2.0]);
    }

    #[test]
    fn input_document_reports_non_numeric_value_as_input_error() {
        let doc = r#"{"properties": [{"id": "A", "latitude": 51.5, "longitude": -0.1, "value": "lots"}]}"#;
        let err = ModelInput::from_json_str(doc).unwrap().into_model(ModelConfig::default()).unwrap_err();
        assert!(matches!(err, FloodRiskError::Input { field: "value", .. }), "{err}");
    }

    #[test]
    fn input_document_rejects_missing_coordinates() {
        let doc = r#"{"properties": [{"id": "A", "value": 1.0, "longitude": 0.0}]}"#;
        let err = ModelInput::from_json_str(doc).unwrap().into_model(ModelConfig::default()).unwrap_err();
        assert!(matches!(err, FloodRiskError::Input { field: "latitude", .. }));
    }
}
