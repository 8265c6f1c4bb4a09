//! Pure summary functions over simulated losses and per-property impacts.
//!
//! All monetary figures are in the portfolio's currency. Ratios to total
//! portfolio value are exposed separately where reports want them.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::portfolio::Property;
use crate::types::{METRES_PER_DEGREE, PropertyId};

/// Linear-interpolated percentile of an ascending slice, `p` in [0, 1].
/// Zero for an empty slice.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let h = p.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = h - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

fn sorted_copy(losses: &[f64]) -> Vec<f64> {
    let mut v = losses.to_vec();
    v.sort_by(f64::total_cmp);
    v
}

/// Loss not exceeded with probability `confidence` (0.95 → 95th percentile).
pub fn value_at_risk(losses: &[f64], confidence: f64) -> f64 {
    percentile_sorted(&sorted_copy(losses), confidence)
}

/// Mean of the losses at or above `value_at_risk(confidence)`. Never below
/// the VaR itself.
pub fn expected_shortfall(losses: &[f64], confidence: f64) -> f64 {
    let sorted = sorted_copy(losses);
    expected_shortfall_sorted(&sorted, percentile_sorted(&sorted, confidence))
}

fn expected_shortfall_sorted(sorted: &[f64], var: f64) -> f64 {
    let start = sorted.partition_point(|&x| x < var);
    let tail = &sorted[start..];
    if tail.is_empty() {
        // Only reachable on an empty slice; the max is always >= VaR.
        return var;
    }
    (tail.iter().sum::<f64>() / tail.len() as f64).max(var)
}

/// Distribution summary of per-trial portfolio losses.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LossStatistics {
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub var_95: f64,
    pub var_99: f64,
    pub es_95: f64,
    pub es_99: f64,
}

impl LossStatistics {
    pub fn from_losses(losses: &[f64]) -> Self {
        if losses.is_empty() {
            return LossStatistics::default();
        }
        let sorted = sorted_copy(losses);
        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        // Population std, matching the per-run figures reports compare to.
        let variance = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        let var_95 = percentile_sorted(&sorted, 0.95);
        let var_99 = percentile_sorted(&sorted, 0.99);
        LossStatistics {
            n,
            mean,
            std_dev: variance.sqrt(),
            min: sorted[0],
            max: sorted[n - 1],
            var_95,
            var_99,
            es_95: expected_shortfall_sorted(&sorted, var_95),
            es_99: expected_shortfall_sorted(&sorted, var_99),
        }
    }
}

/// Herfindahl-Hirschman index of `values`: Σ share². Zero when the total is
/// not positive.
pub fn hhi(values: &[f64]) -> f64 {
    let total: f64 = values.iter().sum();
    if !(total > 0.0) {
        return 0.0;
    }
    values.iter().map(|v| (v / total).powi(2)).sum()
}

// ── Grid concentration ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridCell {
    /// `"{x}_{y}"` cell offsets from the portfolio's south-west corner.
    pub cell_id: String,
    pub property_count: usize,
    pub total_value: f64,
    pub mean_depth: f64,
    pub mean_impact: f64,
    /// Σ value × impact over the cell.
    pub value_at_risk: f64,
    /// Squared share of portfolio value at risk held by this cell.
    pub concentration_index: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpatialConcentration {
    /// HHI of cell shares of total property value.
    pub geographic_hhi: f64,
    /// HHI of cell shares of expected loss.
    pub impact_hhi: f64,
    pub grid_cells: Vec<GridCell>,
}

#[derive(Default)]
struct CellAcc {
    count: usize,
    value: f64,
    depth: f64,
    impact: f64,
    var: f64,
}

/// Bucket properties into square cells of `grid_size_m` (degree-scaled) and
/// measure how concentrated value and expected loss are across them.
pub fn spatial_concentration(
    properties: &[Property],
    depths: &[f64],
    impacts: &[f64],
    grid_size_m: f64,
) -> SpatialConcentration {
    if properties.is_empty() {
        return SpatialConcentration::default();
    }
    let min_lon = properties.iter().map(|p| p.location.lon).fold(f64::INFINITY, f64::min);
    let min_lat = properties.iter().map(|p| p.location.lat).fold(f64::INFINITY, f64::min);
    let cell_deg = grid_size_m / METRES_PER_DEGREE;

    let mut cells: BTreeMap<(i64, i64), CellAcc> = BTreeMap::new();
    for ((p, &d), &i) in properties.iter().zip(depths).zip(impacts) {
        let x = ((p.location.lon - min_lon) / cell_deg).floor() as i64;
        let y = ((p.location.lat - min_lat) / cell_deg).floor() as i64;
        let acc = cells.entry((x, y)).or_default();
        acc.count += 1;
        acc.value += p.value;
        acc.depth += d;
        acc.impact += i;
        acc.var += p.value * i;
    }

    let values: Vec<f64> = cells.values().map(|c| c.value).collect();
    let losses: Vec<f64> = cells.values().map(|c| c.var).collect();
    let total_var: f64 = losses.iter().sum();

    let grid_cells = cells
        .into_iter()
        .map(|((x, y), c)| GridCell {
            cell_id: format!("{x}_{y}"),
            property_count: c.count,
            total_value: c.value,
            mean_depth: c.depth / c.count as f64,
            mean_impact: c.impact / c.count as f64,
            value_at_risk: c.var,
            concentration_index: if total_var > 0.0 { (c.var / total_var).powi(2) } else { 0.0 },
        })
        .collect();

    SpatialConcentration { geographic_hhi: hhi(&values), impact_hhi: hhi(&losses), grid_cells }
}

// ── Per-property and portfolio summaries ─────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// High > 0.6, Medium > 0.3, Low > 0.1, else Minimal.
    pub fn from_impact(impact: f64) -> Self {
        if impact > 0.6 {
            RiskLevel::High
        } else if impact > 0.3 {
            RiskLevel::Medium
        } else if impact > 0.1 {
            RiskLevel::Low
        } else {
            RiskLevel::Minimal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyRiskDetail {
    pub property_id: PropertyId,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    pub property_value: f64,
    pub flood_depth: f64,
    pub impact_ratio: f64,
    pub value_at_risk: f64,
    pub risk_level: RiskLevel,
}

pub fn property_details(properties: &[Property], depths: &[f64], impacts: &[f64]) -> Vec<PropertyRiskDetail> {
    properties
        .iter()
        .zip(depths)
        .zip(impacts)
        .map(|((p, &d), &i)| PropertyRiskDetail {
            property_id: p.id.clone(),
            latitude: p.location.lat,
            longitude: p.location.lon,
            elevation: p.elevation,
            property_value: p.value,
            flood_depth: d,
            impact_ratio: i,
            value_at_risk: p.value * i,
            risk_level: RiskLevel::from_impact(i),
        })
        .collect()
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() { 0.0 } else { xs.iter().sum::<f64>() / xs.len() as f64 }
}

fn max_or_zero(xs: &[f64]) -> f64 {
    xs.iter().copied().fold(0.0, f64::max)
}

fn pct(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { part / whole * 100.0 } else { 0.0 }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub total_properties: usize,
    /// Properties with impact above 0.1.
    pub properties_at_risk: usize,
    pub percentage_at_risk: f64,
    pub total_value: f64,
    pub value_at_risk: f64,
    pub percentage_value_at_risk: f64,
    pub average_flood_depth: f64,
    pub max_flood_depth: f64,
    pub average_impact_ratio: f64,
}

pub fn portfolio_summary(properties: &[Property], depths: &[f64], impacts: &[f64]) -> PortfolioSummary {
    let total_value: f64 = properties.iter().map(|p| p.value).sum();
    let value_at_risk: f64 = properties.iter().zip(impacts).map(|(p, i)| p.value * i).sum();
    let at_risk = impacts.iter().filter(|&&i| i > 0.1).count();
    PortfolioSummary {
        total_properties: properties.len(),
        properties_at_risk: at_risk,
        percentage_at_risk: pct(at_risk as f64, properties.len() as f64),
        total_value,
        value_at_risk,
        percentage_value_at_risk: pct(value_at_risk, total_value),
        average_flood_depth: mean(depths),
        max_flood_depth: max_or_zero(depths),
        average_impact_ratio: mean(impacts),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdvancedMetrics {
    pub total_portfolio_value: f64,
    /// Value of properties with any damage at all.
    pub total_value_exposed: f64,
    pub expected_loss: f64,
    pub expected_loss_ratio: f64,
    pub max_single_property_loss: f64,
    /// HHI over per-property expected losses.
    pub concentration_hhi: f64,
    /// Impact HHI over grid cells.
    pub geographic_concentration: f64,
    pub high_risk_properties: usize,
    pub medium_risk_properties: usize,
    pub low_risk_properties: usize,
    pub average_flood_depth: f64,
    pub max_flood_depth: f64,
    pub properties_with_flooding: usize,
    pub percentage_flooded: f64,
}

pub fn advanced_metrics(
    properties: &[Property],
    depths: &[f64],
    impacts: &[f64],
    grid_size_m: f64,
) -> AdvancedMetrics {
    let losses: Vec<f64> = properties.iter().zip(impacts).map(|(p, i)| p.value * i).collect();
    let total: f64 = properties.iter().map(|p| p.value).sum();
    let expected_loss: f64 = losses.iter().sum();
    let count = |lvl: RiskLevel| impacts.iter().filter(|&&i| RiskLevel::from_impact(i) == lvl).count();
    let flooded = depths.iter().filter(|&&d| d > 0.0).count();

    AdvancedMetrics {
        total_portfolio_value: total,
        total_value_exposed: properties.iter().zip(impacts).filter(|(_, i)| **i > 0.0).map(|(p, _)| p.value).sum(),
        expected_loss,
        expected_loss_ratio: if total > 0.0 { expected_loss / total } else { 0.0 },
        max_single_property_loss: max_or_zero(&losses),
        concentration_hhi: hhi(&losses),
        geographic_concentration: spatial_concentration(properties, depths, impacts, grid_size_m).impact_hhi,
        high_risk_properties: count(RiskLevel::High),
        medium_risk_properties: count(RiskLevel::Medium),
        low_risk_properties: count(RiskLevel::Low),
        average_flood_depth: mean(depths),
        max_flood_depth: max_or_zero(depths),
        properties_with_flooding: flooded,
        percentage_flooded: pct(flooded as f64, depths.len() as f64),
    }
}

// ── Cross-seed distributions ─────────────────────────────────────────────────

/// Spread of one statistic across independent runs. Sample std (n - 1).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistStats {
    pub n: usize,
    pub min: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl DistStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let sorted = sorted_copy(values);
        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let variance =
            if n > 1 { sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64 } else { 0.0 };
        Some(DistStats {
            n,
            min: sorted[0],
            p5: percentile_sorted(&sorted, 0.05),
            p25: percentile_sorted(&sorted, 0.25),
            p50: percentile_sorted(&sorted, 0.50),
            p75: percentile_sorted(&sorted, 0.75),
            p95: percentile_sorted(&sorted, 0.95),
            max: sorted[n - 1],
            mean,
            std_dev: variance.sqrt(),
        })
    }

    /// Sample std over mean; how much a single run's figure depends on its
    /// seed. Zero for a zero mean.
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean != 0.0 { self.std_dev / self.mean.abs() } else { 0.0 }
    }
}

/// Per-run loss statistics summarised across seeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunDistribution {
    pub runs: usize,
    pub mean: DistStats,
    pub var_95: DistStats,
    pub es_95: DistStats,
    pub var_99: DistStats,
    pub es_99: DistStats,
}

impl RunDistribution {
    /// `None` for fewer than two runs.
    pub fn from_runs(runs: &[LossStatistics]) -> Option<Self> {
        if runs.len() < 2 {
            return None;
        }
        let pick = |f: fn(&LossStatistics) -> f64| DistStats::from_values(&runs.iter().map(f).collect::<Vec<_>>());
        Some(RunDistribution {
            runs: runs.len(),
            mean: pick(|s| s.mean)?,
            var_95: pick(|s| s.var_95)?,
            es_95: pick(|s| s.es_95)?,
            var_99: pick(|s| s.var_99)?,
            es_99: pick(|s| s.es_99)?,
        })
    }
}

// ── Elevation bands ──────────────────────────────────────────────────────────

const ELEVATION_BANDS: [(f64, f64, &str); 5] = [
    (0.0, 10.0, "Very Low"),
    (10.0, 15.0, "Low"),
    (15.0, 20.0, "Medium"),
    (20.0, 30.0, "High"),
    (30.0, 50.0, "Very High"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElevationBand {
    pub label: String,
    pub properties: usize,
    pub flooded: usize,
    pub flood_rate: f64,
    pub avg_flood_depth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElevationAnalysis {
    /// Pearson correlation of ground elevation against flood depth.
    pub elevation_correlation: f64,
    pub min_elevation: f64,
    pub max_elevation: f64,
    pub mean_elevation: f64,
    pub bands: Vec<ElevationBand>,
}

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let (mx, my) = (mean(xs), mean(ys));
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    if sxx > 0.0 && syy > 0.0 { sxy / (sxx * syy).sqrt() } else { 0.0 }
}

/// Flood incidence by ground-elevation band. `None` unless every property
/// carries an elevation.
pub fn elevation_analysis(properties: &[Property], depths: &[f64]) -> Option<ElevationAnalysis> {
    let elevations: Option<Vec<f64>> = properties.iter().map(|p| p.elevation).collect();
    let elevations = elevations.filter(|e| !e.is_empty())?;

    let bands = ELEVATION_BANDS
        .iter()
        .filter_map(|&(lo, hi, label)| {
            let in_band: Vec<f64> = elevations
                .iter()
                .zip(depths)
                .filter(|(e, _)| **e >= lo && **e < hi)
                .map(|(_, d)| *d)
                .collect();
            if in_band.is_empty() {
                return None;
            }
            let flooded: Vec<f64> = in_band.iter().copied().filter(|d| *d > 0.0).collect();
            Some(ElevationBand {
                label: format!("{lo}-{hi}m ({label})"),
                properties: in_band.len(),
                flooded: flooded.len(),
                flood_rate: pct(flooded.len() as f64, in_band.len() as f64),
                avg_flood_depth: mean(&flooded),
            })
        })
        .collect();

    Some(ElevationAnalysis {
        elevation_correlation: pearson(&elevations, depths),
        min_elevation: elevations.iter().copied().fold(f64::INFINITY, f64::min),
        max_elevation: elevations.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean_elevation: mean(&elevations),
        bands,
    })
}
