//! Depth-damage functions: flood depth above the lowest floor → fractional
//! loss of property value, always in [0, 1].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FloodRiskError, Result};
use crate::portfolio::Property;
use crate::types::BuildingType;

/// Published flood-discount baseline for the tanh model.
pub const DEFAULT_ALPHA: f64 = 0.08;

/// Calibration-table curve used by the `Curve` model when none is supplied.
pub const DEFAULT_CURVE: [(f64, f64); 6] =
    [(0.0, 0.0), (0.5, 0.25), (1.0, 0.40), (2.0, 0.60), (4.0, 0.85), (6.0, 1.00)];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DamageModel {
    /// `alpha * (1 + tanh(depth))`.
    Tanh { alpha: f64 },
    /// Piecewise-linear interpolation over `(depth_m, damage_factor)` control
    /// points. Depths below the first point give 0, above the last give the
    /// last factor.
    Curve { points: Vec<(f64, f64)> },
}

impl Default for DamageModel {
    fn default() -> Self {
        DamageModel::Tanh { alpha: DEFAULT_ALPHA }
    }
}

impl DamageModel {
    pub fn default_curve() -> Self {
        DamageModel::Curve { points: DEFAULT_CURVE.to_vec() }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            DamageModel::Tanh { alpha } => {
                if !alpha.is_finite() || *alpha < 0.0 {
                    return Err(FloodRiskError::config(format!("damage alpha must be >= 0, got {alpha}")));
                }
            }
            DamageModel::Curve { points } => {
                if points.len() < 2 {
                    return Err(FloodRiskError::config("damage curve needs at least two points"));
                }
                for w in points.windows(2) {
                    if !(w[1].0 > w[0].0) {
                        return Err(FloodRiskError::config(format!(
                            "damage curve depths must be strictly increasing ({} then {})",
                            w[0].0, w[1].0
                        )));
                    }
                }
                if let Some(&(d, f)) = points.iter().find(|(_, f)| !(0.0..=1.0).contains(f)) {
                    return Err(FloodRiskError::config(format!(
                        "damage factor at depth {d} must lie in [0, 1], got {f}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Unadjusted damage fraction for a depth in metres. Zero for depth ≤ 0.
    pub fn base_loss(&self, depth: f64) -> f64 {
        if !(depth > 0.0) {
            return 0.0;
        }
        match self {
            DamageModel::Tanh { alpha } => alpha * (1.0 + depth.tanh()),
            DamageModel::Curve { points } => interpolate(points, depth),
        }
    }
}

fn interpolate(points: &[(f64, f64)], x: f64) -> f64 {
    let (first, last) = match (points.first(), points.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return 0.0,
    };
    if x <= first.0 {
        return 0.0;
    }
    if x >= last.0 {
        return last.1;
    }
    // First point with depth >= x; guaranteed to exist and be > 0.
    let i = points.partition_point(|&(d, _)| d < x);
    let (x0, y0) = points[i - 1];
    let (x1, y1) = points[i];
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// Damage model plus per-building-type multipliers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageFunction {
    pub model: DamageModel,
    /// Keyed by lower-case building type. Types not present use 1.0.
    pub building_multipliers: BTreeMap<String, f64>,
}

impl Default for DamageFunction {
    fn default() -> Self {
        DamageFunction {
            model: DamageModel::default(),
            building_multipliers: BTreeMap::from([
                ("residential".to_string(), 1.0),
                ("commercial".to_string(), 1.2),
                ("industrial".to_string(), 0.9),
            ]),
        }
    }
}

impl DamageFunction {
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        for (k, m) in &self.building_multipliers {
            if !m.is_finite() || *m < 0.0 {
                return Err(FloodRiskError::config(format!("building multiplier for {k} must be >= 0, got {m}")));
            }
        }
        Ok(())
    }

    pub fn multiplier(&self, building_type: &BuildingType) -> f64 {
        self.building_multipliers.get(building_type.as_str()).copied().unwrap_or(1.0)
    }

    /// Fractional value loss for a depth already measured relative to the
    /// property's floor.
    pub fn loss_fraction(&self, depth: f64, building_type: &BuildingType) -> f64 {
        if !(depth > 0.0) {
            return 0.0;
        }
        (self.model.base_loss(depth) * self.multiplier(building_type)).clamp(0.0, 1.0)
    }

    /// Impact fraction for every property, index-aligned with `depths`.
    pub fn impacts(&self, properties: &[Property], depths: &[f64]) -> Vec<f64> {
        properties
            .iter()
            .zip(depths)
            .map(|(p, &d)| self.loss_fraction(d, &p.building_type))
            .collect()
    }
}
