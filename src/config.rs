use serde::{Deserialize, Serialize};

use crate::damage::DamageFunction;
use crate::error::{FloodRiskError, Result};

/// Every tunable of a model run. Deserialises from a partial JSON document;
/// missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Correlation between two co-located properties, (0, 1].
    pub base_correlation: f64,
    /// e-folding distance of the correlation kernel, metres.
    pub correlation_distance_m: f64,
    /// Scale of the per-trial multiplicative shock on each impact fraction.
    pub shock_factor: f64,
    pub n_trials: usize,
    pub seed: u64,
    /// Trials drawn per RNG stream; also the cancellation granularity.
    pub trial_batch_size: usize,
    /// Gauges considered per property (k of the k-nearest search).
    pub gauge_neighbours: usize,
    pub max_gauge_distance_m: f64,
    /// Edge of a concentration grid cell, metres.
    pub grid_size_m: f64,
    pub damage: DamageFunction,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            base_correlation: 0.4,
            correlation_distance_m: 1_000.0,
            shock_factor: 0.2,
            n_trials: 1_000,
            seed: 42,
            trial_batch_size: 250,
            gauge_neighbours: 5,
            max_gauge_distance_m: 5_000.0,
            grid_size_m: 1_000.0,
            damage: DamageFunction::default(),
        }
    }
}

impl ModelConfig {
    /// Reject parameters outside their domain before anything runs.
    pub fn validate(&self) -> Result<()> {
        let b = self.base_correlation;
        if !(b > 0.0 && b <= 1.0) {
            return Err(FloodRiskError::config(format!("base_correlation must lie in (0, 1], got {b}")));
        }
        if !(self.correlation_distance_m > 0.0) || !self.correlation_distance_m.is_finite() {
            return Err(FloodRiskError::config(format!(
                "correlation_distance_m must be > 0, got {}",
                self.correlation_distance_m
            )));
        }
        if !(self.shock_factor >= 0.0) || !self.shock_factor.is_finite() {
            return Err(FloodRiskError::config(format!("shock_factor must be >= 0, got {}", self.shock_factor)));
        }
        if self.n_trials == 0 {
            return Err(FloodRiskError::config("n_trials must be > 0"));
        }
        if self.trial_batch_size == 0 {
            return Err(FloodRiskError::config("trial_batch_size must be > 0"));
        }
        if self.gauge_neighbours == 0 {
            return Err(FloodRiskError::config("gauge_neighbours must be > 0"));
        }
        if !(self.max_gauge_distance_m > 0.0) {
            return Err(FloodRiskError::config(format!(
                "max_gauge_distance_m must be > 0, got {}",
                self.max_gauge_distance_m
            )));
        }
        if !(self.grid_size_m > 0.0) || !self.grid_size_m.is_finite() {
            return Err(FloodRiskError::config(format!("grid_size_m must be > 0, got {}", self.grid_size_m)));
        }
        self.damage.validate()
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: ModelConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::damage::DamageModel;

    #[test]
    fn defaults_are_valid() {
        assert!(ModelConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = ModelConfig::from_json_str(r#"{"n_trials": 500, "damage": {"model": {"kind": "curve", "points": [[0,0],[1,0.5],[3,1]]}}}"#)
            .unwrap();
        assert_eq!(c.n_trials, 500);
        assert_eq!(c.base_correlation, 0.4);
        assert!(matches!(c.damage.model, DamageModel::Curve { .. }));
        assert_eq!(c.damage.multiplier(&crate::types::BuildingType::Commercial), 1.2);
    }

    #[test]
    fn invalid_parameters_are_configuration_errors() {
        let cases: Vec<fn(&mut ModelConfig)> = vec![
            |c| c.base_correlation = 0.0,
            |c| c.base_correlation = 1.5,
            |c| c.correlation_distance_m = 0.0,
            |c| c.correlation_distance_m = -10.0,
            |c| c.n_trials = 0,
            |c| c.shock_factor = -0.1,
            |c| c.grid_size_m = 0.0,
            |c| c.gauge_neighbours = 0,
            |c| c.damage.model = DamageModel::Tanh { alpha: -1.0 },
        ];
        for mutate in cases {
            let mut c = ModelConfig::default();
            mutate(&mut c);
            assert!(matches!(c.validate(), Err(FloodRiskError::Configuration(_))), "{c:?}");
        }
    }
}
