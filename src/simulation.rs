//! Monte Carlo portfolio loss under spatially correlated shocks.
//!
//! Each trial draws `w = L z` with `z` i.i.d. standard normal and `L` the
//! Cholesky factor of the correlation matrix, perturbs every property's
//! impact to `clamp(i * (1 + shock_factor * w), 0, 1)` and sums
//! `value * impact` over the portfolio.
//!
//! Trials are split into fixed-size batches run on rayon. Batch `b` draws
//! from its own ChaCha20 stream `b` under the run seed, so the loss vector
//! depends only on `(seed, batch_size, n_trials)` and never on thread count.
//!
//! The factor is computed once per simulator; the seed is supplied per run,
//! so one simulator serves any number of seeds over the same portfolio.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::Serialize;

use crate::correlation::{CholeskyFactor, CorrelationMatrix};
use crate::error::{FloodRiskError, ModelWarning, Result};
use crate::metrics::LossStatistics;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationResult {
    pub statistics: LossStatistics,
    /// Sum of property values.
    pub total_value: f64,
    /// Unshocked loss `Σ value * impact`.
    pub expected_loss: f64,
    /// Portfolio loss per trial, in trial order.
    pub trial_losses: Vec<f64>,
    pub warnings: Vec<ModelWarning>,
}

impl SimulationResult {
    pub fn mean(&self) -> f64 {
        self.statistics.mean
    }

    pub fn var_95(&self) -> f64 {
        self.statistics.var_95
    }

    pub fn es_95(&self) -> f64 {
        self.statistics.es_95
    }

    pub fn max(&self) -> f64 {
        self.statistics.max
    }

    fn ratio(&self, x: f64) -> f64 {
        if self.total_value > 0.0 { x / self.total_value } else { 0.0 }
    }

    pub fn mean_ratio(&self) -> f64 {
        self.ratio(self.statistics.mean)
    }

    pub fn var_95_ratio(&self) -> f64 {
        self.ratio(self.statistics.var_95)
    }

    pub fn es_95_ratio(&self) -> f64 {
        self.ratio(self.statistics.es_95)
    }

    pub fn var_99_ratio(&self) -> f64 {
        self.ratio(self.statistics.var_99)
    }

    pub fn es_99_ratio(&self) -> f64 {
        self.ratio(self.statistics.es_99)
    }
}

#[derive(Debug, Clone)]
enum Shocks {
    Independent,
    Correlated(CholeskyFactor),
}

#[derive(Debug, Clone)]
pub struct PortfolioSimulator {
    shocks: Shocks,
    dim: usize,
    shock_factor: f64,
    batch_size: usize,
    warnings: Vec<ModelWarning>,
}

impl PortfolioSimulator {
    /// Factor `correlation` up front. A matrix that is not positive definite
    /// downgrades to independent shocks and records a `CholeskyFallback`.
    pub fn new(correlation: &CorrelationMatrix, shock_factor: f64, batch_size: usize) -> Self {
        let dim = correlation.dim();
        let mut warnings = Vec::new();
        let shocks = if dim <= 1 {
            Shocks::Independent
        } else {
            match correlation.cholesky() {
                Some(l) => Shocks::Correlated(l),
                None => {
                    log::debug!("cholesky failed for {dim}x{dim} correlation; drawing independent shocks");
                    warnings.push(ModelWarning::CholeskyFallback { dimension: dim });
                    Shocks::Independent
                }
            }
        };
        PortfolioSimulator { shocks, dim, shock_factor, batch_size: batch_size.max(1), warnings }
    }

    pub fn is_correlated(&self) -> bool {
        matches!(self.shocks, Shocks::Correlated(_))
    }

    pub fn warnings(&self) -> &[ModelWarning] {
        &self.warnings
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn simulate(&self, values: &[f64], impacts: &[f64], n_trials: usize, seed: u64) -> Result<SimulationResult> {
        self.simulate_with_cancel(values, impacts, n_trials, seed, &AtomicBool::new(false))
    }

    /// As [`simulate`](Self::simulate), checking `cancel` before each batch.
    /// Returns `Cancelled` with the number of trials finished if it was set.
    pub fn simulate_with_cancel(
        &self,
        values: &[f64],
        impacts: &[f64],
        n_trials: usize,
        seed: u64,
        cancel: &AtomicBool,
    ) -> Result<SimulationResult> {
        if n_trials == 0 {
            return Err(FloodRiskError::config("n_trials must be > 0"));
        }
        if values.len() != self.dim || impacts.len() != self.dim {
            return Err(FloodRiskError::input(
                "portfolio",
                "impacts",
                format!(
                    "expected {} values and impacts, got {} and {}",
                    self.dim,
                    values.len(),
                    impacts.len()
                ),
            ));
        }

        let n_batches = n_trials.div_ceil(self.batch_size);
        let completed = AtomicUsize::new(0);
        let batches: Option<Vec<Vec<f64>>> = (0..n_batches)
            .into_par_iter()
            .map(|b| {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                let len = self.batch_size.min(n_trials - b * self.batch_size);
                let losses = self.run_batch(seed, b as u64, len, values, impacts);
                completed.fetch_add(len, Ordering::Relaxed);
                Some(losses)
            })
            .collect();

        let Some(batches) = batches else {
            return Err(FloodRiskError::Cancelled { completed_trials: completed.load(Ordering::Relaxed) });
        };
        let trial_losses: Vec<f64> = batches.into_iter().flatten().collect();

        let result = SimulationResult {
            statistics: LossStatistics::from_losses(&trial_losses),
            total_value: values.iter().sum(),
            expected_loss: values.iter().zip(impacts).map(|(v, i)| v * i).sum(),
            trial_losses,
            warnings: self.warnings.clone(),
        };
        log::debug!(
            "simulated {n_trials} trials over {} properties: mean {:.2}, var95 {:.2}",
            self.dim,
            result.statistics.mean,
            result.statistics.var_95
        );
        Ok(result)
    }

    fn run_batch(&self, seed: u64, batch: u64, len: usize, values: &[f64], impacts: &[f64]) -> Vec<f64> {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        rng.set_stream(batch);
        let mut z = vec![0.0; self.dim];
        let mut w = vec![0.0; self.dim];
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            for zi in z.iter_mut() {
                *zi = rng.sample(StandardNormal);
            }
            let shocks = match &self.shocks {
                Shocks::Correlated(l) => {
                    l.transform_into(&z, &mut w);
                    &w
                }
                Shocks::Independent => &z,
            };
            let loss: f64 = values
                .iter()
                .zip(impacts)
                .zip(shocks)
                .map(|((v, i), s)| v * (i * (1.0 + self.shock_factor * s)).clamp(0.0, 1.0))
                .sum();
            out.push(loss);
        }
        out
    }
}
