//! Spatial correlation between properties.
//!
//! `C[i][j] = base * exp(-d_ij / correlation_distance)` with `d_ij` the
//! planar degree distance scaled to metres, and `C[i][i] = 1`. Equivalently
//! `C = base * K + (1 - base) * I` for the exponential kernel `K`, which is
//! positive definite for distinct points whenever `base < 1`. Coincident
//! properties with `base = 1` make it singular; the simulator then falls back
//! to independent shocks.

use crate::portfolio::Property;
use crate::types::GeoPoint;

/// Dense symmetric matrix, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    data: Vec<f64>,
    dim: usize,
}

impl CorrelationMatrix {
    pub fn identity(dim: usize) -> Self {
        let mut data = vec![0.0; dim * dim];
        for i in 0..dim {
            data[i * dim + i] = 1.0;
        }
        CorrelationMatrix { data, dim }
    }

    pub fn from_points(points: &[GeoPoint], base_correlation: f64, correlation_distance_m: f64) -> Self {
        let n = points.len();
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
            for j in (i + 1)..n {
                let d = points[i].approx_distance_m(&points[j]);
                let c = base_correlation * (-d / correlation_distance_m).exp();
                data[i * n + j] = c;
                data[j * n + i] = c;
            }
        }
        CorrelationMatrix { data, dim: n }
    }

    pub fn for_properties(properties: &[Property], base_correlation: f64, correlation_distance_m: f64) -> Self {
        let points: Vec<GeoPoint> = properties.iter().map(|p| p.location).collect();
        Self::from_points(&points, base_correlation, correlation_distance_m)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.dim + j]
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Lower-triangular `L` with `L Lᵀ = C`, or `None` if a pivot is not
    /// strictly positive.
    pub fn cholesky(&self) -> Option<CholeskyFactor> {
        let n = self.dim;
        let mut lower = vec![0.0; n * n];

        for i in 0..n {
            for j in 0..=i {
                let mut sum = 0.0;
                for k in 0..j {
                    sum += lower[i * n + k] * lower[j * n + k];
                }
                if i == j {
                    let diag = self.get(i, i) - sum;
                    if !(diag > 0.0) {
                        return None;
                    }
                    lower[i * n + i] = diag.sqrt();
                } else {
                    lower[i * n + j] = (self.get(i, j) - sum) / lower[j * n + j];
                }
            }
        }

        Some(CholeskyFactor { data: lower, dim: n })
    }
}

/// Lower-triangular Cholesky factor; maps i.i.d. standard normals to
/// normals with the factored correlation.
#[derive(Debug, Clone)]
pub struct CholeskyFactor {
    data: Vec<f64>,
    dim: usize,
}

impl CholeskyFactor {
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// `out = L z`. Both slices must have length `dim`.
    pub fn transform_into(&self, z: &[f64], out: &mut [f64]) {
        let n = self.dim;
        for i in 0..n {
            let row = &self.data[i * n..i * n + i + 1];
            out[i] = row.iter().zip(&z[..=i]).map(|(l, x)| l * x).sum();
        }
    }

    pub fn transform(&self, z: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.dim];
        self.transform_into(z, &mut out);
        out
    }
}
