//! Risk clustering: k-means over standardised
//! (depth, impact, longitude, latitude, ln(1 + value)) features.
//!
//! k-means++ seeding from a caller-supplied seed, best of `N_INIT` restarts
//! by inertia, Lloyd iterations until assignments stop changing.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;

use crate::error::{FloodRiskError, Result};
use crate::portfolio::Property;
use crate::types::PropertyId;

const N_FEATURES: usize = 5;
const N_INIT: usize = 10;
const MAX_ITER: usize = 300;

type Feature = [f64; N_FEATURES];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub property_count: usize,
    pub mean_depth: f64,
    pub mean_value: f64,
    pub mean_impact: f64,
    pub total_value_at_risk: f64,
    pub centroid_lat: f64,
    pub centroid_lon: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterAnalysis {
    /// `(property, cluster)` in portfolio order.
    pub assignments: Vec<(PropertyId, usize)>,
    /// One entry per non-empty cluster, ordered by cluster label.
    pub clusters: Vec<ClusterSummary>,
    /// Sum of squared distances to assigned centroids, standardised space.
    pub inertia: f64,
}

fn features(properties: &[Property], depths: &[f64], impacts: &[f64]) -> Vec<Feature> {
    let mut rows: Vec<Feature> = properties
        .iter()
        .zip(depths)
        .zip(impacts)
        .map(|((p, &d), &i)| [d, i, p.location.lon, p.location.lat, p.value.ln_1p()])
        .collect();

    let n = rows.len() as f64;
    for f in 0..N_FEATURES {
        let mean = rows.iter().map(|r| r[f]).sum::<f64>() / n;
        let std = (rows.iter().map(|r| (r[f] - mean).powi(2)).sum::<f64>() / n).sqrt();
        for r in &mut rows {
            // Constant columns carry no information; centre them at zero.
            r[f] = if std > 0.0 { (r[f] - mean) / std } else { 0.0 };
        }
    }
    rows
}

fn dist2(a: &Feature, b: &Feature) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(x: &Feature, centroids: &[Feature]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(c, m)| (c, dist2(x, m)))
        .fold((0, f64::INFINITY), |best, cand| if cand.1 < best.1 { cand } else { best })
}

fn seed_centroids(data: &[Feature], k: usize, rng: &mut impl Rng) -> Vec<Feature> {
    let mut centroids = vec![data[rng.random_range(0..data.len())]];
    while centroids.len() < k {
        let weights: Vec<f64> = data.iter().map(|x| nearest(x, &centroids).1).collect();
        let total: f64 = weights.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.random::<f64>() * total;
            let mut pick = data.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                if target < *w {
                    pick = i;
                    break;
                }
                target -= w;
            }
            pick
        } else {
            // Every point already coincides with a centroid.
            rng.random_range(0..data.len())
        };
        centroids.push(data[next]);
    }
    centroids
}

fn lloyd(data: &[Feature], mut centroids: Vec<Feature>) -> (Vec<usize>, Vec<Feature>, f64) {
    let k = centroids.len();
    let mut labels = vec![usize::MAX; data.len()];
    for _ in 0..MAX_ITER {
        let mut changed = false;
        for (x, label) in data.iter().zip(labels.iter_mut()) {
            let (c, _) = nearest(x, &centroids);
            if *label != c {
                *label = c;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        let mut sums = vec![[0.0; N_FEATURES]; k];
        let mut counts = vec![0usize; k];
        for (x, &l) in data.iter().zip(&labels) {
            counts[l] += 1;
            for f in 0..N_FEATURES {
                sums[l][f] += x[f];
            }
        }
        for c in 0..k {
            // An emptied cluster keeps its previous centroid.
            if counts[c] > 0 {
                for f in 0..N_FEATURES {
                    centroids[c][f] = sums[c][f] / counts[c] as f64;
                }
            }
        }
    }
    let inertia = data.iter().zip(&labels).map(|(x, &l)| dist2(x, &centroids[l])).sum();
    (labels, centroids, inertia)
}

fn best_fit(data: &[Feature], k: usize, seed: u64) -> (Vec<usize>, f64) {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut best: Option<(Vec<usize>, f64)> = None;
    for _ in 0..N_INIT {
        let init = seed_centroids(data, k, &mut rng);
        let (labels, _, inertia) = lloyd(data, init);
        if best.as_ref().is_none_or(|(_, b)| inertia < *b) {
            best = Some((labels, inertia));
        }
    }
    best.unwrap_or_default()
}

/// Partition the portfolio into `n_clusters` groups. `n_clusters` above the
/// property count is reduced to it.
pub fn risk_clusters(
    properties: &[Property],
    depths: &[f64],
    impacts: &[f64],
    n_clusters: usize,
    seed: u64,
) -> Result<ClusterAnalysis> {
    if n_clusters == 0 {
        return Err(FloodRiskError::config("n_clusters must be > 0"));
    }
    if properties.is_empty() {
        return Ok(ClusterAnalysis::default());
    }
    let k = n_clusters.min(properties.len());
    let data = features(properties, depths, impacts);
    let (labels, inertia) = best_fit(&data, k, seed);

    let mut clusters = Vec::new();
    for c in 0..k {
        let members: Vec<usize> = labels.iter().enumerate().filter(|(_, l)| **l == c).map(|(i, _)| i).collect();
        if members.is_empty() {
            continue;
        }
        let m = members.len() as f64;
        let avg = |f: &dyn Fn(usize) -> f64| members.iter().map(|&i| f(i)).sum::<f64>() / m;
        clusters.push(ClusterSummary {
            cluster: c,
            property_count: members.len(),
            mean_depth: avg(&|i| depths[i]),
            mean_value: avg(&|i| properties[i].value),
            mean_impact: avg(&|i| impacts[i]),
            total_value_at_risk: members.iter().map(|&i| properties[i].value * impacts[i]).sum(),
            centroid_lat: avg(&|i| properties[i].location.lat),
            centroid_lon: avg(&|i| properties[i].location.lon),
        });
    }

    Ok(ClusterAnalysis {
        assignments: properties.iter().zip(&labels).map(|(p, &l)| (p.id.clone(), l)).collect(),
        clusters,
        inertia,
    })
}

/// Pick k in `1..=max_k` at the elbow of the inertia curve: the k with the
/// largest second difference. Portfolios too small for a curve get
/// `min(max_k, n)`.
pub fn select_cluster_count(
    properties: &[Property],
    depths: &[f64],
    impacts: &[f64],
    max_k: usize,
    seed: u64,
) -> usize {
    let upper = max_k.min(properties.len());
    if upper < 3 {
        return upper.max(1);
    }
    let data = features(properties, depths, impacts);
    let inertias: Vec<f64> = (1..=upper).map(|k| best_fit(&data, k, seed).1).collect();
    (1..upper - 1)
        .map(|i| (i + 1, inertias[i - 1] - 2.0 * inertias[i] + inertias[i + 1]))
        .fold((2, f64::NEG_INFINITY), |best, cand| if cand.1 > best.1 { cand } else { best })
        .0
}
