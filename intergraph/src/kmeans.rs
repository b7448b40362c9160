//! K-means clustering of the rows of a matrix.
//!
//! Lloyd's algorithm, seeded with k-means++. Several restarts are
//! run in parallel and the one with the lowest inertia is kept.
//! Everything is driven by a seed, so the same input and options
//! always give the same labels.

use ndarray::{Array2, ArrayView1, Axis};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug, PartialEq)]
pub enum KMeansError {
    #[error("Cannot cluster an empty set of points.")]
    Empty,
    #[error("Cannot make {k} clusters from {n} points.")]
    InvalidClusterCount { k: usize, n: usize },
    #[error("Input contains NaN or infinite values.")]
    NonFinite,
    #[error("At least one restart is needed.")]
    NoRestarts,
}

/// Options for a k-means run.
#[derive(Debug, Clone)]
pub struct KMeans {
    /// Number of clusters.
    pub n_clusters: usize,
    /// Maximum Lloyd iterations per restart.
    pub max_iter: usize,
    /// Stop once inertia changes by less than this.
    pub tol: f64,
    /// Number of restarts, best kept.
    pub n_init: usize,
    /// Seed for restart `r` is `seed + r`.
    pub seed: u64,
}

impl Default for KMeans {
    fn default() -> Self {
        Self {
            n_clusters: 2,
            max_iter: 300,
            tol: 1e-4,
            n_init: 10,
            seed: 0,
        }
    }
}

/// The outcome of clustering.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Cluster label per row of the input, in `0..n_clusters`.
    pub labels: Vec<usize>,
    /// One centroid per row.
    pub centroids: Array2<f64>,
    /// Sum of squared distances from each point to its centroid.
    pub inertia: f64,
    /// Iterations used by the winning restart.
    pub n_iter: usize,
}

impl KMeans {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Cluster the rows of `data`.
    #[instrument(skip(self, data), fields(k = self.n_clusters, n = data.nrows()))]
    pub fn fit(&self, data: &Array2<f64>) -> Result<KMeansResult, KMeansError> {
        let n = data.nrows();
        if n == 0 {
            return Err(KMeansError::Empty);
        }
        if self.n_clusters == 0 || self.n_clusters > n {
            return Err(KMeansError::InvalidClusterCount {
                k: self.n_clusters,
                n,
            });
        }
        if self.n_init == 0 {
            return Err(KMeansError::NoRestarts);
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(KMeansError::NonFinite);
        }

        let runs: Vec<KMeansResult> = (0..self.n_init)
            .into_par_iter()
            .map(|r| self.single_run(data, self.seed.wrapping_add(r as u64)))
            .collect();

        // lowest inertia wins, earliest restart on a tie
        let best = runs
            .into_iter()
            .enumerate()
            .min_by_key(|(r, run)| (OrderedFloat(run.inertia), *r))
            .map(|(_, run)| run)
            .ok_or(KMeansError::NoRestarts)?;

        debug!(inertia = best.inertia, n_iter = best.n_iter, "k-means done");
        Ok(best)
    }

    fn single_run(&self, data: &Array2<f64>, seed: u64) -> KMeansResult {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut centroids = plus_plus_init(data, self.n_clusters, &mut rng);
        let mut labels = vec![usize::MAX; data.nrows()];
        let mut inertia = f64::INFINITY;
        let mut n_iter = 0;

        for iteration in 0..self.max_iter {
            n_iter = iteration + 1;

            let changed = assign(data, &centroids, &mut labels);
            update_centroids(data, &labels, &mut centroids);

            let new_inertia = total_inertia(data, &labels, &centroids);
            let converged = !changed || (inertia - new_inertia).abs() < self.tol;
            inertia = new_inertia;
            if converged {
                break;
            }
        }

        KMeansResult {
            labels,
            centroids,
            inertia,
            n_iter,
        }
    }
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// k-means++ seeding: the first centroid is a uniformly chosen
/// row, each next one is drawn with probability proportional to
/// its squared distance from the nearest centroid so far.
fn plus_plus_init(data: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = data.nrows();
    let mut chosen = Vec::with_capacity(k);
    chosen.push(rng.random_range(0..n));

    let mut nearest: Vec<f64> = data
        .rows()
        .into_iter()
        .map(|row| squared_distance(row, data.row(chosen[0])))
        .collect();

    while chosen.len() < k {
        let total: f64 = nearest.iter().sum();
        let next = if total > 0.0 {
            let target = rng.random::<f64>() * total;
            let mut acc = 0.0;
            // rounding can leave acc just short of target
            let mut pick = nearest
                .iter()
                .rposition(|d| *d > 0.0)
                .unwrap_or(n - 1);
            for (i, d) in nearest.iter().enumerate() {
                acc += d;
                if acc >= target && *d > 0.0 {
                    pick = i;
                    break;
                }
            }
            pick
        } else {
            // every point sits on a centroid already; any unused row will do
            let unused: Vec<usize> = (0..n).filter(|i| !chosen.contains(i)).collect();
            unused[rng.random_range(0..unused.len())]
        };
        chosen.push(next);

        for (i, row) in data.rows().into_iter().enumerate() {
            let d = squared_distance(row, data.row(next));
            if d < nearest[i] {
                nearest[i] = d;
            }
        }
    }

    data.select(Axis(0), &chosen)
}

/// Assign every row to its nearest centroid. Returns whether any
/// label changed.
fn assign(data: &Array2<f64>, centroids: &Array2<f64>, labels: &mut [usize]) -> bool {
    let mut changed = false;
    for (i, row) in data.rows().into_iter().enumerate() {
        let best = centroids
            .rows()
            .into_iter()
            .enumerate()
            .min_by_key(|(c, centroid)| (OrderedFloat(squared_distance(row, *centroid)), *c))
            .map(|(c, _)| c)
            .unwrap_or(0);
        if labels[i] != best {
            labels[i] = best;
            changed = true;
        }
    }
    changed
}

/// Move each centroid to the mean of its rows. Empty clusters keep
/// their previous centroid.
fn update_centroids(data: &Array2<f64>, labels: &[usize], centroids: &mut Array2<f64>) {
    let mut sums = Array2::<f64>::zeros(centroids.dim());
    let mut counts = vec![0usize; centroids.nrows()];
    for (row, &label) in data.rows().into_iter().zip(labels) {
        let mut s = sums.row_mut(label);
        s += &row;
        counts[label] += 1;
    }
    for (c, count) in counts.into_iter().enumerate() {
        if count > 0 {
            let mean = &sums.row(c) / count as f64;
            centroids.row_mut(c).assign(&mean);
        }
    }
}

fn total_inertia(data: &Array2<f64>, labels: &[usize], centroids: &Array2<f64>) -> f64 {
    data.rows()
        .into_iter()
        .zip(labels)
        .map(|(row, &label)| squared_distance(row, centroids.row(label)))
        .sum()
}
