//! Spectral partitioning of an interaction network.
//!
//! The leading eigenvectors of `A·Aᵀ`, `Aᵀ·A` (or their Laplacian
//! scaled counterparts), or the leading right singular vectors of
//! `A`, are used as an embedding of the nodes. K-means on the rows
//! of that embedding gives each node a cluster label, and sorting
//! the nodes by label reorders the matrix so that modules show up
//! as blocks along the diagonal.
//!
//! Edge cases are handled as follows:
//! - an empty graph, or zero or too many clusters/components, is an error.
//! - NaN or infinite weights are an error.
//! - disconnected graphs and repeated eigenvalues are fine; whatever
//!   basis the eigensolver gives for a repeated eigenvalue is used.

use crate::kmeans::{KMeans, KMeansError};
use crate::matrices::GraphMatrices;
use crate::network::Species;
use crate::permute::{Permutation, PermutationError};
use itertools::Itertools;
use nalgebra::{DMatrix, SymmetricEigen, SVD};
use ndarray::Array2;
use ordered_float::OrderedFloat;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Convergence tolerance passed to the nalgebra solvers.
const EPS: f64 = 1.0e-12;

#[derive(Error, Debug, PartialEq)]
pub enum SpectralError {
    #[error("Cannot partition an empty graph.")]
    Empty,
    #[error("Cannot make {k} clusters from {n} nodes.")]
    InvalidClusterCount { k: usize, n: usize },
    #[error("Cannot take {c} components from {n} nodes.")]
    InvalidComponents { c: usize, n: usize },
    #[error("Matrix contains NaN or infinite values.")]
    NonFinite,
    #[error("The {0} decomposition did not converge.")]
    NoConvergence(&'static str),
    #[error("Unknown spectral variant: {0}")]
    UnknownVariant(String),
    #[error(transparent)]
    KMeans(#[from] KMeansError),
    #[error(transparent)]
    Permutation(#[from] PermutationError),
}

/// Which matrix the embedding is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpectralVariant {
    /// Eigenvectors of `A·Aᵀ`: nodes alike in who they act on.
    #[default]
    Outgoing,
    /// Eigenvectors of `Aᵀ·A`: nodes alike in who acts on them.
    Incoming,
    /// Eigenvectors of `L·Lᵀ`, where `L = D - A`.
    ScaledOutgoing,
    /// Eigenvectors of `Lᵀ·L`.
    ScaledIncoming,
    /// Right singular vectors of `A`.
    Singular,
}

impl SpectralVariant {
    pub const ALL: [&'static str; 5] = [
        "outgoing",
        "incoming",
        "scaled-outgoing",
        "scaled-incoming",
        "svd",
    ];
}

impl fmt::Display for SpectralVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpectralVariant::Outgoing => "outgoing",
            SpectralVariant::Incoming => "incoming",
            SpectralVariant::ScaledOutgoing => "scaled-outgoing",
            SpectralVariant::ScaledIncoming => "scaled-incoming",
            SpectralVariant::Singular => "svd",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SpectralVariant {
    type Err = SpectralError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outgoing" => Ok(SpectralVariant::Outgoing),
            "incoming" => Ok(SpectralVariant::Incoming),
            "scaled-outgoing" => Ok(SpectralVariant::ScaledOutgoing),
            "scaled-incoming" => Ok(SpectralVariant::ScaledIncoming),
            "svd" => Ok(SpectralVariant::Singular),
            other => Err(SpectralError::UnknownVariant(other.to_string())),
        }
    }
}

/// Options for `analyse`.
#[derive(Debug, Clone)]
pub struct SpectralOptions {
    pub variant: SpectralVariant,
    /// Number of clusters, `k`.
    pub clusters: usize,
    /// Number of leading vectors to embed with. Defaults to `clusters`.
    pub components: Option<usize>,
    pub seed: u64,
    /// K-means restarts.
    pub n_init: usize,
}

impl Default for SpectralOptions {
    fn default() -> Self {
        Self {
            variant: SpectralVariant::default(),
            clusters: 2,
            components: None,
            seed: 0,
            n_init: KMeans::default().n_init,
        }
    }
}

/// A cluster label per node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub labels: Vec<usize>,
}

impl Partition {
    /// Node positions sorted by label; stable, so ties keep the
    /// original node order.
    pub fn order(&self) -> Permutation {
        Permutation::sorting(&self.labels)
    }

    /// Permute rows and columns of a square matrix by `order()`.
    pub fn reorder(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, SpectralError> {
        Ok(self.order().permute_symmetric(matrix)?)
    }

    /// Number of nodes in each cluster, by label.
    pub fn sizes(&self) -> Vec<(usize, usize)> {
        self.labels
            .iter()
            .copied()
            .counts()
            .into_iter()
            .sorted()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// The result of `analyse`: labels, plus the names and adjacency
/// matrix reordered so that clusters are contiguous.
#[derive(Debug, Clone)]
pub struct Reordered {
    pub partition: Partition,
    /// `(name, label)` in reordered position.
    pub names: Vec<(Species, usize)>,
    pub adjacency: Array2<f64>,
}

/// Embed, cluster, and reorder in one go.
#[instrument(skip(matrices), fields(n = matrices.dimension()))]
pub fn analyse(
    matrices: &GraphMatrices,
    options: &SpectralOptions,
) -> Result<Reordered, SpectralError> {
    let components = options.components.unwrap_or(options.clusters);
    let embedding = leading_vectors(matrices, options.variant, components)?;

    let kmeans = KMeans::new(options.clusters)
        .with_seed(options.seed)
        .with_n_init(options.n_init);
    let partition = find_partition(&embedding, &kmeans)?;

    let order = partition.order();
    let labelled: Vec<(Species, usize)> = matrices
        .names
        .iter()
        .cloned()
        .zip(partition.labels.iter().copied())
        .collect();
    let names = order.apply_slice(&labelled)?;
    let adjacency = partition.reorder(&matrices.adjacency)?;

    Ok(Reordered {
        partition,
        names,
        adjacency,
    })
}

/// The `components` leading vectors of the chosen matrix, as the
/// columns of an `n × components` array. Column 0 belongs to the
/// largest eigenvalue (or singular value).
pub fn leading_vectors(
    matrices: &GraphMatrices,
    variant: SpectralVariant,
    components: usize,
) -> Result<Array2<f64>, SpectralError> {
    let n = matrices.dimension();
    if n == 0 {
        return Err(SpectralError::Empty);
    }
    if components == 0 || components > n {
        return Err(SpectralError::InvalidComponents { c: components, n });
    }
    if matrices.adjacency.iter().any(|v| !v.is_finite()) {
        return Err(SpectralError::NonFinite);
    }

    let a = &matrices.adjacency;
    let l = &matrices.laplacian;
    let (values, vectors) = match variant {
        SpectralVariant::Outgoing => symmetric_eigen(&a.dot(&a.t()))?,
        SpectralVariant::Incoming => symmetric_eigen(&a.t().dot(a))?,
        SpectralVariant::ScaledOutgoing => symmetric_eigen(&l.dot(&l.t()))?,
        SpectralVariant::ScaledIncoming => symmetric_eigen(&l.t().dot(l))?,
        SpectralVariant::Singular => right_singular(a)?,
    };

    // stable sort, so tied values keep solver order
    let order = Permutation::sorting_by(values.len(), |i, j| {
        OrderedFloat(values[j]).cmp(&OrderedFloat(values[i]))
    });
    let kept = &order.indices()[..components];

    if let (Some(&last), Some(&next)) = (kept.last(), order.indices().get(components)) {
        if (values[last] - values[next]).abs() <= EPS * values[order.indices()[0]].abs().max(1.0) {
            warn!(
                components,
                value = values[last],
                "repeated eigenvalue at the cut; the embedding depends on the solver's basis"
            );
        }
    }
    debug!(
        values = ?kept.iter().map(|&i| values[i]).collect::<Vec<_>>(),
        "leading values"
    );

    Ok(Array2::from_shape_fn((n, components), |(row, c)| {
        vectors[(row, kept[c])]
    }))
}

/// Cluster the rows of an embedding.
pub fn find_partition(embedding: &Array2<f64>, kmeans: &KMeans) -> Result<Partition, SpectralError> {
    let n = embedding.nrows();
    if n == 0 {
        return Err(SpectralError::Empty);
    }
    if kmeans.n_clusters == 0 || kmeans.n_clusters > n {
        return Err(SpectralError::InvalidClusterCount {
            k: kmeans.n_clusters,
            n,
        });
    }
    let result = kmeans.fit(embedding)?;
    Ok(Partition {
        labels: result.labels,
    })
}

fn to_nalgebra(m: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(m.nrows(), m.ncols(), |i, j| m[(i, j)])
}

/// Eigenvalues and eigenvectors (as columns) of a symmetric matrix.
fn symmetric_eigen(m: &Array2<f64>) -> Result<(Vec<f64>, DMatrix<f64>), SpectralError> {
    let eigen = SymmetricEigen::try_new(to_nalgebra(m), EPS, 0)
        .ok_or(SpectralError::NoConvergence("eigen"))?;
    Ok((eigen.eigenvalues.iter().copied().collect(), eigen.eigenvectors))
}

/// Singular values and right singular vectors (as columns) of `m`.
fn right_singular(m: &Array2<f64>) -> Result<(Vec<f64>, DMatrix<f64>), SpectralError> {
    let svd = SVD::try_new(to_nalgebra(m), false, true, EPS, 0)
        .ok_or(SpectralError::NoConvergence("singular value"))?;
    let v_t = svd.v_t.ok_or(SpectralError::NoConvergence("singular value"))?;
    Ok((svd.singular_values.iter().copied().collect(), v_t.transpose()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{InteractionGraph, Row};

    fn matrices(rows: &[(&str, &str, f64)]) -> GraphMatrices {
        let graph = InteractionGraph::from_rows(
            rows.iter()
                .map(|(f, t, w)| Row {
                    from: f.to_string(),
                    to: t.to_string(),
                    weight: *w,
                })
                .collect(),
        );
        GraphMatrices::from_graph(&graph).unwrap()
    }

    /// Two three-node cliques, {A, B, C} and {D, E, F}, with their
    /// nodes interleaved in first-appearance order.
    fn two_modules() -> GraphMatrices {
        let mut clique = Vec::new();
        for (a, b) in [
            ("A", "B"),
            ("D", "E"),
            ("B", "C"),
            ("E", "F"),
            ("C", "A"),
            ("F", "D"),
        ] {
            clique.push((a, b, 1.0));
            clique.push((b, a, 1.0));
        }
        matrices(&clique)
    }

    #[test]
    fn test_two_modules_are_separated() {
        let m = two_modules();
        assert_eq!(m.names, vec!["A", "B", "D", "E", "C", "F"]);

        let options = SpectralOptions {
            clusters: 2,
            ..Default::default()
        };
        let reordered = analyse(&m, &options).unwrap();
        let labels = &reordered.partition.labels;

        // A, B, C at 0, 1, 4; D, E, F at 2, 3, 5
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[4]);
        assert_eq!(labels[2], labels[3]);
        assert_eq!(labels[2], labels[5]);
        assert_ne!(labels[0], labels[2]);

        // block diagonal once reordered
        for i in 0..3 {
            for j in 3..6 {
                assert_eq!(reordered.adjacency[(i, j)], 0.0);
                assert_eq!(reordered.adjacency[(j, i)], 0.0);
            }
        }
        let first: Vec<&str> = reordered.names[..3]
            .iter()
            .map(|(n, _)| n.as_str())
            .sorted()
            .collect();
        assert!(first == vec!["A", "B", "C"] || first == vec!["D", "E", "F"]);
        assert_eq!(reordered.partition.sizes().len(), 2);
    }

    #[test]
    fn test_singular_variant_separates_modules() {
        let m = two_modules();
        let embedding = leading_vectors(&m, SpectralVariant::Singular, 2).unwrap();
        let partition = find_partition(&embedding, &KMeans::new(2)).unwrap();
        let l = &partition.labels;
        assert_eq!(l[0], l[4]);
        assert_eq!(l[2], l[5]);
        assert_ne!(l[0], l[2]);
    }

    #[test]
    fn test_leading_vector_is_largest_eigenvalue() {
        // self loops only: A·Aᵀ = diag(9, 1)
        let m = matrices(&[("A", "A", 3.0), ("B", "B", 1.0)]);
        let v = leading_vectors(&m, SpectralVariant::Outgoing, 2).unwrap();
        assert!((v[(0, 0)].abs() - 1.0).abs() < 1e-9);
        assert!(v[(1, 0)].abs() < 1e-9);
        assert!((v[(1, 1)].abs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_scaled_vectors_are_orthonormal() {
        let m = matrices(&[("A", "B", 1.0), ("B", "C", -2.0), ("C", "A", 0.5), ("A", "C", 1.0)]);
        for variant in [SpectralVariant::ScaledOutgoing, SpectralVariant::ScaledIncoming] {
            let v = leading_vectors(&m, variant, 3).unwrap();
            let gram = v.t().dot(&v);
            for i in 0..3 {
                for j in 0..3 {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert!((gram[(i, j)] - expected).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_bad_counts_are_rejected() {
        let m = matrices(&[("A", "B", 1.0), ("B", "C", 1.0)]);
        assert_eq!(
            leading_vectors(&m, SpectralVariant::Outgoing, 4).unwrap_err(),
            SpectralError::InvalidComponents { c: 4, n: 3 }
        );
        assert_eq!(
            leading_vectors(&m, SpectralVariant::Outgoing, 0).unwrap_err(),
            SpectralError::InvalidComponents { c: 0, n: 3 }
        );
        let options = SpectralOptions {
            clusters: 4,
            components: Some(2),
            ..Default::default()
        };
        assert_eq!(
            analyse(&m, &options).unwrap_err(),
            SpectralError::InvalidClusterCount { k: 4, n: 3 }
        );
    }

    #[test]
    fn test_non_finite_weights_are_rejected() {
        let m = matrices(&[("A", "B", f64::NAN), ("B", "C", 1.0)]);
        assert_eq!(
            leading_vectors(&m, SpectralVariant::Singular, 1).unwrap_err(),
            SpectralError::NonFinite
        );
    }

    #[test]
    fn test_partition_order_and_reorder() {
        let p = Partition {
            labels: vec![1, 0, 1, 0],
        };
        assert_eq!(p.order().indices(), &[1, 3, 0, 2]);
        assert_eq!(p.sizes(), vec![(0, 2), (1, 2)]);

        let m = Array2::from_shape_fn((4, 4), |(i, j)| (i * 4 + j) as f64);
        let r = p.reorder(&m).unwrap();
        assert_eq!(r[(0, 0)], m[(1, 1)]);
        assert_eq!(r[(0, 1)], m[(1, 3)]);
        assert_eq!(r[(3, 2)], m[(2, 0)]);
    }

    #[test]
    fn test_variant_round_trips_through_str() {
        for name in SpectralVariant::ALL {
            let v: SpectralVariant = name.parse().unwrap();
            assert_eq!(v.to_string(), name);
        }
        assert!("laplacian".parse::<SpectralVariant>().is_err());
    }
}
