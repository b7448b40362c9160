//! `intergraph` turns an edge list of an ecological interaction
//! network into matrices: the weighted adjacency matrix, a diagonal
//! matrix of absolute degrees, and their difference. It can plot the
//! sparsity pattern, and partition the network spectrally.

/// Read a DSV of interactions and build a directed,
/// weighted graph from it.
pub mod network;
pub use network::{InteractionGraph, Row};

/// Adjacency, degree, and Laplacian-like matrices.
pub mod matrices;
pub use matrices::GraphMatrices;

/// SVG sparsity plots and heat maps.
pub mod plot;

/// Spectral partitioning of the network, built on
/// the matrices above.
pub mod spectral;
pub use spectral::{Partition, SpectralOptions, SpectralVariant};

/// K-means, used by the spectral partitioning.
pub mod kmeans;

/// Permutations of matrix axes.
pub mod permute;

/// The margins for all the matrix plots
/// used in this crate.
const MARGIN_LR: f64 = 20.0;
