//! The matrix views of an interaction graph.
//!
//! All three matrices share the graph's node index order, so row
//! and column `i` always refer to `names[i]`.
//!
//! The Laplacian here is the literal `D - A`, where `D` holds the
//! absolute row sums of `A`. Nothing is symmetrized first, so for a
//! directed or signed network this is *not* a textbook graph Laplacian.

use crate::network::{InteractionGraph, Species};
use ndarray::{Array1, Array2, Axis};
use petgraph::visit::EdgeRef;
use std::fmt::Write;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug, PartialEq)]
pub enum MatrixError {
    #[error("Cannot derive matrices from a graph with no nodes.")]
    EmptyGraph,
    #[error("Matrix shapes differ: {left:?} vs {right:?}")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    #[error("Expected a square matrix, got {0:?}")]
    NotSquare((usize, usize)),
}

/// Adjacency, degree, and Laplacian-like matrices of a graph,
/// along with the node names giving their row/column order.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphMatrices {
    pub names: Vec<Species>,
    pub adjacency: Array2<f64>,
    pub degree: Array2<f64>,
    pub laplacian: Array2<f64>,
}

/// Summary numbers on the adjacency matrix.
#[derive(Debug, PartialEq)]
pub struct MatrixStats {
    /// Number of rows (= columns = nodes).
    pub dimension: usize,
    /// Entries whose value is not zero.
    pub nonzero: usize,
    /// `nonzero / dimension^2`
    pub density: f64,
}

impl GraphMatrices {
    /// Derive all three matrices from a graph.
    #[instrument(skip_all)]
    pub fn from_graph(graph: &InteractionGraph) -> Result<Self, MatrixError> {
        if graph.is_empty() {
            return Err(MatrixError::EmptyGraph);
        }
        let adjacency = adjacency_matrix(graph);
        let degree = degree_matrix(&adjacency)?;
        let laplacian = laplacian_matrix(&degree, &adjacency)?;

        debug!(dimension = adjacency.nrows(), "derived graph matrices");

        Ok(Self {
            names: graph.node_names(),
            adjacency,
            degree,
            laplacian,
        })
    }

    /// Number of nodes, i.e. the side length of each matrix.
    pub fn dimension(&self) -> usize {
        self.names.len()
    }

    pub fn stats(&self) -> MatrixStats {
        let dimension = self.dimension();
        let nonzero = nonzero_count(&self.adjacency);
        MatrixStats {
            dimension,
            nonzero,
            density: nonzero as f64 / (dimension * dimension) as f64,
        }
    }
}

/// The weighted adjacency matrix: `A[(i, j)]` is the weight of
/// the edge `i -> j`, or zero if there isn't one.
pub fn adjacency_matrix(graph: &InteractionGraph) -> Array2<f64> {
    let n = graph.0.node_count();
    let mut adjacency = Array2::<f64>::zeros((n, n));
    for edge in graph.0.edge_references() {
        adjacency[(edge.source().index(), edge.target().index())] = *edge.weight();
    }
    adjacency
}

/// A diagonal matrix of absolute row sums of `adjacency`.
pub fn degree_matrix(adjacency: &Array2<f64>) -> Result<Array2<f64>, MatrixError> {
    ensure_square(adjacency)?;
    let abs_row_sums: Array1<f64> = adjacency.mapv(f64::abs).sum_axis(Axis(1));
    Ok(Array2::from_diag(&abs_row_sums))
}

/// `degree - adjacency`, entrywise.
pub fn laplacian_matrix(
    degree: &Array2<f64>,
    adjacency: &Array2<f64>,
) -> Result<Array2<f64>, MatrixError> {
    if degree.dim() != adjacency.dim() {
        return Err(MatrixError::ShapeMismatch {
            left: degree.dim(),
            right: adjacency.dim(),
        });
    }
    Ok(degree - adjacency)
}

/// Count the entries that are not zero.
pub fn nonzero_count(matrix: &Array2<f64>) -> usize {
    matrix.iter().filter(|v| **v != 0.0).count()
}

/// Positions `(row, col)` of non-zero entries, row major.
pub fn nonzero_positions(matrix: &Array2<f64>) -> Vec<(usize, usize)> {
    matrix
        .indexed_iter()
        .filter(|(_, v)| **v != 0.0)
        .map(|(ix, _)| ix)
        .collect()
}

/// Render a matrix as a TSV table, labelled with node names
/// along the top and down the first column.
pub fn to_tsv(matrix: &Array2<f64>, names: &[Species]) -> String {
    let mut out = String::new();
    out.push_str("node");
    for name in names {
        out.push('\t');
        out.push_str(name);
    }
    out.push('\n');

    for (row, name) in matrix.rows().into_iter().zip(names) {
        out.push_str(name);
        for v in row {
            // writing to a String can't fail
            let _ = write!(out, "\t{}", v);
        }
        out.push('\n');
    }
    out
}

pub(crate) fn ensure_square(matrix: &Array2<f64>) -> Result<(), MatrixError> {
    let (r, c) = matrix.dim();
    if r != c {
        return Err(MatrixError::NotSquare((r, c)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Row;
    use ndarray::array;

    fn graph(rows: &[(&str, &str, f64)]) -> InteractionGraph {
        InteractionGraph::from_rows(
            rows.iter()
                .map(|(f, t, w)| Row {
                    from: f.to_string(),
                    to: t.to_string(),
                    weight: *w,
                })
                .collect(),
        )
    }

    #[test]
    fn test_adjacency_shape_and_nonzeros() {
        let g = graph(&[("A", "B", 1.0), ("B", "C", 2.0), ("A", "C", 3.0)]);
        let m = GraphMatrices::from_graph(&g).unwrap();

        assert_eq!(m.adjacency.dim(), (3, 3));
        assert_eq!(nonzero_count(&m.adjacency), g.0.edge_count());
        assert_eq!(
            m.adjacency,
            array![[0.0, 1.0, 3.0], [0.0, 0.0, 2.0], [0.0, 0.0, 0.0]]
        );
    }

    #[test]
    fn test_degree_is_absolute_row_sum() {
        let g = graph(&[("A", "B", -1.0), ("A", "C", 3.0), ("B", "C", 2.0)]);
        let m = GraphMatrices::from_graph(&g).unwrap();

        for i in 0..m.dimension() {
            let expected: f64 = m.adjacency.row(i).iter().map(|v| v.abs()).sum();
            assert_eq!(m.degree[(i, i)], expected);
            for j in 0..m.dimension() {
                if i != j {
                    assert_eq!(m.degree[(i, j)], 0.0);
                }
            }
        }
        assert_eq!(m.degree[(0, 0)], 4.0);
    }

    #[test]
    fn test_laplacian_is_degree_minus_adjacency() {
        let g = graph(&[("A", "B", -1.0), ("B", "A", 0.5), ("B", "B", 2.0), ("C", "A", 1.0)]);
        let m = GraphMatrices::from_graph(&g).unwrap();

        for i in 0..m.dimension() {
            for j in 0..m.dimension() {
                assert_eq!(m.laplacian[(i, j)], m.degree[(i, j)] - m.adjacency[(i, j)]);
            }
        }
        // not symmetrized
        assert_ne!(m.laplacian, m.laplacian.t());
        // self loop: |0.5| + |2| - 2
        assert_eq!(m.laplacian[(1, 1)], 0.5);
    }

    #[test]
    fn test_empty_graph_is_an_error() {
        let g = graph(&[]);
        assert_eq!(
            GraphMatrices::from_graph(&g).unwrap_err(),
            MatrixError::EmptyGraph
        );
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Array2::<f64>::zeros((2, 2));
        let d = Array2::<f64>::zeros((3, 3));
        assert!(matches!(
            laplacian_matrix(&d, &a),
            Err(MatrixError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            degree_matrix(&Array2::<f64>::zeros((2, 3))),
            Err(MatrixError::NotSquare((2, 3)))
        ));
    }

    #[test]
    fn test_zero_weight_edge_is_not_a_nonzero() {
        let g = graph(&[("A", "B", 0.0), ("B", "A", 1.0)]);
        let m = GraphMatrices::from_graph(&g).unwrap();
        assert_eq!(g.0.edge_count(), 2);
        assert_eq!(m.stats().nonzero, 1);
        assert_eq!(nonzero_positions(&m.adjacency), vec![(1, 0)]);
    }

    #[test]
    fn test_construction_is_repeatable() {
        let rows = [("x", "y", 1.0), ("y", "z", -2.0), ("z", "x", 0.25)];
        let first = GraphMatrices::from_graph(&graph(&rows)).unwrap();
        let second = GraphMatrices::from_graph(&graph(&rows)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_to_tsv() {
        let m = array![[0.0, 1.5], [-2.0, 0.0]];
        let names = vec!["A".to_string(), "B".to_string()];
        assert_eq!(to_tsv(&m, &names), "node\tA\tB\nA\t0\t1.5\nB\t-2\t0\n");
    }
}
