//! Permutations of matrix axes.
//!
//! Used to reorder a square matrix so that nodes sharing a
//! cluster label sit next to each other, which makes block
//! structure visible in a plot.

use ndarray::{Array2, Axis};
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum PermutationError {
    #[error("Index {0} is out of range for a permutation of length {1}")]
    OutOfRange(usize, usize),
    #[error("Index {0} appears more than once")]
    Repeated(usize),
    #[error("Permutation of length {perm} cannot be applied to an axis of length {axis}")]
    LengthMismatch { perm: usize, axis: usize },
}

/// Hold the indices of a permutation. `indices[i]` is the old
/// position of the element that ends up at position `i`.
///
/// Type invariant: each index in `0..len` appears exactly once.
#[derive(Clone, Debug, PartialEq)]
pub struct Permutation {
    indices: Vec<usize>,
}

impl Permutation {
    pub fn identity(len: usize) -> Self {
        Permutation {
            indices: (0..len).collect(),
        }
    }

    /// Checks the indices form a permutation.
    pub fn from_indices(indices: Vec<usize>) -> Result<Self, PermutationError> {
        let len = indices.len();
        let mut seen = vec![false; len];
        for &i in &indices {
            if i >= len {
                return Err(PermutationError::OutOfRange(i, len));
            }
            if seen[i] {
                return Err(PermutationError::Repeated(i));
            }
            seen[i] = true;
        }
        Ok(Permutation { indices })
    }

    /// A stable argsort of `keys`.
    pub fn sorting<T: Ord>(keys: &[T]) -> Self {
        Self::sorting_by(keys.len(), |a, b| keys[a].cmp(&keys[b]))
    }

    /// A stable argsort over `0..len`, comparing positions with `compare`.
    pub fn sorting_by<F>(len: usize, mut compare: F) -> Self
    where
        F: FnMut(usize, usize) -> Ordering,
    {
        let mut perm = Self::identity(len);
        perm.indices.sort_by(|&a, &b| compare(a, b));
        perm
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Reorder a slice into a new Vec.
    pub fn apply_slice<T: Clone>(&self, data: &[T]) -> Result<Vec<T>, PermutationError> {
        self.check_len(data.len())?;
        Ok(self.indices.iter().map(|&i| data[i].clone()).collect())
    }

    /// Reorder one axis of a matrix.
    pub fn permute_axis(
        &self,
        matrix: &Array2<f64>,
        axis: Axis,
    ) -> Result<Array2<f64>, PermutationError> {
        self.check_len(matrix.len_of(axis))?;
        Ok(matrix.select(axis, &self.indices))
    }

    /// Reorder rows and columns of a square matrix together.
    pub fn permute_symmetric(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, PermutationError> {
        let rows = self.permute_axis(matrix, Axis(0))?;
        self.permute_axis(&rows, Axis(1))
    }

    fn check_len(&self, axis: usize) -> Result<(), PermutationError> {
        if axis != self.indices.len() {
            return Err(PermutationError::LengthMismatch {
                perm: self.indices.len(),
                axis,
            });
        }
        Ok(())
    }
}
