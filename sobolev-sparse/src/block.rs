//! Block compressed sparse row matrices.
//!
//! A [`BlockCsrMatrix`] stores dense `b x b` blocks at the positions of a node-level
//! [`SparsityPattern`]. Scalar row `b * i + k` of the matrix corresponds to component `k`
//! of block row (node) `i`.
use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut, DVectorView, DVectorViewMut, Scalar};
use nalgebra_sparse::pattern::SparsityPattern;
use num::Zero;
use rayon::prelude::*;
use sobolev_traits::Real;
use std::sync::Arc;

/// A sparse matrix made up of dense square blocks.
///
/// Each block is stored contiguously in column-major order, so that it may be viewed directly
/// as a `nalgebra` matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockCsrMatrix<T> {
    pattern: Arc<SparsityPattern>,
    block_size: usize,
    values: Vec<T>,
}

/// Mutable access to the blocks of a single block row.
#[derive(Debug)]
pub struct BlockRowMut<'a, T> {
    block_size: usize,
    columns: &'a [usize],
    values: &'a mut [T],
}

impl<'a, T: Scalar> BlockRowMut<'a, T> {
    /// The block column indices of the stored blocks in this row, in increasing order.
    pub fn columns(&self) -> &[usize] {
        self.columns
    }

    pub fn num_blocks(&self) -> usize {
        self.columns.len()
    }

    /// Mutable view of the `local_index`-th stored block of the row.
    pub fn block_mut(&mut self, local_index: usize) -> DMatrixViewMut<T> {
        let b = self.block_size;
        let range = b * b * local_index..b * b * (local_index + 1);
        DMatrixViewMut::from_slice(&mut self.values[range], b, b)
    }
}

impl<T: Scalar + Zero> BlockCsrMatrix<T> {
    /// Creates a zero-valued matrix with the given block pattern.
    pub fn from_pattern(pattern: Arc<SparsityPattern>, block_size: usize) -> Self {
        assert!(block_size > 0, "Block size must be positive");
        let num_values = pattern.nnz() * block_size * block_size;
        Self {
            pattern,
            block_size,
            values: vec![T::zero(); num_values],
        }
    }

    /// Sets every stored entry to zero, keeping the pattern.
    pub fn fill_zero(&mut self) {
        self.values.fill(T::zero());
    }

    /// Builds the dense representation of the matrix.
    ///
    /// Mostly useful for testing and debugging.
    pub fn to_dense(&self) -> DMatrix<T> {
        let b = self.block_size;
        let mut dense = DMatrix::zeros(self.nrows(), self.ncols());
        for row in 0..self.num_block_rows() {
            for (col, block) in self.row_blocks(row) {
                dense
                    .view_mut((b * row, b * col), (b, b))
                    .copy_from(&block);
            }
        }
        dense
    }
}

impl<T: Scalar> BlockCsrMatrix<T> {
    pub fn pattern(&self) -> &Arc<SparsityPattern> {
        &self.pattern
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn num_block_rows(&self) -> usize {
        self.pattern.major_dim()
    }

    pub fn num_block_cols(&self) -> usize {
        self.pattern.minor_dim()
    }

    /// Number of scalar rows.
    pub fn nrows(&self) -> usize {
        self.block_size * self.num_block_rows()
    }

    /// Number of scalar columns.
    pub fn ncols(&self) -> usize {
        self.block_size * self.num_block_cols()
    }

    /// Number of stored blocks.
    pub fn num_blocks(&self) -> usize {
        self.pattern.nnz()
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Returns the storage index of block `(row, col)`, if the block is part of the pattern.
    pub fn find_block_index(&self, row: usize, col: usize) -> Option<usize> {
        let offset = *self.pattern.major_offsets().get(row)?;
        self.pattern
            .lane(row)
            .binary_search(&col)
            .ok()
            .map(|local_index| offset + local_index)
    }

    fn block_range(&self, block_index: usize) -> std::ops::Range<usize> {
        let b2 = self.block_size * self.block_size;
        b2 * block_index..b2 * (block_index + 1)
    }

    pub fn block(&self, row: usize, col: usize) -> Option<DMatrixView<T>> {
        let b = self.block_size;
        let range = self.block_range(self.find_block_index(row, col)?);
        Some(DMatrixView::from_slice(&self.values[range], b, b))
    }

    pub fn block_mut(&mut self, row: usize, col: usize) -> Option<DMatrixViewMut<T>> {
        let b = self.block_size;
        let range = self.block_range(self.find_block_index(row, col)?);
        Some(DMatrixViewMut::from_slice(&mut self.values[range], b, b))
    }

    /// Iterates over `(column, block)` pairs of the given block row.
    pub fn row_blocks(&self, row: usize) -> impl Iterator<Item = (usize, DMatrixView<T>)> {
        let b = self.block_size;
        let offset = self.pattern.major_offsets()[row];
        let columns = self.pattern.lane(row);
        let values = &self.values[b * b * offset..b * b * (offset + columns.len())];
        columns
            .iter()
            .copied()
            .zip(values.chunks_exact(b * b))
            .map(move |(col, block)| (col, DMatrixView::from_slice(block, b, b)))
    }

    pub fn row_mut(&mut self, row: usize) -> BlockRowMut<T> {
        let b = self.block_size;
        let offsets = self.pattern.major_offsets();
        let (begin, end) = (offsets[row], offsets[row + 1]);
        BlockRowMut {
            block_size: b,
            columns: &self.pattern.minor_indices()[begin..end],
            values: &mut self.values[b * b * begin..b * b * end],
        }
    }
}

impl<T: Real> BlockCsrMatrix<T> {
    /// Adds `block` to the stored block `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if the block is not part of the sparsity pattern or has the wrong dimensions.
    pub fn add_block(&mut self, row: usize, col: usize, block: DMatrixView<T>) {
        let mut target = self
            .block_mut(row, col)
            .expect("Could not find block associated with node pair in sparsity pattern");
        assert_eq!(target.shape(), block.shape(), "Block dimension mismatch");
        target += block;
    }

    /// Overwrites the stored block `(row, col)` with `block`.
    ///
    /// # Panics
    ///
    /// Panics if the block is not part of the sparsity pattern or has the wrong dimensions.
    pub fn set_block(&mut self, row: usize, col: usize, block: DMatrixView<T>) {
        let mut target = self
            .block_mut(row, col)
            .expect("Could not find block associated with node pair in sparsity pattern");
        assert_eq!(target.shape(), block.shape(), "Block dimension mismatch");
        target.copy_from(&block);
    }

    /// Adds every stored entry of `other` to the corresponding entry of `self`.
    ///
    /// # Panics
    ///
    /// Panics if the matrices have different patterns or block sizes.
    pub fn add_assign_same_pattern(&mut self, other: &Self) {
        assert!(
            Arc::ptr_eq(&self.pattern, &other.pattern) || self.pattern == other.pattern,
            "Sparsity patterns must be identical"
        );
        assert_eq!(self.block_size, other.block_size, "Block size mismatch");
        for (value, other_value) in self.values.iter_mut().zip(&other.values) {
            *value += *other_value;
        }
    }

    /// Iterates over the scalar diagonal entries. Entries whose block is absent are zero.
    pub fn diagonal_iter(&self) -> impl Iterator<Item = T> + '_ {
        let b = self.block_size;
        (0..self.num_block_rows()).flat_map(move |row| {
            let block = self.block(row, row);
            (0..b).map(move |k| block.as_ref().map(|block| block[(k, k)]).unwrap_or(T::zero()))
        })
    }
}

impl<T: Real + Send + Sync> BlockCsrMatrix<T> {
    /// Computes `y = A x`, one block row per task.
    ///
    /// # Panics
    ///
    /// Panics if the vector dimensions do not match the matrix.
    pub fn spmv(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) {
        assert_eq!(y.len(), self.nrows(), "Output dimension mismatch");
        assert_eq!(x.len(), self.ncols(), "Input dimension mismatch");
        let b = self.block_size;
        let x = x.as_slice();
        let y = y.as_mut_slice();

        y.par_chunks_mut(b).enumerate().for_each(|(row, y_row)| {
            y_row.fill(T::zero());
            for (col, block) in self.row_blocks(row) {
                let x_col = &x[b * col..b * (col + 1)];
                for (k, y_k) in y_row.iter_mut().enumerate() {
                    for (l, x_l) in x_col.iter().enumerate() {
                        *y_k += block[(k, l)] * *x_l;
                    }
                }
            }
        });
    }
}
