//! Global assembly of element contributions into the block system.
use crate::Real;
use nalgebra::{DMatrixView, DVector, Scalar};
use nalgebra_sparse::pattern::SparsityPattern;
use sobolev_sparse::BlockCsrMatrix;
use std::collections::BTreeSet;

/// The output of assembling a single element.
///
/// Workers produce one contribution per element without touching global state. The
/// contributions are then reduced into the global matrix and vector by a single thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementContribution<T> {
    /// Index of the element in the mesh.
    pub element: usize,
    /// Global node indices of the local nodes.
    pub nodes: Vec<usize>,
    pub block_size: usize,
    /// Node-pair blocks, block `(a, b)` at offset `(a * nodes.len() + b) * block_size^2`,
    /// each in column-major order. Empty if the element contributes no matrix entries.
    pub matrix_blocks: Vec<T>,
    /// Node blocks of the vector contribution, `block_size` entries per local node.
    /// Empty if the element contributes no vector entries.
    pub vector_blocks: Vec<T>,
}

impl<T: Scalar> ElementContribution<T> {
    pub fn new(element: usize, nodes: Vec<usize>, block_size: usize) -> Self {
        Self {
            element,
            nodes,
            block_size,
            matrix_blocks: Vec::new(),
            vector_blocks: Vec::new(),
        }
    }

    /// The block of the local node pair `(a, b)`.
    pub fn matrix_block(&self, a: usize, b: usize) -> DMatrixView<T> {
        let bs = self.block_size;
        let offset = (a * self.nodes.len() + b) * bs * bs;
        DMatrixView::from_slice(&self.matrix_blocks[offset..offset + bs * bs], bs, bs)
    }
}

impl<T: Real> ElementContribution<T> {
    /// Adds the node-pair blocks to the corresponding blocks of the global matrix.
    ///
    /// # Panics
    ///
    /// Panics if a node pair of the element is missing from the sparsity pattern of the matrix,
    /// or if the block sizes disagree.
    pub fn add_to_matrix(&self, matrix: &mut BlockCsrMatrix<T>) {
        if self.matrix_blocks.is_empty() {
            return;
        }
        assert_eq!(matrix.block_size(), self.block_size, "Block size mismatch");
        for (a, &row) in self.nodes.iter().enumerate() {
            for (b, &col) in self.nodes.iter().enumerate() {
                matrix.add_block(row, col, self.matrix_block(a, b));
            }
        }
    }

    /// Adds the node blocks to the corresponding entries of the global vector.
    pub fn add_to_vector(&self, vector: &mut DVector<T>) {
        let bs = self.block_size;
        for (values, &node) in self.vector_blocks.chunks_exact(bs).zip(&self.nodes) {
            let mut target = vector.rows_mut(bs * node, bs);
            for (target_k, value) in target.iter_mut().zip(values) {
                *target_k += *value;
            }
        }
    }
}

/// Builds the node-level sparsity pattern of the global block matrix.
///
/// Contains every pair of nodes that share an element, and the diagonal of every node so that
/// boundary conditions can be imposed on nodes that no element touches. The pattern is
/// structurally symmetric.
pub fn assemble_block_pattern<'a>(num_nodes: usize, elements: impl IntoIterator<Item = &'a [usize]>) -> SparsityPattern {
    // A set stores each entry exactly once, which keeps memory usage low when many elements share
    // the same node pairs
    let mut entries: BTreeSet<(usize, usize)> = (0..num_nodes).map(|i| (i, i)).collect();
    for element_nodes in elements {
        for &node_i in element_nodes {
            for &node_j in element_nodes {
                entries.insert((node_i, node_j));
            }
        }
    }

    let mut offsets = Vec::with_capacity(num_nodes + 1);
    let mut column_indices = Vec::with_capacity(entries.len());
    offsets.push(0);
    for (i, j) in entries {
        // Every row has at least its diagonal entry, so rows are never skipped
        while i + 1 > offsets.len() {
            offsets.push(column_indices.len());
        }
        column_indices.push(j);
    }
    while offsets.len() < num_nodes + 1 {
        offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(num_nodes, num_nodes, offsets, column_indices)
        .expect("Sorted, deduplicated entries always form a valid pattern")
}

/// A representative magnitude of the matrix diagonal: the first non-zero diagonal entry,
/// or one if the diagonal vanishes.
pub fn representative_diagonal_scale<T: Real>(matrix: &BlockCsrMatrix<T>) -> T {
    matrix
        .diagonal_iter()
        .find(|d| *d != T::zero())
        .map(|d| d.abs())
        .unwrap_or(T::one())
}

/// Strongly imposes homogeneous Dirichlet conditions on the matrix.
///
/// For every node in `owned_nodes`, the block row is replaced by the identity scaled by
/// [`representative_diagonal_scale`] and the block column is zeroed in every other row.
/// For every node in `halo_nodes` only the block column is zeroed, diagonal included,
/// since the row belongs to the partition that owns the node.
///
/// The matrix must have a structurally symmetric pattern, as produced by
/// [`assemble_block_pattern`].
///
/// # Panics
///
/// Panics if a node index is out of bounds for the matrix.
pub fn apply_homogeneous_dirichlet_bc<T: Real>(matrix: &mut BlockCsrMatrix<T>, owned_nodes: &[usize], halo_nodes: &[usize]) {
    let scale = representative_diagonal_scale(matrix);
    let num_nodes = matrix.num_block_rows();

    // Zeroing the column of node i only requires visiting the rows j for which (i, j) is stored,
    // by symmetry of the pattern
    let mut is_dirichlet = vec![false; num_nodes];
    let mut rows_to_visit = vec![false; num_nodes];

    for &node in owned_nodes {
        is_dirichlet[node] = true;
        let mut row = matrix.row_mut(node);
        for k in 0..row.num_blocks() {
            let col = row.columns()[k];
            let mut block = row.block_mut(k);
            if col == node {
                block.fill_with_identity();
                block *= scale;
            } else {
                block.fill(T::zero());
                rows_to_visit[col] = true;
            }
        }
    }

    for row_index in (0..num_nodes).filter(|&i| rows_to_visit[i] && !is_dirichlet[i]) {
        let mut row = matrix.row_mut(row_index);
        for k in 0..row.num_blocks() {
            if is_dirichlet[row.columns()[k]] {
                row.block_mut(k).fill(T::zero());
            }
        }
    }

    for &node in halo_nodes {
        let rows: Vec<usize> = matrix.pattern().lane(node).to_vec();
        for row in rows {
            if let Some(mut block) = matrix.block_mut(row, node) {
                block.fill(T::zero());
            }
        }
    }
}

/// Zeroes the node blocks of the given nodes in a block vector.
pub fn apply_homogeneous_dirichlet_bc_rhs<T: Real>(vector: &mut DVector<T>, nodes: &[usize], block_size: usize) {
    for &node in nodes {
        vector.rows_mut(block_size * node, block_size).fill(T::zero());
    }
}
