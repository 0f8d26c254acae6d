//! Strategies for property-based testing.
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use nalgebra::{DMatrix, DMatrixView, DVector};

/// An affine map `x -> A x + b`.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineMap {
    pub matrix: DMatrix<f64>,
    pub translation: DVector<f64>,
}

impl AffineMap {
    pub fn dim(&self) -> usize {
        self.translation.len()
    }

    /// Maps every column of `points`.
    pub fn apply(&self, points: DMatrixView<f64>) -> DMatrix<f64> {
        let mut mapped = &self.matrix * points;
        for mut column in mapped.column_iter_mut() {
            column += &self.translation;
        }
        mapped
    }
}

/// Affine maps whose linear part is a scaled, strictly diagonally dominant perturbation of the
/// identity, so that it is well conditioned and has a positive determinant.
pub fn affine_map(dim: usize) -> impl Strategy<Value = AffineMap> {
    // Off-diagonal row sums stay below the diagonal for dim <= 3
    let perturbation = vec(-0.3..0.3, dim * dim);
    let scale = 0.5..2.0;
    let translation = vec(-10.0..10.0, dim);
    (perturbation, scale, translation).prop_map(move |(perturbation, scale, translation)| {
        let matrix = (DMatrix::identity(dim, dim) + DMatrix::from_vec(dim, dim, perturbation)) * scale;
        AffineMap {
            matrix,
            translation: DVector::from_vec(translation),
        }
    })
}
