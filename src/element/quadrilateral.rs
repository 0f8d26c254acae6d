use crate::element::{ReferenceFiniteElement, Topology};
use crate::Real;
use nalgebra::{DMatrix, DMatrixViewMut};
use numeric_literals::replace_float_literals;

/// Bilinear basis functions on the unit square `[0, 1]^2`.
///
/// Nodes are ordered counter-clockwise starting at the origin.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Quad4Element;

impl<T: Real> ReferenceFiniteElement<T> for Quad4Element {
    fn topology(&self) -> Topology {
        Topology::Quadrilateral
    }

    #[rustfmt::skip]
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn reference_nodes(&self) -> DMatrix<T> {
        DMatrix::from_column_slice(2, 4, &[
            0.0, 0.0,
            1.0, 0.0,
            1.0, 1.0,
            0.0, 1.0,
        ])
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn populate_basis(&self, basis_values: &mut [T], xi: &[T]) {
        assert_eq!(basis_values.len(), 4);
        let (x, y) = (xi[0], xi[1]);
        basis_values[0] = (1.0 - x) * (1.0 - y);
        basis_values[1] = x * (1.0 - y);
        basis_values[2] = x * y;
        basis_values[3] = (1.0 - x) * y;
    }

    #[rustfmt::skip]
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn populate_basis_gradients(&self, mut basis_gradients: DMatrixViewMut<T>, xi: &[T]) {
        assert_eq!(basis_gradients.shape(), (2, 4));
        let (x, y) = (xi[0], xi[1]);
        basis_gradients.copy_from_slice(&[
            y - 1.0, x - 1.0,
            1.0 - y, -x,
            y, x,
            -y, 1.0 - x,
        ]);
    }
}
