use crate::element::{ReferenceFiniteElement, Topology};
use crate::Real;
use nalgebra::{DMatrix, DMatrixViewMut};
use numeric_literals::replace_float_literals;

/// Linear basis functions on the unit triangle with corners `(0, 0), (1, 0), (0, 1)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Tri3Element;

impl<T: Real> ReferenceFiniteElement<T> for Tri3Element {
    fn topology(&self) -> Topology {
        Topology::Triangle
    }

    #[rustfmt::skip]
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn reference_nodes(&self) -> DMatrix<T> {
        DMatrix::from_column_slice(2, 3, &[
            0.0, 0.0,
            1.0, 0.0,
            0.0, 1.0,
        ])
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn populate_basis(&self, basis_values: &mut [T], xi: &[T]) {
        assert_eq!(basis_values.len(), 3);
        let (x, y) = (xi[0], xi[1]);
        basis_values[0] = 1.0 - x - y;
        basis_values[1] = x;
        basis_values[2] = y;
    }

    #[rustfmt::skip]
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn populate_basis_gradients(&self, mut basis_gradients: DMatrixViewMut<T>, _xi: &[T]) {
        assert_eq!(basis_gradients.shape(), (2, 3));
        basis_gradients.copy_from_slice(&[
            -1.0, -1.0,
            1.0, 0.0,
            0.0, 1.0,
        ]);
    }
}
