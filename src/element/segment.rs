use crate::element::{ReferenceFiniteElement, Topology};
use crate::Real;
use nalgebra::{DMatrix, DMatrixViewMut};
use numeric_literals::replace_float_literals;

/// Linear basis functions on the reference segment `[0, 1]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Segment2Element;

impl<T: Real> ReferenceFiniteElement<T> for Segment2Element {
    fn topology(&self) -> Topology {
        Topology::Segment
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn reference_nodes(&self) -> DMatrix<T> {
        DMatrix::from_column_slice(1, 2, &[0.0, 1.0])
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn populate_basis(&self, basis_values: &mut [T], xi: &[T]) {
        assert_eq!(basis_values.len(), 2);
        basis_values[0] = 1.0 - xi[0];
        basis_values[1] = xi[0];
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn populate_basis_gradients(&self, mut basis_gradients: DMatrixViewMut<T>, _xi: &[T]) {
        assert_eq!(basis_gradients.shape(), (1, 2));
        basis_gradients[(0, 0)] = -1.0;
        basis_gradients[(0, 1)] = 1.0;
    }
}
