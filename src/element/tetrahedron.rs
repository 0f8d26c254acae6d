use crate::element::{ReferenceFiniteElement, Topology};
use crate::Real;
use nalgebra::{DMatrix, DMatrixViewMut};
use numeric_literals::replace_float_literals;

/// Linear basis functions on the unit tetrahedron spanned by the origin and the unit vectors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Tet4Element;

impl<T: Real> ReferenceFiniteElement<T> for Tet4Element {
    fn topology(&self) -> Topology {
        Topology::Tetrahedron
    }

    #[rustfmt::skip]
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn reference_nodes(&self) -> DMatrix<T> {
        DMatrix::from_column_slice(3, 4, &[
            0.0, 0.0, 0.0,
            1.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
        ])
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn populate_basis(&self, basis_values: &mut [T], xi: &[T]) {
        assert_eq!(basis_values.len(), 4);
        let (x, y, z) = (xi[0], xi[1], xi[2]);
        basis_values[0] = 1.0 - x - y - z;
        basis_values[1] = x;
        basis_values[2] = y;
        basis_values[3] = z;
    }

    #[rustfmt::skip]
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn populate_basis_gradients(&self, mut basis_gradients: DMatrixViewMut<T>, _xi: &[T]) {
        assert_eq!(basis_gradients.shape(), (3, 4));
        basis_gradients.copy_from_slice(&[
            -1.0, -1.0, -1.0,
            1.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
        ]);
    }
}
