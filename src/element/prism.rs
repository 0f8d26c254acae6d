use crate::element::{ReferenceFiniteElement, Topology};
use crate::Real;
use nalgebra::{DMatrix, DMatrixViewMut};
use numeric_literals::replace_float_literals;

/// Linear basis functions on the reference prism, the unit triangle extruded over `[0, 1]`.
///
/// Nodes 0-2 form the bottom triangle at `z = 0`, nodes 3-5 the top triangle at `z = 1`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Prism6Element;

impl<T: Real> ReferenceFiniteElement<T> for Prism6Element {
    fn topology(&self) -> Topology {
        Topology::Prism
    }

    #[rustfmt::skip]
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn reference_nodes(&self) -> DMatrix<T> {
        DMatrix::from_column_slice(3, 6, &[
            0.0, 0.0, 0.0,
            1.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
            1.0, 0.0, 1.0,
            0.0, 1.0, 1.0,
        ])
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn populate_basis(&self, basis_values: &mut [T], xi: &[T]) {
        assert_eq!(basis_values.len(), 6);
        let (x, y, z) = (xi[0], xi[1], xi[2]);
        let triangle = [1.0 - x - y, x, y];
        for (i, l) in triangle.into_iter().enumerate() {
            basis_values[i] = l * (1.0 - z);
            basis_values[i + 3] = l * z;
        }
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn populate_basis_gradients(&self, mut basis_gradients: DMatrixViewMut<T>, xi: &[T]) {
        assert_eq!(basis_gradients.shape(), (3, 6));
        let (x, y, z) = (xi[0], xi[1], xi[2]);
        let triangle = [1.0 - x - y, x, y];
        let triangle_gradients = [[-1.0, -1.0], [1.0, 0.0], [0.0, 1.0]];
        for (i, (l, [dl_dx, dl_dy])) in triangle.into_iter().zip(triangle_gradients).enumerate() {
            basis_gradients[(0, i)] = dl_dx * (1.0 - z);
            basis_gradients[(1, i)] = dl_dy * (1.0 - z);
            basis_gradients[(2, i)] = -l;
            basis_gradients[(0, i + 3)] = dl_dx * z;
            basis_gradients[(1, i + 3)] = dl_dy * z;
            basis_gradients[(2, i + 3)] = l;
        }
    }
}
