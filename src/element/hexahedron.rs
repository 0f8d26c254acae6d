use crate::element::{ReferenceFiniteElement, Topology};
use crate::Real;
use nalgebra::{DMatrix, DMatrixViewMut};

/// Corners of the unit cube in node order: the bottom face counter-clockwise, then the top face.
const HEX_CORNERS: [[f64; 3]; 8] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
    [0.0, 1.0, 1.0],
];

/// Trilinear basis functions on the unit cube `[0, 1]^3`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Hex8Element;

/// Value and derivative of the 1D linear factor associated with a corner coordinate.
fn linear_factor<T: Real>(corner: f64, x: T) -> (T, T) {
    if corner == 0.0 {
        (T::one() - x, -T::one())
    } else {
        (x, T::one())
    }
}

impl<T: Real> ReferenceFiniteElement<T> for Hex8Element {
    fn topology(&self) -> Topology {
        Topology::Hexahedron
    }

    fn reference_nodes(&self) -> DMatrix<T> {
        DMatrix::from_fn(3, 8, |i, j| nalgebra::convert(HEX_CORNERS[j][i]))
    }

    fn populate_basis(&self, basis_values: &mut [T], xi: &[T]) {
        assert_eq!(basis_values.len(), 8);
        for (value, corner) in basis_values.iter_mut().zip(&HEX_CORNERS) {
            let (fx, _) = linear_factor(corner[0], xi[0]);
            let (fy, _) = linear_factor(corner[1], xi[1]);
            let (fz, _) = linear_factor(corner[2], xi[2]);
            *value = fx * fy * fz;
        }
    }

    fn populate_basis_gradients(&self, mut basis_gradients: DMatrixViewMut<T>, xi: &[T]) {
        assert_eq!(basis_gradients.shape(), (3, 8));
        for (node, corner) in HEX_CORNERS.iter().enumerate() {
            let (fx, dfx) = linear_factor(corner[0], xi[0]);
            let (fy, dfy) = linear_factor(corner[1], xi[1]);
            let (fz, dfz) = linear_factor(corner[2], xi[2]);
            basis_gradients[(0, node)] = dfx * fy * fz;
            basis_gradients[(1, node)] = fx * dfy * fz;
            basis_gradients[(2, node)] = fx * fy * dfz;
        }
    }
}
