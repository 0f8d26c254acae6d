use crate::element::{ReferenceFiniteElement, Topology};
use crate::Real;
use nalgebra::{DMatrix, DMatrixViewMut};
use numeric_literals::replace_float_literals;

/// Base corners `(xi, eta)` of the reference pyramid, counter-clockwise.
const BASE_CORNERS: [[f64; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];

/// Rational basis functions on the pyramid with base `[-1, 1]^2` at `z = 0` and apex `(0, 0, 1)`.
///
/// For the base nodes,
/// `N_i = (1 - t + xi_i r)(1 - t + eta_i s) / (4 (1 - t))`, and `N_4 = t` for the apex.
/// The functions are singular at the apex itself, where the limits along the axis are used.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Pyramid5Element;

fn at_apex<T: Real>(t: T) -> bool {
    (T::one() - t).abs() <= T::default_epsilon()
}

impl<T: Real> ReferenceFiniteElement<T> for Pyramid5Element {
    fn topology(&self) -> Topology {
        Topology::Pyramid
    }

    #[rustfmt::skip]
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn reference_nodes(&self) -> DMatrix<T> {
        DMatrix::from_column_slice(3, 5, &[
            -1.0, -1.0, 0.0,
            1.0, -1.0, 0.0,
            1.0, 1.0, 0.0,
            -1.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
        ])
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn populate_basis(&self, basis_values: &mut [T], xi: &[T]) {
        assert_eq!(basis_values.len(), 5);
        let (r, s, t) = (xi[0], xi[1], xi[2]);
        if at_apex(t) {
            basis_values[..4].fill(0.0);
        } else {
            let c = 4.0 * (1.0 - t);
            for (value, [xi_i, eta_i]) in basis_values.iter_mut().zip(BASE_CORNERS) {
                let a = 1.0 - t + T::from_f64(xi_i).expect("Literal must fit in T") * r;
                let b = 1.0 - t + T::from_f64(eta_i).expect("Literal must fit in T") * s;
                *value = a * b / c;
            }
        }
        basis_values[4] = t;
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn populate_basis_gradients(&self, mut basis_gradients: DMatrixViewMut<T>, xi: &[T]) {
        assert_eq!(basis_gradients.shape(), (3, 5));
        let (r, s, t) = (xi[0], xi[1], xi[2]);
        for (node, [xi_i, eta_i]) in BASE_CORNERS.into_iter().enumerate() {
            let xi_i = T::from_f64(xi_i).expect("Literal must fit in T");
            let eta_i = T::from_f64(eta_i).expect("Literal must fit in T");
            if at_apex(t) {
                basis_gradients[(0, node)] = 0.25 * xi_i;
                basis_gradients[(1, node)] = 0.25 * eta_i;
                basis_gradients[(2, node)] = -0.25;
            } else {
                let a = 1.0 - t + xi_i * r;
                let b = 1.0 - t + eta_i * s;
                let c = 4.0 * (1.0 - t);
                basis_gradients[(0, node)] = xi_i * b / c;
                basis_gradients[(1, node)] = eta_i * a / c;
                basis_gradients[(2, node)] = -(a + b) / c + 4.0 * a * b / (c * c);
            }
        }
        basis_gradients[(0, 4)] = 0.0;
        basis_gradients[(1, 4)] = 0.0;
        basis_gradients[(2, 4)] = 1.0;
    }
}
