//! Element-local evaluation of the smoothing operator.
use crate::element::{Element, Frame};
use crate::Real;
use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut, DVector};

/// The local bilinear forms of the diffusion-reaction operator `-eps^2 Δu + zeta u`.
///
/// Every spatial component is smoothed independently, so the diffusion contribution of a node
/// pair is a multiple of the identity block.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingOperator<T> {
    epsilon: T,
    zeta: T,
    gradient_dim: Option<usize>,
}

impl<T: Real> SmoothingOperator<T> {
    pub fn new(epsilon: T, zeta: T) -> Self {
        Self {
            epsilon,
            zeta,
            gradient_dim: None,
        }
    }

    /// Sets the number of gradient components entering the inner product `∇N_i · ∇N_j`.
    ///
    /// Defaults to the coordinate dimension of the element. Surface smoothing uses the
    /// intrinsic dimension plus one, so that tangential gradients are measured in the
    /// embedding space.
    pub fn with_gradient_dim(self, gradient_dim: usize) -> Self {
        Self {
            gradient_dim: Some(gradient_dim),
            ..self
        }
    }

    pub fn epsilon(&self) -> T {
        self.epsilon
    }

    pub fn zeta(&self) -> T {
        self.zeta
    }

    /// The configured gradient dimension, if any.
    pub fn gradient_dim(&self) -> Option<usize> {
        self.gradient_dim
    }

    /// Accumulates the diffusion (`DHiDHj`) and reaction (`HiHj`) blocks of the element.
    ///
    /// Reference-frame gradients must have been computed beforehand, and the accumulators
    /// cleared: contributions are added to whatever the element holds.
    ///
    /// # Panics
    ///
    /// Panics if the configured gradient dimension exceeds the coordinate dimension of the element.
    pub fn compute_tangent_matrix(&self, element: &mut Element<T>) {
        let frame = Frame::Reference;
        let n = element.num_nodes();
        let bd = element.block_dim();
        let gradient_dim = self.gradient_dim.unwrap_or(element.coord_dim());
        assert!(
            gradient_dim <= element.coord_dim(),
            "Gradient dimension exceeds coordinate dimension of element"
        );

        let eps2 = self.epsilon * self.epsilon;
        let mut block = DMatrix::zeros(bd, bd);

        for g in 0..element.num_gauss_points() {
            let weight = element.integration_weight(frame, g);

            // Upper triangle only, the lower triangle is the transposed mirror
            for i in 0..n {
                for j in i..n {
                    let gradients = element.gradients_at(frame, g);
                    let dot = gradients
                        .rows(0, gradient_dim)
                        .column(i)
                        .dot(&gradients.rows(0, gradient_dim).column(j));
                    block.fill_diagonal(weight * eps2 * dot);
                    element.add_dhidhj(i, j, block.as_view());
                    if i != j {
                        element.add_dhidhj_t(j, i, block.as_view());
                    }
                }
            }

            for i in 0..n {
                for j in 0..n {
                    let n_i = element.basis_value(i, g);
                    let n_j = element.basis_value(j, g);
                    element.add_hihj(i, j, weight * self.zeta * n_i * n_j);
                }
            }
        }
    }
}

/// Writes the system blocks `DHiDHj(i, j) + HiHj(i, j) I` of all node pairs into `output`.
///
/// The blocks are laid out like the element accumulators: block `(i, j)` occupies
/// `block_dim^2` column-major entries at offset `(i * num_nodes + j) * block_dim^2`.
pub fn populate_system_blocks<T: Real>(element: &Element<T>, output: &mut Vec<T>) {
    let n = element.num_nodes();
    let bd = element.block_dim();
    output.clear();
    output.reserve(n * n * bd * bd);
    for i in 0..n {
        for j in 0..n {
            let mut block = element.dhidhj(i, j).clone_owned();
            for k in 0..bd {
                block[(k, k)] += element.hihj(i, j);
            }
            output.extend_from_slice(block.as_slice());
        }
    }
}

/// Accumulates the consistent load `∫ N_i s_h` of the element into `rhs`.
///
/// `sensitivities` holds the nodal field values of the element, one column per local node.
/// The field is interpolated at each quadrature point with the element's shape functions.
/// Reference-frame gradients (and thereby Jacobians) must have been computed beforehand.
///
/// # Panics
///
/// Panics if the dimensions of `sensitivities` and `rhs` disagree or do not have one column
/// per node.
pub fn assemble_element_load<T: Real>(element: &Element<T>, sensitivities: DMatrixView<T>, mut rhs: DMatrixViewMut<T>) {
    let n = element.num_nodes();
    assert_eq!(sensitivities.ncols(), n, "Expected one column per element node");
    assert_eq!(rhs.shape(), sensitivities.shape(), "Dimension mismatch");

    let mut basis_values = DVector::zeros(n);
    for g in 0..element.num_gauss_points() {
        let weight = element.integration_weight(Frame::Reference, g);
        basis_values.copy_from(&element.reference().basis_values_at(g));
        let s_g = &sensitivities * &basis_values;
        for (i, n_i) in basis_values.iter().enumerate() {
            rhs.column_mut(i).axpy(weight * *n_i, &s_g, T::one());
        }
    }
}
