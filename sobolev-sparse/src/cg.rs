//! Preconditioned Conjugate Gradient for symmetric positive definite block systems.
use crate::BlockCsrMatrix;
use core::fmt;
use nalgebra::{DVector, Scalar};
use num::Zero;
use sobolev_traits::Real;

/// Preconditioner applied to the residual in every iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum Preconditioner<T: Scalar> {
    Identity,
    /// Scaling by the inverted scalar diagonal of the matrix.
    Jacobi { inverse_diagonal: DVector<T> },
}

impl<T: Real> Preconditioner<T> {
    /// Jacobi preconditioner built from the scalar diagonal of the given matrix.
    pub fn jacobi(matrix: &BlockCsrMatrix<T>) -> Self {
        Self::jacobi_from_diagonal(matrix.diagonal_iter())
    }

    /// Inverts the given diagonal entries. Entries that are zero or not finite are replaced by one.
    pub fn jacobi_from_diagonal(diagonal: impl IntoIterator<Item = T>) -> Self {
        let inverse_diagonal = diagonal
            .into_iter()
            .map(|d_i| {
                let inv = T::one() / d_i;
                if d_i != T::zero() && inv.is_finite() {
                    inv
                } else {
                    T::one()
                }
            })
            .collect::<Vec<_>>();
        Self::Jacobi {
            inverse_diagonal: DVector::from_vec(inverse_diagonal),
        }
    }

    /// z = P r
    fn apply(&self, z: &mut DVector<T>, r: &DVector<T>) {
        z.copy_from(r);
        if let Self::Jacobi { inverse_diagonal } = self {
            z.component_mul_assign(inverse_diagonal);
        }
    }

    fn dim(&self) -> Option<usize> {
        match self {
            Self::Identity => None,
            Self::Jacobi { inverse_diagonal } => Some(inverse_diagonal.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SolveErrorKind {
    DimensionMismatch { expected: usize, actual: usize },
    IndefiniteOperator,
    IndefinitePreconditioner,
    MaxIterationsReached { max_iter: usize },
}

impl fmt::Display for SolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "Vector of dimension {} does not match system dimension {}", actual, expected)
            }
            Self::IndefiniteOperator => write!(f, "Operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "Indefinite preconditioner"),
            Self::MaxIterationsReached { max_iter } => {
                write!(f, "Max iterations ({}) reached.", max_iter)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CgOutput<T> {
    /// Number of updates made to the initial guess.
    pub num_iterations: usize,
    /// Norm of the approximate residual maintained by CG when the solver returned.
    pub approx_residual_norm: T,
}

/// A failed solve, together with the state of the iteration when it stopped.
///
/// The solution vector holds the last iterate.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveError<T> {
    pub output: CgOutput<T>,
    pub kind: SolveErrorKind,
}

impl<T> fmt::Display for SolveError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CG solve failed after {} iterations. Error: {}",
            self.output.num_iterations, self.kind
        )
    }
}

impl<T: fmt::Debug> std::error::Error for SolveError<T> {}

/// Conjugate Gradient on a [`BlockCsrMatrix`] with the relative residual criterion
/// `||r|| <= tol * ||b||`.
///
/// The criterion uses the residual recurrence of CG rather than `b - Ax`. The work vectors
/// are kept between solves, so repeated solves of the same dimension do not allocate.
#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct BlockConjugateGradient<T: Scalar> {
    tolerance: T,
    max_iter: usize,
    r: DVector<T>,
    z: DVector<T>,
    p: DVector<T>,
    Ap: DVector<T>,
}

impl<T: Scalar + Zero + Copy> BlockConjugateGradient<T> {
    pub fn new(tolerance: T, max_iter: usize) -> Self {
        Self {
            tolerance,
            max_iter,
            r: DVector::zeros(0),
            z: DVector::zeros(0),
            p: DVector::zeros(0),
            Ap: DVector::zeros(0),
        }
    }

    pub fn tolerance(&self) -> T {
        self.tolerance
    }

    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    fn resize(&mut self, dim: usize) {
        for buffer in [&mut self.r, &mut self.z, &mut self.p, &mut self.Ap] {
            buffer.resize_vertically_mut(dim, T::zero());
        }
    }
}

impl<T: Real + Send + Sync> BlockConjugateGradient<T> {
    /// Solves `A x = b`, using `x` as the initial guess.
    ///
    /// A zero right-hand side yields `x = 0` without iterating.
    #[allow(non_snake_case)]
    pub fn solve(
        &mut self,
        matrix: &BlockCsrMatrix<T>,
        preconditioner: &Preconditioner<T>,
        b: &DVector<T>,
        x: &mut DVector<T>,
    ) -> Result<CgOutput<T>, SolveError<T>> {
        use SolveErrorKind::*;
        let mut output = CgOutput {
            num_iterations: 0,
            approx_residual_norm: T::zero(),
        };

        let dim = matrix.nrows();
        let mismatch = [b.len(), x.len(), matrix.ncols()]
            .into_iter()
            .chain(preconditioner.dim())
            .find(|&actual| actual != dim);
        if let Some(actual) = mismatch {
            return Err(SolveError {
                output,
                kind: DimensionMismatch { expected: dim, actual },
            });
        }

        let b_norm = b.norm();
        if b_norm == T::zero() {
            x.fill(T::zero());
            return Ok(output);
        }

        self.resize(dim);
        let Self {
            tolerance,
            max_iter,
            r,
            z,
            p,
            Ap,
        } = self;

        // r = b - Ax
        matrix.spmv((&mut *r).into(), (&*x).into());
        r.zip_apply(b, |Ax_i, b_i| *Ax_i = b_i - *Ax_i);
        output.approx_residual_norm = r.norm();

        preconditioner.apply(z, r);
        p.copy_from(z);
        let mut zTr = z.dot(r);

        while output.approx_residual_norm > *tolerance * b_norm {
            if output.num_iterations >= *max_iter {
                return Err(SolveError {
                    output,
                    kind: MaxIterationsReached { max_iter: *max_iter },
                });
            }

            matrix.spmv((&mut *Ap).into(), (&*p).into());
            let pAp = p.dot(Ap);
            if pAp <= T::zero() {
                return Err(SolveError {
                    output,
                    kind: IndefiniteOperator,
                });
            }
            if zTr <= T::zero() {
                return Err(SolveError {
                    output,
                    kind: IndefinitePreconditioner,
                });
            }

            let alpha = zTr / pAp;
            x.zip_apply(p, |x_i, p_i| *x_i += alpha * p_i);
            r.zip_apply(Ap, |r_i, Ap_i| *r_i -= alpha * Ap_i);
            output.num_iterations += 1;
            output.approx_residual_norm = r.norm();

            preconditioner.apply(z, r);
            let zTr_next = z.dot(r);
            let beta = zTr_next / zTr;
            p.zip_apply(z, |p_i, z_i| *p_i = z_i + beta * *p_i);
            zTr = zTr_next;
        }

        Ok(output)
    }
}
