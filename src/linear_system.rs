//! The linear solve delegated to by the smoothing pipeline.
use crate::settings::{LinearSolverSettings, PreconditionerKind};
use crate::Real;
use eyre::eyre;
use nalgebra::{DVector, Scalar};
use sobolev_sparse::cg::{BlockConjugateGradient, CgOutput, Preconditioner, SolveError, SolveErrorKind};
use sobolev_sparse::BlockCsrMatrix;

/// Diagnostics of a linear solve.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSolveReport<T> {
    pub iterations: usize,
    pub converged: bool,
    /// Norm of the residual estimate maintained by the solver.
    pub residual_norm: T,
}

/// Solves `A x = b` for the assembled block matrix.
///
/// `solution` holds the initial guess on input. Failing to converge is not an error: the
/// solver returns its last iterate together with a report that says so.
pub trait LinearSolver<T: Scalar> {
    fn solve(
        &mut self,
        matrix: &BlockCsrMatrix<T>,
        rhs: &DVector<T>,
        solution: &mut DVector<T>,
    ) -> eyre::Result<LinearSolveReport<T>>;
}

/// (Preconditioned) Conjugate Gradient with a relative residual stopping criterion.
///
/// Reuses its work vectors across solves.
#[derive(Debug, Clone)]
pub struct ConjugateGradientSolver<T: Scalar> {
    cg: BlockConjugateGradient<T>,
    preconditioner: PreconditionerKind,
}

impl<T: Real> ConjugateGradientSolver<T> {
    pub fn new(tolerance: T, max_iterations: usize) -> Self {
        Self {
            cg: BlockConjugateGradient::new(tolerance, max_iterations),
            preconditioner: PreconditionerKind::Jacobi,
        }
    }

    pub fn from_settings(settings: &LinearSolverSettings) -> Self {
        Self::new(nalgebra::convert(settings.tolerance), settings.max_iterations)
            .with_preconditioner(settings.preconditioner)
    }

    pub fn with_preconditioner(self, preconditioner: PreconditionerKind) -> Self {
        Self { preconditioner, ..self }
    }

    pub fn tolerance(&self) -> T {
        self.cg.tolerance()
    }

    pub fn max_iterations(&self) -> usize {
        self.cg.max_iter()
    }

    pub fn preconditioner(&self) -> PreconditionerKind {
        self.preconditioner
    }
}

impl<T: Real> LinearSolver<T> for ConjugateGradientSolver<T> {
    fn solve(
        &mut self,
        matrix: &BlockCsrMatrix<T>,
        rhs: &DVector<T>,
        solution: &mut DVector<T>,
    ) -> eyre::Result<LinearSolveReport<T>> {
        let preconditioner = match self.preconditioner {
            PreconditionerKind::None => Preconditioner::Identity,
            PreconditionerKind::Jacobi => Preconditioner::jacobi(matrix),
        };
        into_report(self.cg.solve(matrix, &preconditioner, rhs, solution))
    }
}

/// Exhausting the iteration budget, or breaking down on an indefinite system, still leaves a
/// usable iterate, so they become non-converged reports. Everything else is an error.
fn into_report<T: Real>(result: Result<CgOutput<T>, SolveError<T>>) -> eyre::Result<LinearSolveReport<T>> {
    match result {
        Ok(output) => Ok(LinearSolveReport {
            iterations: output.num_iterations,
            converged: true,
            residual_norm: output.approx_residual_norm,
        }),
        Err(error) => match &error.kind {
            SolveErrorKind::MaxIterationsReached { .. }
            | SolveErrorKind::IndefiniteOperator
            | SolveErrorKind::IndefinitePreconditioner => Ok(LinearSolveReport {
                iterations: error.output.num_iterations,
                converged: false,
                residual_norm: error.output.approx_residual_norm,
            }),
            _ => Err(eyre!("{}", error)),
        },
    }
}
