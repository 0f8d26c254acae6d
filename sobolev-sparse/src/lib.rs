//! Sparse linear algebra for sobolev.
//!
//! Provides the block sparse matrix that the finite element assembly scatters into, together with
//! a Jacobi-preconditioned Conjugate Gradient solver for it.
pub mod block;
pub mod cg;

pub use block::{BlockCsrMatrix, BlockRowMut};
pub use nalgebra_sparse;
