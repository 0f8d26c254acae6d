//! Sobolev gradient smoothing with linear isoparametric finite elements.
//!
//! A per-node sensitivity field is smoothed by solving the diffusion-reaction problem
//! `-epsilon^2 Δu + zeta u = s` over an unstructured mesh of segments, triangles,
//! quadrilaterals, tetrahedra, pyramids, prisms or hexahedra, either in the full volume or on a
//! surface embedded one dimension higher. See [`solver::GradientSmoothingSolver`].
pub mod assembly;
pub mod element;
pub mod error;
pub mod field;
pub mod linear_system;
pub mod mesh;
pub mod quadrature;
pub mod settings;
pub mod solver;

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate sobolev_sparse as sparse;

pub use sobolev_traits::Real;
