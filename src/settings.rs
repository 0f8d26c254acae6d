//! Configuration of the smoothing pipeline.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether smoothing acts on the full volume or on a surface one dimension below the
/// ambient space.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingDomain {
    #[default]
    Volume,
    Surface,
}

/// The kind of condition imposed on the nodes of a boundary marker.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryConditionKind {
    /// Homogeneous Dirichlet: the smoothed field vanishes on the marker.
    Essential,
    /// Homogeneous Neumann, satisfied by the weak form without modification.
    Natural,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PreconditionerKind {
    None,
    #[default]
    Jacobi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearSolverSettings {
    /// Relative residual tolerance.
    pub tolerance: f64,
    pub max_iterations: usize,
    pub preconditioner: PreconditionerKind,
}

impl Default for LinearSolverSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 1000,
            preconditioner: PreconditionerKind::default(),
        }
    }
}

/// Parameters of the operator `-epsilon^2 Δu + zeta u` and its boundary conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingSettings {
    /// Diffusion strength.
    pub epsilon: f64,
    /// Reaction strength.
    pub zeta: f64,
    pub domain: SmoothingDomain,
    /// Boundary condition kind per marker name. Markers of the mesh that are not listed are
    /// treated as natural.
    pub markers: BTreeMap<String, BoundaryConditionKind>,
    pub linear_solver: LinearSolverSettings,
}

impl Default for SmoothingSettings {
    fn default() -> Self {
        Self {
            epsilon: 1.0,
            zeta: 1.0,
            domain: SmoothingDomain::default(),
            markers: BTreeMap::new(),
            linear_solver: LinearSolverSettings::default(),
        }
    }
}

impl SmoothingSettings {
    pub fn with_marker(mut self, name: impl Into<String>, kind: BoundaryConditionKind) -> Self {
        self.markers.insert(name.into(), kind);
        self
    }

    pub fn with_parameters(self, epsilon: f64, zeta: f64) -> Self {
        Self { epsilon, zeta, ..self }
    }

    pub fn with_domain(self, domain: SmoothingDomain) -> Self {
        Self { domain, ..self }
    }
}
