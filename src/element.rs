//! Reference elements, shape functions and isoparametric elements.
use crate::error::UnsupportedTopology;
use crate::quadrature::QuadratureRule;
use crate::Real;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, Scalar};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

mod hexahedron;
mod isoparametric;
mod prism;
mod pyramid;
mod quadrilateral;
mod segment;
mod tetrahedron;
mod triangle;

pub use hexahedron::Hex8Element;
pub use isoparametric::{Element, Frame};
pub use prism::Prism6Element;
pub use pyramid::Pyramid5Element;
pub use quadrilateral::Quad4Element;
pub use segment::Segment2Element;
pub use tetrahedron::Tet4Element;
pub use triangle::Tri3Element;

/// The element topologies supported by the assembly.
///
/// Topologies are identified by their VTK cell type ids when supplied by a mesh.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topology {
    /// Two-node line, only used for surface smoothing of planar meshes.
    Segment,
    Triangle,
    Quadrilateral,
    Tetrahedron,
    Pyramid,
    Prism,
    Hexahedron,
}

impl Topology {
    pub const ALL: [Topology; 7] = [
        Topology::Segment,
        Topology::Triangle,
        Topology::Quadrilateral,
        Topology::Tetrahedron,
        Topology::Pyramid,
        Topology::Prism,
        Topology::Hexahedron,
    ];

    pub fn num_nodes(&self) -> usize {
        match self {
            Self::Segment => 2,
            Self::Triangle => 3,
            Self::Quadrilateral => 4,
            Self::Tetrahedron => 4,
            Self::Pyramid => 5,
            Self::Prism => 6,
            Self::Hexahedron => 8,
        }
    }

    /// The intrinsic (parametric) dimension of the topology.
    pub fn reference_dim(&self) -> usize {
        match self {
            Self::Segment => 1,
            Self::Triangle | Self::Quadrilateral => 2,
            Self::Tetrahedron | Self::Pyramid | Self::Prism | Self::Hexahedron => 3,
        }
    }

    pub fn vtk_type(&self) -> u8 {
        match self {
            Self::Segment => 3,
            Self::Triangle => 5,
            Self::Quadrilateral => 9,
            Self::Tetrahedron => 10,
            Self::Hexahedron => 12,
            Self::Prism => 13,
            Self::Pyramid => 14,
        }
    }
}

impl TryFrom<u8> for Topology {
    type Error = UnsupportedTopology;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|topology| topology.vtk_type() == tag)
            .ok_or(UnsupportedTopology { tag })
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Segment => "segment",
            Self::Triangle => "triangle",
            Self::Quadrilateral => "quadrilateral",
            Self::Tetrahedron => "tetrahedron",
            Self::Pyramid => "pyramid",
            Self::Prism => "prism",
            Self::Hexahedron => "hexahedron",
        };
        write!(f, "{}", name)
    }
}

/// Shape functions of a reference element.
///
/// Reference coordinates are passed as slices of length [`Topology::reference_dim`].
pub trait ReferenceFiniteElement<T: Scalar> {
    fn topology(&self) -> Topology;

    /// Returns the number of nodes in the element.
    fn num_nodes(&self) -> usize {
        self.topology().num_nodes()
    }

    fn reference_dim(&self) -> usize {
        self.topology().reference_dim()
    }

    /// Coordinates of the nodes in the reference domain, one column per node.
    fn reference_nodes(&self) -> DMatrix<T>;

    /// Evaluates each basis function at the given reference coordinates.
    ///
    /// # Panics
    ///
    /// Implementations panic if `basis_values` does not have one entry per node.
    fn populate_basis(&self, basis_values: &mut [T], reference_coords: &[T]);

    /// Populates a `reference_dim x num_nodes` matrix whose columns are the reference
    /// gradients of each shape function.
    fn populate_basis_gradients(&self, basis_gradients: DMatrixViewMut<T>, reference_coords: &[T]);
}

/// Returns the reference finite element with linear shape functions for the given topology.
pub fn linear_reference_element<T: Real>(topology: Topology) -> Box<dyn ReferenceFiniteElement<T>> {
    match topology {
        Topology::Segment => Box::new(Segment2Element),
        Topology::Triangle => Box::new(Tri3Element),
        Topology::Quadrilateral => Box::new(Quad4Element),
        Topology::Tetrahedron => Box::new(Tet4Element),
        Topology::Pyramid => Box::new(Pyramid5Element),
        Topology::Prism => Box::new(Prism6Element),
        Topology::Hexahedron => Box::new(Hex8Element),
    }
}

/// Tabulated shape function data of a topology at the points of its quadrature rule.
///
/// Built once per topology and shared by all elements of that topology.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceElement<T: Scalar> {
    topology: Topology,
    quadrature: QuadratureRule<T>,
    /// `num_nodes x num_gauss_points`, column `g` holds the basis values at point `g`.
    basis_values: DMatrix<T>,
    /// One `reference_dim x num_nodes` matrix per quadrature point.
    basis_gradients: Vec<DMatrix<T>>,
}

impl<T: Real> ReferenceElement<T> {
    /// Tabulates the linear reference element of the topology with its default quadrature rule.
    pub fn new(topology: Topology) -> Self {
        let element = linear_reference_element(topology);
        Self::from_finite_element(element.as_ref(), QuadratureRule::for_topology(topology))
    }

    /// # Panics
    ///
    /// Panics if the dimension of the quadrature rule does not match the element.
    pub fn from_finite_element(element: &dyn ReferenceFiniteElement<T>, quadrature: QuadratureRule<T>) -> Self {
        let n = element.num_nodes();
        let ref_dim = element.reference_dim();
        assert_eq!(quadrature.dim(), ref_dim, "Quadrature dimension must match reference dimension");

        let num_points = quadrature.num_points();
        let mut basis_values = DMatrix::zeros(n, num_points);
        let mut basis_gradients = Vec::with_capacity(num_points);
        for (g, xi) in quadrature.points().iter().enumerate() {
            element.populate_basis(basis_values.column_mut(g).as_mut_slice(), xi.as_slice());
            let mut gradients = DMatrix::zeros(ref_dim, n);
            element.populate_basis_gradients(gradients.as_view_mut(), xi.as_slice());
            basis_gradients.push(gradients);
        }

        Self {
            topology: element.topology(),
            quadrature,
            basis_values,
            basis_gradients,
        }
    }
}

impl<T: Scalar> ReferenceElement<T> {
    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn num_nodes(&self) -> usize {
        self.basis_values.nrows()
    }

    pub fn reference_dim(&self) -> usize {
        self.topology.reference_dim()
    }

    pub fn num_gauss_points(&self) -> usize {
        self.quadrature.num_points()
    }

    pub fn quadrature(&self) -> &QuadratureRule<T> {
        &self.quadrature
    }

    pub fn gauss_weights(&self) -> &[T] {
        self.quadrature.weights()
    }

    pub fn gauss_weight(&self, g: usize) -> T {
        self.quadrature.weights()[g].clone()
    }

    pub fn basis_value(&self, node: usize, g: usize) -> T {
        self.basis_values[(node, g)].clone()
    }

    /// Basis values of all nodes at quadrature point `g`.
    pub fn basis_values_at(&self, g: usize) -> DVectorView<T> {
        self.basis_values.column(g)
    }

    /// Reference gradients (`reference_dim x num_nodes`) at quadrature point `g`.
    pub fn basis_gradients_at(&self, g: usize) -> &DMatrix<T> {
        &self.basis_gradients[g]
    }

    /// The reference gradient of `node` in reference direction `dim` at quadrature point `g`.
    pub fn basis_gradient(&self, node: usize, g: usize, dim: usize) -> T {
        self.basis_gradients[g][(dim, node)].clone()
    }
}

/// Convenience for evaluating all basis functions of a reference element at a single point.
pub fn evaluate_basis<T: Real>(element: &dyn ReferenceFiniteElement<T>, reference_coords: &[T]) -> DVector<T> {
    let mut values = DVector::zeros(element.num_nodes());
    element.populate_basis(values.as_mut_slice(), reference_coords);
    values
}

/// Convenience for evaluating all reference gradients of a reference element at a single point.
pub fn evaluate_basis_gradients<T: Real>(element: &dyn ReferenceFiniteElement<T>, reference_coords: &[T]) -> DMatrix<T> {
    let mut gradients = DMatrix::zeros(element.reference_dim(), element.num_nodes());
    element.populate_basis_gradients(gradients.as_view_mut(), reference_coords);
    gradients
}
