//! Error types for element resolution and assembly.
use crate::element::Topology;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

/// A topology tag that does not correspond to any supported element kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UnsupportedTopology {
    pub tag: u8,
}

impl Display for UnsupportedTopology {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported element topology tag {}", self.tag)
    }
}

impl Error for UnsupportedTopology {}

/// Failures raised while assembling a single element.
///
/// Every variant carries the index of the offending element.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AssemblyError {
    UnsupportedTopology {
        element: usize,
        tag: u8,
    },
    /// The intrinsic dimension of the topology is not admissible for the smoothing domain.
    TopologyDimensionMismatch {
        element: usize,
        topology: Topology,
        expected_dim: usize,
    },
    NodeCountMismatch {
        element: usize,
        topology: Topology,
        expected: usize,
        actual: usize,
    },
    /// A node index outside of the mesh.
    NodeOutOfBounds {
        element: usize,
        node: usize,
        num_nodes: usize,
    },
    /// Non-positive or non-finite Jacobian, or non-finite gradients.
    InvalidElementGeometry {
        element: usize,
        topology: Topology,
    },
    /// The element couples two nodes that share no element in the connectivity the system
    /// was built for.
    ConnectivityMismatch {
        element: usize,
        nodes: (usize, usize),
    },
}

impl AssemblyError {
    /// The index of the element that failed.
    pub fn element(&self) -> usize {
        match self {
            Self::UnsupportedTopology { element, .. }
            | Self::TopologyDimensionMismatch { element, .. }
            | Self::NodeCountMismatch { element, .. }
            | Self::NodeOutOfBounds { element, .. }
            | Self::InvalidElementGeometry { element, .. }
            | Self::ConnectivityMismatch { element, .. } => *element,
        }
    }
}

impl Display for AssemblyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedTopology { element, tag } => {
                write!(f, "element {}: unsupported topology tag {}", element, tag)
            }
            Self::TopologyDimensionMismatch {
                element,
                topology,
                expected_dim,
            } => write!(
                f,
                "element {}: {} has intrinsic dimension {}, expected {}",
                element,
                topology,
                topology.reference_dim(),
                expected_dim
            ),
            Self::NodeCountMismatch {
                element,
                topology,
                expected,
                actual,
            } => write!(
                f,
                "element {}: {} requires {} nodes, got {}",
                element, topology, expected, actual
            ),
            Self::NodeOutOfBounds {
                element,
                node,
                num_nodes,
            } => write!(
                f,
                "element {}: node index {} out of bounds for mesh with {} nodes",
                element, node, num_nodes
            ),
            Self::InvalidElementGeometry { element, topology } => write!(
                f,
                "element {}: degenerate {} geometry (non-positive or non-finite Jacobian)",
                element, topology
            ),
            Self::ConnectivityMismatch {
                element,
                nodes: (a, b),
            } => write!(
                f,
                "element {}: nodes {} and {} are not coupled in the sparsity pattern of the system",
                element, a, b
            ),
        }
    }
}

impl Error for AssemblyError {}
