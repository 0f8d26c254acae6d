//! The geometry consumed by the smoothing pipeline.
use crate::Real;
use eyre::eyre;
use nalgebra::{DMatrix, DMatrixView, Scalar};

pub mod procedural;

/// Read access to the mesh on which a sensitivity field is smoothed.
///
/// Nodes are identified by global indices `0..num_nodes()`. Elements reference their nodes in
/// the local ordering of the reference element of their topology, and carry their topology as
/// a VTK cell type id.
pub trait SmoothingGeometry<T: Scalar> {
    /// The ambient dimension of the node coordinates.
    fn coordinate_dim(&self) -> usize;

    fn num_nodes(&self) -> usize;

    fn num_elements(&self) -> usize;

    /// The VTK cell type id of the element.
    fn element_tag(&self, element: usize) -> u8;

    /// Global node indices of the element in local node order.
    fn element_nodes(&self, element: usize) -> &[usize];

    /// Reference coordinates of all nodes, one column per node.
    fn reference_coordinates(&self) -> DMatrixView<T>;

    fn num_markers(&self) -> usize;

    fn marker_name(&self, marker: usize) -> &str;

    /// Global indices of the nodes tagged by the marker.
    fn marker_nodes(&self, marker: usize) -> &[usize];

    /// Whether the node is a halo copy of a node owned by another partition.
    fn is_halo(&self, _node: usize) -> bool {
        false
    }
}

/// A named group of boundary nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub name: String,
    pub nodes: Vec<usize>,
}

/// An in-memory mesh with flat element connectivity.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingMesh<T: Scalar> {
    coordinates: DMatrix<T>,
    element_tags: Vec<u8>,
    element_offsets: Vec<usize>,
    element_indices: Vec<usize>,
    markers: Vec<Marker>,
    halo: Vec<bool>,
}

impl<T: Real> SmoothingMesh<T> {
    /// Creates a mesh without elements from node coordinates, one column per node.
    pub fn from_coordinates(coordinates: DMatrix<T>) -> Self {
        let num_nodes = coordinates.ncols();
        Self {
            coordinates,
            element_tags: Vec::new(),
            element_offsets: vec![0],
            element_indices: Vec::new(),
            markers: Vec::new(),
            halo: vec![false; num_nodes],
        }
    }

    /// Appends an element and returns its index.
    ///
    /// The tag is stored as given. Whether it is supported, and whether the node count matches
    /// the topology, is checked when the element is assembled.
    pub fn add_element(&mut self, tag: u8, nodes: &[usize]) -> eyre::Result<usize> {
        let num_nodes = self.coordinates.ncols();
        if let Some(node) = nodes.iter().find(|&&node| node >= num_nodes) {
            return Err(eyre!(
                "element node index {} out of bounds for mesh with {} nodes",
                node,
                num_nodes
            ));
        }
        self.element_tags.push(tag);
        self.element_indices.extend_from_slice(nodes);
        self.element_offsets.push(self.element_indices.len());
        Ok(self.element_tags.len() - 1)
    }

    pub fn add_marker(&mut self, name: impl Into<String>, nodes: Vec<usize>) -> eyre::Result<()> {
        let name = name.into();
        let num_nodes = self.coordinates.ncols();
        if let Some(node) = nodes.iter().find(|&&node| node >= num_nodes) {
            return Err(eyre!(
                "marker {}: node index {} out of bounds for mesh with {} nodes",
                name,
                node,
                num_nodes
            ));
        }
        self.markers.push(Marker { name, nodes });
        Ok(())
    }

    /// Flags the node as owned by another partition.
    pub fn set_halo(&mut self, node: usize, is_halo: bool) {
        self.halo[node] = is_halo;
    }

    pub fn coordinates(&self) -> &DMatrix<T> {
        &self.coordinates
    }

    pub fn coordinates_mut(&mut self) -> &mut DMatrix<T> {
        &mut self.coordinates
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Applies the map to the coordinates of every node.
    pub fn transform_coordinates(&mut self, mut map: impl FnMut(DMatrixView<T>) -> DMatrix<T>) {
        let transformed = map(self.coordinates.as_view());
        assert_eq!(transformed.shape(), self.coordinates.shape(), "Map must preserve the shape");
        self.coordinates = transformed;
    }
}

impl<T: Real> SmoothingGeometry<T> for SmoothingMesh<T> {
    fn coordinate_dim(&self) -> usize {
        self.coordinates.nrows()
    }

    fn num_nodes(&self) -> usize {
        self.coordinates.ncols()
    }

    fn num_elements(&self) -> usize {
        self.element_tags.len()
    }

    fn element_tag(&self, element: usize) -> u8 {
        self.element_tags[element]
    }

    fn element_nodes(&self, element: usize) -> &[usize] {
        let begin = self.element_offsets[element];
        let end = self.element_offsets[element + 1];
        &self.element_indices[begin..end]
    }

    fn reference_coordinates(&self) -> DMatrixView<T> {
        self.coordinates.as_view()
    }

    fn num_markers(&self) -> usize {
        self.markers.len()
    }

    fn marker_name(&self, marker: usize) -> &str {
        &self.markers[marker].name
    }

    fn marker_nodes(&self, marker: usize) -> &[usize] {
        &self.markers[marker].nodes
    }

    fn is_halo(&self, node: usize) -> bool {
        self.halo[node]
    }
}
