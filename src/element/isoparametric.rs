use crate::element::{ReferenceElement, Topology};
use crate::Real;
use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut, Matrix2, Matrix3, Matrix3x2, Scalar, Vector2, Vector3};
use std::sync::Arc;

/// The configuration in which gradients are computed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Frame {
    /// The undeformed configuration given by the reference coordinates.
    Reference,
    /// The deformed configuration given by the current coordinates.
    Current,
}

/// Per-frame results of [`Element::compute_gradients`].
#[derive(Debug, Clone, PartialEq)]
struct FrameData<T> {
    /// One `coord_dim x num_nodes` column-major block per quadrature point.
    gradients: Vec<T>,
    /// The Jacobian scalar entering the integration weight, one per quadrature point.
    jacobians: Vec<T>,
}

impl<T: Real> FrameData<T> {
    fn zeros(num_gauss_points: usize, coord_dim: usize, num_nodes: usize) -> Self {
        Self {
            gradients: vec![T::zero(); num_gauss_points * coord_dim * num_nodes],
            jacobians: vec![T::zero(); num_gauss_points],
        }
    }
}

/// An isoparametric element instance.
///
/// Holds the nodal coordinates of one mesh element together with the physical gradients
/// computed from the shared [`ReferenceElement`], and accumulators for node-pair blocks.
///
/// Node coordinates may either live in the element's intrinsic dimension, or in one dimension
/// higher, in which case the element is treated as embedded (a curve in the plane or a surface
/// in space) and gradients are tangential.
///
/// Node-pair blocks are `block_dim x block_dim`, where the block dimension equals the coordinate
/// dimension. They are stored contiguously in column-major order, block `(a, b)` at offset
/// `(a * num_nodes + b) * block_dim^2`.
#[derive(Debug, Clone)]
pub struct Element<T: Scalar> {
    reference: Arc<ReferenceElement<T>>,
    coord_dim: usize,
    ref_coords: DMatrix<T>,
    current_coords: DMatrix<T>,
    ref_frame: FrameData<T>,
    current_frame: FrameData<T>,
    kab: Vec<T>,
    dhidhj: Vec<T>,
    hihj: Vec<T>,
}

impl<T: Real> Element<T> {
    /// Creates an element with zero coordinates and cleared accumulators.
    ///
    /// # Panics
    ///
    /// Panics unless `coord_dim` is the reference dimension of the element or one larger,
    /// and at most three.
    pub fn new(reference: Arc<ReferenceElement<T>>, coord_dim: usize) -> Self {
        let ref_dim = reference.reference_dim();
        assert!(
            (coord_dim == ref_dim || coord_dim == ref_dim + 1) && coord_dim <= 3,
            "Coordinate dimension {} is not admissible for a {} element",
            coord_dim,
            reference.topology()
        );
        let n = reference.num_nodes();
        let num_gauss = reference.num_gauss_points();
        Self {
            coord_dim,
            ref_coords: DMatrix::zeros(coord_dim, n),
            current_coords: DMatrix::zeros(coord_dim, n),
            ref_frame: FrameData::zeros(num_gauss, coord_dim, n),
            current_frame: FrameData::zeros(num_gauss, coord_dim, n),
            kab: vec![T::zero(); n * n * coord_dim * coord_dim],
            dhidhj: vec![T::zero(); n * n * coord_dim * coord_dim],
            hihj: vec![T::zero(); n * n],
            reference,
        }
    }

    /// Copies the coordinates of the given global nodes (columns of `coordinates`) into
    /// the reference coordinates of the element.
    ///
    /// # Panics
    ///
    /// Panics if the number of nodes or the coordinate dimension does not match.
    pub fn set_ref_coords_from(&mut self, coordinates: DMatrixView<T>, nodes: &[usize]) {
        assert_eq!(nodes.len(), self.num_nodes(), "Node count mismatch");
        assert_eq!(coordinates.nrows(), self.coord_dim, "Coordinate dimension mismatch");
        for (local, &global) in nodes.iter().enumerate() {
            self.ref_coords
                .column_mut(local)
                .copy_from(&coordinates.column(global));
        }
    }

    /// Computes physical gradients and Jacobian scalars at every quadrature point
    /// from the coordinates of the given frame.
    ///
    /// No guard against degenerate geometry is in place: a vanishing Jacobian leads to
    /// non-finite gradients, which may be detected with [`Element::is_valid`].
    pub fn compute_gradients(&mut self, frame: Frame) {
        let (coords, data) = match frame {
            Frame::Reference => (&self.ref_coords, &mut self.ref_frame),
            Frame::Current => (&self.current_coords, &mut self.current_frame),
        };
        let d = self.coord_dim;
        let n = self.reference.num_nodes();
        let ref_dim = self.reference.reference_dim();

        for (g, gradients) in data.gradients.chunks_exact_mut(d * n).enumerate() {
            let dn = self.reference.basis_gradients_at(g);
            let gradients = DMatrixViewMut::from_slice(gradients, d, n);
            data.jacobians[g] = match (ref_dim, d) {
                (1, 1) => gradients_1d(coords, dn, gradients),
                (1, 2) => gradients_1d_embedded(coords, dn, gradients),
                (2, 2) => {
                    let det = gradients_2d(coords, dn, gradients);
                    match frame {
                        Frame::Reference => corner_area_2d(coords),
                        Frame::Current => det,
                    }
                }
                (2, 3) => gradients_2d_embedded(coords, dn, gradients),
                (3, 3) => gradients_3d(coords, dn, gradients),
                _ => unreachable!("Coordinate dimension is validated on construction"),
            };
        }
    }

    /// Whether the last gradient computation in the given frame produced positive, finite
    /// Jacobian scalars and finite gradients at every quadrature point.
    pub fn is_valid(&self, frame: Frame) -> bool {
        let data = self.frame_data(frame);
        data.jacobians
            .iter()
            .all(|j| j.is_finite() && *j > T::zero())
            && data.gradients.iter().all(|g| g.is_finite())
    }

    /// Zeroes the `Kab`, `DHiDHj` and `HiHj` accumulators.
    pub fn clear_element(&mut self) {
        self.kab.fill(T::zero());
        self.dhidhj.fill(T::zero());
        self.hihj.fill(T::zero());
    }

    pub fn add_kab(&mut self, a: usize, b: usize, block: DMatrixView<T>) {
        let mut target = self.block_mut(BlockStore::Kab, a, b);
        target += block;
    }

    pub fn add_kab_t(&mut self, a: usize, b: usize, block: DMatrixView<T>) {
        let mut target = self.block_mut(BlockStore::Kab, a, b);
        target += block.transpose();
    }

    pub fn add_dhidhj(&mut self, a: usize, b: usize, block: DMatrixView<T>) {
        let mut target = self.block_mut(BlockStore::DHiDHj, a, b);
        target += block;
    }

    pub fn add_dhidhj_t(&mut self, a: usize, b: usize, block: DMatrixView<T>) {
        let mut target = self.block_mut(BlockStore::DHiDHj, a, b);
        target += block.transpose();
    }

    pub fn add_hihj(&mut self, a: usize, b: usize, value: T) {
        let n = self.num_nodes();
        self.hihj[a * n + b] += value;
    }

    fn block_mut(&mut self, store: BlockStore, a: usize, b: usize) -> DMatrixViewMut<T> {
        let bd = self.coord_dim;
        let range = self.block_range(a, b);
        let values = match store {
            BlockStore::Kab => &mut self.kab,
            BlockStore::DHiDHj => &mut self.dhidhj,
        };
        DMatrixViewMut::from_slice(&mut values[range], bd, bd)
    }
}

#[derive(Debug, Copy, Clone)]
enum BlockStore {
    Kab,
    DHiDHj,
}

impl<T: Scalar> Element<T> {
    pub fn reference(&self) -> &Arc<ReferenceElement<T>> {
        &self.reference
    }

    pub fn topology(&self) -> Topology {
        self.reference.topology()
    }

    pub fn num_nodes(&self) -> usize {
        self.reference.num_nodes()
    }

    pub fn num_gauss_points(&self) -> usize {
        self.reference.num_gauss_points()
    }

    pub fn reference_dim(&self) -> usize {
        self.reference.reference_dim()
    }

    /// The dimension of the node coordinates, which is also the dimension of the gradients.
    pub fn coord_dim(&self) -> usize {
        self.coord_dim
    }

    /// The dimension of the node-pair blocks.
    pub fn block_dim(&self) -> usize {
        self.coord_dim
    }

    /// Whether the element lives in a space one dimension higher than its reference domain.
    pub fn is_embedded(&self) -> bool {
        self.coord_dim > self.reference.reference_dim()
    }

    pub fn set_ref_coord(&mut self, node: usize, coords: &[T]) {
        assert_eq!(coords.len(), self.coord_dim, "Coordinate dimension mismatch");
        self.ref_coords.column_mut(node).copy_from_slice(coords);
    }

    pub fn set_current_coord(&mut self, node: usize, coords: &[T]) {
        assert_eq!(coords.len(), self.coord_dim, "Coordinate dimension mismatch");
        self.current_coords.column_mut(node).copy_from_slice(coords);
    }

    /// Reference coordinates, one column per node.
    pub fn ref_coords(&self) -> &DMatrix<T> {
        &self.ref_coords
    }

    /// Current coordinates, one column per node.
    pub fn current_coords(&self) -> &DMatrix<T> {
        &self.current_coords
    }

    pub fn gauss_weight(&self, g: usize) -> T {
        self.reference.gauss_weight(g)
    }

    pub fn basis_value(&self, node: usize, g: usize) -> T {
        self.reference.basis_value(node, g)
    }

    fn frame_data(&self, frame: Frame) -> &FrameData<T> {
        match frame {
            Frame::Reference => &self.ref_frame,
            Frame::Current => &self.current_frame,
        }
    }

    /// The Jacobian scalar of the frame at quadrature point `g`.
    pub fn jacobian_det(&self, frame: Frame, g: usize) -> T {
        self.frame_data(frame).jacobians[g].clone()
    }

    /// The physical gradient of `node` in direction `dim` at quadrature point `g`.
    pub fn gradient(&self, frame: Frame, node: usize, g: usize, dim: usize) -> T {
        self.gradients_at(frame, g)[(dim, node)].clone()
    }

    /// Physical gradients (`coord_dim x num_nodes`) at quadrature point `g`.
    pub fn gradients_at(&self, frame: Frame, g: usize) -> DMatrixView<T> {
        let d = self.coord_dim;
        let n = self.num_nodes();
        let gradients = &self.frame_data(frame).gradients[g * d * n..(g + 1) * d * n];
        DMatrixView::from_slice(gradients, d, n)
    }

    fn block_range(&self, a: usize, b: usize) -> std::ops::Range<usize> {
        let n = self.num_nodes();
        assert!(a < n && b < n, "Node index out of bounds");
        let bd2 = self.coord_dim * self.coord_dim;
        let offset = (a * n + b) * bd2;
        offset..offset + bd2
    }

    pub fn kab(&self, a: usize, b: usize) -> DMatrixView<T> {
        DMatrixView::from_slice(&self.kab[self.block_range(a, b)], self.coord_dim, self.coord_dim)
    }

    pub fn dhidhj(&self, a: usize, b: usize) -> DMatrixView<T> {
        DMatrixView::from_slice(&self.dhidhj[self.block_range(a, b)], self.coord_dim, self.coord_dim)
    }

    pub fn hihj(&self, a: usize, b: usize) -> T {
        self.hihj[a * self.num_nodes() + b].clone()
    }
}

impl<T: Real> Element<T> {
    /// Gauss weight times the Jacobian scalar of the frame.
    pub fn integration_weight(&self, frame: Frame, g: usize) -> T {
        self.gauss_weight(g) * self.jacobian_det(frame, g)
    }
}

/// `J[a][b] = sum_node X[b][node] dN[a][node]`.
fn jacobian_entry<T: Real>(coords: &DMatrix<T>, dn: &DMatrix<T>, a: usize, b: usize) -> T {
    (0..coords.ncols()).fold(T::zero(), |acc, node| acc + coords[(b, node)] * dn[(a, node)])
}

fn adjugate_inverse_2x2<T: Real>(m: &Matrix2<T>) -> (Matrix2<T>, T) {
    let det = m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)];
    let adjugate = Matrix2::new(m[(1, 1)], -m[(0, 1)], -m[(1, 0)], m[(0, 0)]);
    (adjugate / det, det)
}

fn adjugate_inverse_3x3<T: Real>(m: &Matrix3<T>) -> (Matrix3<T>, T) {
    let cofactor = |i: usize, j: usize| {
        let (r0, r1) = ((i + 1) % 3, (i + 2) % 3);
        let (c0, c1) = ((j + 1) % 3, (j + 2) % 3);
        m[(r0, c0)] * m[(r1, c1)] - m[(r0, c1)] * m[(r1, c0)]
    };
    // Cyclic index ordering makes the sign of each cofactor implicit
    let adjugate = Matrix3::from_fn(|i, j| cofactor(j, i));
    let det = m[(0, 0)] * cofactor(0, 0) + m[(0, 1)] * cofactor(0, 1) + m[(0, 2)] * cofactor(0, 2);
    (adjugate / det, det)
}

fn gradients_1d<T: Real>(coords: &DMatrix<T>, dn: &DMatrix<T>, mut gradients: DMatrixViewMut<T>) -> T {
    let j = jacobian_entry(coords, dn, 0, 0);
    for node in 0..coords.ncols() {
        gradients[(0, node)] = dn[(0, node)] / j;
    }
    j
}

fn gradients_1d_embedded<T: Real>(coords: &DMatrix<T>, dn: &DMatrix<T>, mut gradients: DMatrixViewMut<T>) -> T {
    let tangent = Vector2::new(jacobian_entry(coords, dn, 0, 0), jacobian_entry(coords, dn, 0, 1));
    let length_squared = tangent.norm_squared();
    for node in 0..coords.ncols() {
        for k in 0..2 {
            gradients[(k, node)] = tangent[k] * dn[(0, node)] / length_squared;
        }
    }
    length_squared.sqrt()
}

/// Returns the Jacobian determinant.
fn gradients_2d<T: Real>(coords: &DMatrix<T>, dn: &DMatrix<T>, mut gradients: DMatrixViewMut<T>) -> T {
    let j = Matrix2::from_fn(|a, b| jacobian_entry(coords, dn, a, b));
    let (j_inv, det) = adjugate_inverse_2x2(&j);
    for node in 0..coords.ncols() {
        let grad = j_inv * Vector2::new(dn[(0, node)], dn[(1, node)]);
        gradients.column_mut(node).copy_from(&grad);
    }
    det
}

/// Twice the area of the triangle spanned by the first three nodes.
///
/// Used as the Jacobian scalar of planar elements in the reference frame. It coincides with
/// the Jacobian determinant for triangles and parallelogram quadrilaterals.
fn corner_area_2d<T: Real>(coords: &DMatrix<T>) -> T {
    let (x0, y0) = (coords[(0, 0)], coords[(1, 0)]);
    let (x1, y1) = (coords[(0, 1)], coords[(1, 1)]);
    let (x2, y2) = (coords[(0, 2)], coords[(1, 2)]);
    ((x1 - x0) * (y2 - y0) - (x2 - x0) * (y1 - y0)).abs()
}

/// Surface in space: gradients through the pseudo-inverse `(T^T T)^-1 T^T` of the tangent
/// Jacobian `T`. Returns the area element `sqrt(det(T^T T))`.
fn gradients_2d_embedded<T: Real>(coords: &DMatrix<T>, dn: &DMatrix<T>, mut gradients: DMatrixViewMut<T>) -> T {
    let tangents = Matrix3x2::from_fn(|b, a| jacobian_entry(coords, dn, a, b));
    let gram = tangents.transpose() * tangents;
    let (gram_inv, gram_det) = adjugate_inverse_2x2(&gram);
    let pseudo_inverse_t = tangents * gram_inv;
    for node in 0..coords.ncols() {
        let grad: Vector3<T> = pseudo_inverse_t * Vector2::new(dn[(0, node)], dn[(1, node)]);
        gradients.column_mut(node).copy_from(&grad);
    }
    gram_det.sqrt()
}

/// Returns the Jacobian determinant.
fn gradients_3d<T: Real>(coords: &DMatrix<T>, dn: &DMatrix<T>, mut gradients: DMatrixViewMut<T>) -> T {
    let j = Matrix3::from_fn(|a, b| jacobian_entry(coords, dn, a, b));
    let (j_inv, det) = adjugate_inverse_3x3(&j);
    for node in 0..coords.ncols() {
        let grad = j_inv * Vector3::new(dn[(0, node)], dn[(1, node)], dn[(2, node)]);
        gradients.column_mut(node).copy_from(&grad);
    }
    det
}
