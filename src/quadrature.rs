//! Quadrature rules for the reference domains of the supported element topologies.
//!
//! Rules are generated in double precision as plain `(weights, points)` pairs and converted
//! to the working scalar type through [`QuadratureRule::from_f64`].
use crate::element::Topology;
use crate::Real;
use itertools::iproduct;
use nalgebra::{convert, DVector, Scalar};

pub mod univariate;

/// A D-dimensional rule in double precision.
pub type Rule<const D: usize> = (Vec<f64>, Vec<[f64; D]>);

/// A quadrature rule consisting of weights and points in a reference domain.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureRule<T: Scalar> {
    weights: Vec<T>,
    points: Vec<DVector<T>>,
}

impl<T: Scalar> QuadratureRule<T> {
    /// # Panics
    ///
    /// Panics if the number of weights and points differ, or if the points do not share
    /// the same dimension.
    pub fn new(weights: Vec<T>, points: Vec<DVector<T>>) -> Self {
        assert_eq!(weights.len(), points.len(), "Number of weights and points must agree");
        if let Some(first) = points.first() {
            assert!(
                points.iter().all(|p| p.len() == first.len()),
                "All points must have the same dimension"
            );
        }
        Self { weights, points }
    }

    pub fn weights(&self) -> &[T] {
        &self.weights
    }

    pub fn points(&self) -> &[DVector<T>] {
        &self.points
    }

    pub fn num_points(&self) -> usize {
        self.weights.len()
    }

    pub fn dim(&self) -> usize {
        self.points.first().map(|p| p.len()).unwrap_or(0)
    }
}

impl<T: Real> QuadratureRule<T> {
    pub fn from_f64<const D: usize>((weights, points): Rule<D>) -> Self {
        let weights = weights.into_iter().map(convert).collect();
        let points = points
            .into_iter()
            .map(|p| DVector::from_iterator(D, p.into_iter().map(convert)))
            .collect();
        Self::new(weights, points)
    }

    /// The default rule used for the reference domain of the given topology.
    pub fn for_topology(topology: Topology) -> Self {
        match topology {
            Topology::Segment => Self::from_f64(univariate::gauss_unit_interval(2)),
            Topology::Triangle => Self::from_f64(triangle_strength_2()),
            Topology::Quadrilateral => Self::from_f64(quadrilateral_gauss(2)),
            Topology::Tetrahedron => Self::from_f64(tetrahedron_strength_2()),
            Topology::Pyramid => Self::from_f64(pyramid_collapsed_gauss(2)),
            Topology::Prism => Self::from_f64(prism_strength_2()),
            Topology::Hexahedron => Self::from_f64(hexahedron_gauss(2)),
        }
    }

    /// Approximates the integral of the given function over the reference domain.
    pub fn integrate(&self, f: impl Fn(&DVector<T>) -> T) -> T {
        self.weights
            .iter()
            .zip(&self.points)
            .fold(T::zero(), |integral, (w, p)| integral + *w * f(p))
    }
}

/// Tensor-product Gauss rule on `[0, 1]^2`.
pub fn quadrilateral_gauss(points_per_dim: usize) -> Rule<2> {
    let (w1, p1) = univariate::gauss_unit_interval(points_per_dim);
    let weights = iproduct!(&w1, &w1).map(|(wy, wx)| wx * wy).collect();
    let points = iproduct!(&p1, &p1).map(|([y], [x])| [*x, *y]).collect();
    (weights, points)
}

/// Tensor-product Gauss rule on `[0, 1]^3`.
pub fn hexahedron_gauss(points_per_dim: usize) -> Rule<3> {
    let (w1, p1) = univariate::gauss_unit_interval(points_per_dim);
    let weights = iproduct!(&w1, &w1, &w1)
        .map(|(wz, wy, wx)| wx * wy * wz)
        .collect();
    let points = iproduct!(&p1, &p1, &p1)
        .map(|([z], [y], [x])| [*x, *y, *z])
        .collect();
    (weights, points)
}

/// Three-point rule on the unit triangle `(0, 0), (1, 0), (0, 1)`, exact for quadratics.
pub fn triangle_strength_2() -> Rule<2> {
    let a = 1.0 / 6.0;
    let b = 2.0 / 3.0;
    (vec![a; 3], vec![[a, a], [b, a], [a, b]])
}

/// Four-point rule on the unit tetrahedron, exact for quadratics.
pub fn tetrahedron_strength_2() -> Rule<3> {
    let a = 0.5854101966249685;
    let b = 0.1381966011250105;
    let w = 1.0 / 24.0;
    (vec![w; 4], vec![[b, b, b], [a, b, b], [b, a, b], [b, b, a]])
}

/// Tensor product of the triangle rule with two-point Gauss in the extrusion direction.
pub fn prism_strength_2() -> Rule<3> {
    let (w_tri, p_tri) = triangle_strength_2();
    let (w_line, p_line) = univariate::gauss_unit_interval(2);
    let weights = iproduct!(&w_line, &w_tri).map(|(wz, w)| w * wz).collect();
    let points = iproduct!(&p_line, &p_tri)
        .map(|([z], [x, y])| [*x, *y, *z])
        .collect();
    (weights, points)
}

/// Collapsed-cube rule on the pyramid with base `[-1, 1]^2` at `z = 0` and apex `(0, 0, 1)`.
///
/// A Gauss rule on `[-1, 1]^2 x [0, 1]` is mapped through `(r, s, t) -> ((1 - t) r, (1 - t) s, t)`,
/// whose Jacobian determinant `(1 - t)^2` is absorbed into the weights.
pub fn pyramid_collapsed_gauss(points_per_dim: usize) -> Rule<3> {
    let (w_base, p_base) = univariate::gauss(points_per_dim);
    let (w_height, p_height) = univariate::gauss_unit_interval(points_per_dim);
    let mut weights = Vec::new();
    let mut points = Vec::new();
    for (wt, [t]) in w_height.iter().zip(&p_height) {
        let scale = 1.0 - t;
        for ((wr, [r]), (ws, [s])) in iproduct!(w_base.iter().zip(&p_base), w_base.iter().zip(&p_base)) {
            weights.push(wr * ws * wt * scale * scale);
            points.push([scale * r, scale * s, *t]);
        }
    }
    (weights, points)
}
