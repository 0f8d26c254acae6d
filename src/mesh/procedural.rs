//! Basic procedural mesh generation routines.
//!
//! Rectangular meshes carry one marker per side: `left`/`right` (x = 0 and x = 1),
//! `bottom`/`top` (y = 0 and y = 1) and, in 3D, `back`/`front` (z = 0 and z = 1).
use crate::element::Topology;
use crate::mesh::SmoothingMesh;
use crate::Real;
use nalgebra::{DMatrix, RealField};
use std::f64::consts::PI;

fn usize_to_real<T: RealField>(i: usize) -> T {
    T::from_usize(i).expect("Must be able to fit usize in T")
}

fn add_side_markers<T: Real>(mesh: &mut SmoothingMesh<T>, names: &[(&str, &str)]) {
    let coordinates = mesh.coordinates().clone();
    let tol: T = nalgebra::convert(1e-12);
    for (dim, (lower, upper)) in names.iter().enumerate() {
        let on_plane = |value: T| -> Vec<usize> {
            coordinates
                .column_iter()
                .enumerate()
                .filter(|(_, x)| (x[dim] - value).abs() <= tol)
                .map(|(node, _)| node)
                .collect()
        };
        let lower_nodes = on_plane(T::zero());
        let upper_nodes = on_plane(T::one());
        mesh.add_marker(*lower, lower_nodes)
            .expect("Marker nodes are taken from the mesh");
        mesh.add_marker(*upper, upper_nodes)
            .expect("Marker nodes are taken from the mesh");
    }
}

/// Node coordinates of a uniform grid over the unit square, row by row, with `coord_dim`
/// components (the remaining components are zero).
fn unit_square_grid<T: Real>(cells_per_dim: usize, coord_dim: usize) -> DMatrix<T> {
    let n = cells_per_dim + 1;
    let h = T::one() / usize_to_real(cells_per_dim);
    DMatrix::from_fn(coord_dim, n * n, |dim, node| match dim {
        0 => usize_to_real::<T>(node % n) * h,
        1 => usize_to_real::<T>(node / n) * h,
        _ => T::zero(),
    })
}

/// The counter-clockwise corners of the quads of a unit square grid.
fn unit_square_quads(cells_per_dim: usize) -> Vec<[usize; 4]> {
    let n = cells_per_dim + 1;
    let index = |i, j| n * j + i;
    let mut quads = Vec::with_capacity(cells_per_dim * cells_per_dim);
    for j in 0..cells_per_dim {
        for i in 0..cells_per_dim {
            quads.push([index(i, j), index(i + 1, j), index(i + 1, j + 1), index(i, j + 1)]);
        }
    }
    quads
}

/// A uniform mesh of quadrilaterals over the unit square.
pub fn create_unit_square_quad_mesh<T: Real>(cells_per_dim: usize) -> SmoothingMesh<T> {
    assert!(cells_per_dim > 0, "Need at least one cell per dimension");
    let mut mesh = SmoothingMesh::from_coordinates(unit_square_grid(cells_per_dim, 2));
    for quad in unit_square_quads(cells_per_dim) {
        mesh.add_element(Topology::Quadrilateral.vtk_type(), &quad)
            .expect("Grid indices are within bounds");
    }
    add_side_markers(&mut mesh, &[("left", "right"), ("bottom", "top")]);
    mesh
}

/// A uniform mesh of triangles over the unit square, each grid cell split along its diagonal.
pub fn create_unit_square_tri_mesh<T: Real>(cells_per_dim: usize) -> SmoothingMesh<T> {
    assert!(cells_per_dim > 0, "Need at least one cell per dimension");
    let mut mesh = SmoothingMesh::from_coordinates(unit_square_grid(cells_per_dim, 2));
    let tag = Topology::Triangle.vtk_type();
    for [a, b, c, d] in unit_square_quads(cells_per_dim) {
        mesh.add_element(tag, &[a, b, c])
            .expect("Grid indices are within bounds");
        mesh.add_element(tag, &[a, c, d])
            .expect("Grid indices are within bounds");
    }
    add_side_markers(&mut mesh, &[("left", "right"), ("bottom", "top")]);
    mesh
}

/// A uniform quadrilateral mesh of the unit square lying in the plane `z = 0` of 3D space.
///
/// Suitable for surface smoothing.
pub fn create_unit_square_quad_surface_mesh<T: Real>(cells_per_dim: usize) -> SmoothingMesh<T> {
    assert!(cells_per_dim > 0, "Need at least one cell per dimension");
    let mut mesh = SmoothingMesh::from_coordinates(unit_square_grid(cells_per_dim, 3));
    for quad in unit_square_quads(cells_per_dim) {
        mesh.add_element(Topology::Quadrilateral.vtk_type(), &quad)
            .expect("Grid indices are within bounds");
    }
    add_side_markers(&mut mesh, &[("left", "right"), ("bottom", "top")]);
    mesh
}

/// A uniform mesh of hexahedra over the unit cube.
pub fn create_unit_cube_hex_mesh<T: Real>(cells_per_dim: usize) -> SmoothingMesh<T> {
    assert!(cells_per_dim > 0, "Need at least one cell per dimension");
    let n = cells_per_dim + 1;
    let h = T::one() / usize_to_real(cells_per_dim);
    let coordinates = DMatrix::from_fn(3, n * n * n, |dim, node| {
        let index = match dim {
            0 => node % n,
            1 => (node / n) % n,
            _ => node / (n * n),
        };
        usize_to_real::<T>(index) * h
    });

    let mut mesh = SmoothingMesh::from_coordinates(coordinates);
    let index = |i, j, k| n * n * k + n * j + i;
    let tag = Topology::Hexahedron.vtk_type();
    for k in 0..cells_per_dim {
        for j in 0..cells_per_dim {
            for i in 0..cells_per_dim {
                let hex = [
                    index(i, j, k),
                    index(i + 1, j, k),
                    index(i + 1, j + 1, k),
                    index(i, j + 1, k),
                    index(i, j, k + 1),
                    index(i + 1, j, k + 1),
                    index(i + 1, j + 1, k + 1),
                    index(i, j + 1, k + 1),
                ];
                mesh.add_element(tag, &hex)
                    .expect("Grid indices are within bounds");
            }
        }
    }
    add_side_markers(&mut mesh, &[("left", "right"), ("bottom", "top"), ("back", "front")]);
    mesh
}

/// A closed polygon of segments approximating a circle of the given radius in the plane.
///
/// Suitable for surface smoothing of planar meshes. Carries no markers.
pub fn create_circle_segment_mesh<T: Real>(num_segments: usize, radius: T) -> SmoothingMesh<T> {
    assert!(num_segments >= 3, "Need at least three segments for a closed polygon");
    let coordinates = DMatrix::from_fn(2, num_segments, |dim, node| {
        let angle: T = nalgebra::convert(2.0 * PI * node as f64 / num_segments as f64);
        match dim {
            0 => radius * angle.cos(),
            _ => radius * angle.sin(),
        }
    });
    let mut mesh = SmoothingMesh::from_coordinates(coordinates);
    let tag = Topology::Segment.vtk_type();
    for i in 0..num_segments {
        mesh.add_element(tag, &[i, (i + 1) % num_segments])
            .expect("Polygon indices are within bounds");
    }
    mesh
}
