use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DMatrixView, DVector, Rotation3, Vector3};
use sobolev::element::Topology;
use sobolev::error::AssemblyError;
use sobolev::linear_system::ConjugateGradientSolver;
use sobolev::mesh::procedural::{
    create_circle_segment_mesh, create_unit_cube_hex_mesh, create_unit_square_quad_mesh,
    create_unit_square_quad_surface_mesh, create_unit_square_tri_mesh,
};
use sobolev::mesh::{SmoothingGeometry, SmoothingMesh};
use sobolev::settings::{BoundaryConditionKind, SmoothingDomain, SmoothingSettings};
use sobolev::solver::GradientSmoothingSolver;

fn linear_solver() -> ConjugateGradientSolver<f64> {
    ConjugateGradientSolver::new(1e-13, 1000)
}

/// A deterministic, non-smooth field with one column per node.
fn wiggly_field(num_components: usize, num_nodes: usize) -> DMatrix<f64> {
    DMatrix::from_fn(num_components, num_nodes, |i, j| ((3 * j + i) as f64 * 0.7).sin() + 0.1 * i as f64)
}

fn constant_field(value: &[f64], num_nodes: usize) -> DMatrix<f64> {
    DMatrix::from_fn(value.len(), num_nodes, |i, _| value[i])
}

fn single_tet_mesh() -> SmoothingMesh<f64> {
    #[rustfmt::skip]
    let coordinates = DMatrix::from_column_slice(3, 4, &[
        0.1, 0.0, 0.0,
        1.2, 0.1, 0.0,
        0.0, 0.9, 0.2,
        0.1, 0.2, 1.1,
    ]);
    let mut mesh = SmoothingMesh::from_coordinates(coordinates);
    mesh.add_element(Topology::Tetrahedron.vtk_type(), &[0, 1, 2, 3])
        .unwrap();
    mesh
}

/// Forwards to a mesh, but reports one additional marker with arbitrary nodes.
struct WithExtraMarker<'a> {
    mesh: &'a SmoothingMesh<f64>,
    nodes: Vec<usize>,
}

impl SmoothingGeometry<f64> for WithExtraMarker<'_> {
    fn coordinate_dim(&self) -> usize {
        self.mesh.coordinate_dim()
    }

    fn num_nodes(&self) -> usize {
        self.mesh.num_nodes()
    }

    fn num_elements(&self) -> usize {
        self.mesh.num_elements()
    }

    fn element_tag(&self, element: usize) -> u8 {
        self.mesh.element_tag(element)
    }

    fn element_nodes(&self, element: usize) -> &[usize] {
        self.mesh.element_nodes(element)
    }

    fn reference_coordinates(&self) -> DMatrixView<f64> {
        self.mesh.reference_coordinates()
    }

    fn num_markers(&self) -> usize {
        self.mesh.num_markers() + 1
    }

    fn marker_name(&self, marker: usize) -> &str {
        if marker == self.mesh.num_markers() {
            "extra"
        } else {
            self.mesh.marker_name(marker)
        }
    }

    fn marker_nodes(&self, marker: usize) -> &[usize] {
        if marker == self.mesh.num_markers() {
            &self.nodes
        } else {
            self.mesh.marker_nodes(marker)
        }
    }
}

fn assembly_error(report: &eyre::Report) -> &AssemblyError {
    report
        .downcast_ref::<AssemblyError>()
        .expect("Error should be an assembly error")
}

/// Asserts that the field is reproduced by smoothing with the given settings.
fn assert_reproduces(mesh: &SmoothingMesh<f64>, settings: SmoothingSettings, field: DMatrix<f64>, tol: f64) {
    let mut solver = GradientSmoothingSolver::new(mesh, settings).unwrap();
    let mut smoothed = field.clone();
    let report = solver
        .apply_gradient_smoothing(mesh, &mut smoothed, &mut linear_solver())
        .unwrap();
    assert!(report.linear_solve.converged);
    assert!(report.dirichlet_nodes.is_empty());
    assert_matrix_eq!(smoothed, field, comp = abs, tol = tol);
}

#[test]
fn pure_reaction_reproduces_arbitrary_fields() {
    let settings = SmoothingSettings::default().with_parameters(0.0, 1.0);

    let quad = create_unit_square_quad_mesh(1);
    assert_reproduces(&quad, settings.clone(), wiggly_field(2, 4), 1e-10);

    let tet = single_tet_mesh();
    assert_reproduces(&tet, settings.clone(), wiggly_field(3, 4), 1e-10);

    let tris = create_unit_square_tri_mesh(3);
    assert_reproduces(&tris, settings, wiggly_field(2, 16), 1e-9);
}

#[test]
fn smoothing_reproduces_constant_fields() {
    let settings = SmoothingSettings::default().with_parameters(1.0, 1.0);

    let quads = create_unit_square_quad_mesh(4);
    assert_reproduces(&quads, settings.clone(), constant_field(&[1.0, 1.0], 25), 1e-8);

    let tris = create_unit_square_tri_mesh(4);
    assert_reproduces(&tris, settings.clone(), constant_field(&[2.5, -1.0], 25), 1e-8);

    let hexes = create_unit_cube_hex_mesh(2);
    assert_reproduces(&hexes, settings, constant_field(&[0.5, -2.0, 3.0], 27), 1e-8);
}

#[test]
fn smoothing_on_a_line() {
    let coordinates = DMatrix::from_fn(1, 6, |_, j| (j as f64 * 0.3).powi(2));
    let mut mesh = SmoothingMesh::from_coordinates(coordinates);
    for i in 0..5 {
        mesh.add_element(Topology::Segment.vtk_type(), &[i, i + 1])
            .unwrap();
    }
    let settings = SmoothingSettings::default().with_parameters(0.5, 1.0);
    assert_reproduces(&mesh, settings, constant_field(&[4.0], 6), 1e-9);
}

#[test]
fn reaction_coefficient_scales_constant_fields() {
    // With a constant field the diffusion term vanishes and zeta u = s
    let coordinates = DMatrix::from_fn(1, 6, |_, j| (j as f64 * 0.3).powi(2));
    let mut line = SmoothingMesh::from_coordinates(coordinates);
    for i in 0..5 {
        line.add_element(Topology::Segment.vtk_type(), &[i, i + 1])
            .unwrap();
    }
    let quads = create_unit_square_quad_mesh::<f64>(3);

    for zeta in [0.5, 2.0, 4.0] {
        let settings = SmoothingSettings::default().with_parameters(0.5, zeta);

        let mut field = constant_field(&[4.0], 6);
        let mut solver = GradientSmoothingSolver::new(&line, settings.clone()).unwrap();
        let report = solver
            .apply_gradient_smoothing(&line, &mut field, &mut linear_solver())
            .unwrap();
        assert!(report.linear_solve.converged);
        assert_matrix_eq!(field, constant_field(&[4.0 / zeta], 6), comp = abs, tol = 1e-9);

        let mut field = constant_field(&[1.0, -2.0], 16);
        let mut solver = GradientSmoothingSolver::new(&quads, settings).unwrap();
        solver
            .apply_gradient_smoothing(&quads, &mut field, &mut linear_solver())
            .unwrap();
        assert_matrix_eq!(field, constant_field(&[1.0 / zeta, -2.0 / zeta], 16), comp = abs, tol = 1e-9);
    }
}

#[test]
fn smoothing_damps_oscillations() {
    let mesh = create_unit_square_quad_mesh(6);
    let settings = SmoothingSettings::default().with_parameters(0.5, 1.0);
    let mut solver = GradientSmoothingSolver::new(&mesh, settings).unwrap();

    let checkerboard = DMatrix::from_fn(2, 49, |_, j| if (j % 7 + j / 7) % 2 == 0 { 1.0 } else { -1.0 });
    let mut smoothed = checkerboard.clone();
    let report = solver
        .apply_gradient_smoothing(&mesh, &mut smoothed, &mut linear_solver())
        .unwrap();
    assert!(report.linear_solve.converged);
    assert!(smoothed.amax() < 0.5 * checkerboard.amax());
}

#[test]
fn pure_diffusion_without_dirichlet_nodes_does_not_converge() {
    let mesh = create_unit_square_quad_mesh(1);
    let settings = SmoothingSettings::default().with_parameters(1.0, 0.0);
    let mut solver = GradientSmoothingSolver::new(&mesh, settings).unwrap();
    let mut field = constant_field(&[1.0, 1.0], 4);
    let report = solver
        .apply_gradient_smoothing(&mesh, &mut field, &mut ConjugateGradientSolver::new(1e-12, 50))
        .unwrap();
    assert!(!report.linear_solve.converged);
}

#[test]
fn pure_diffusion_with_dirichlet_nodes_is_well_posed() {
    let mesh = create_unit_cube_hex_mesh(3);
    let mut settings = SmoothingSettings::default().with_parameters(1.0, 0.0);
    for name in ["left", "right", "bottom", "top", "back", "front"] {
        settings = settings.with_marker(name, BoundaryConditionKind::Essential);
    }
    let mut solver = GradientSmoothingSolver::new(&mesh, settings).unwrap();
    let mut field = constant_field(&[1.0, 2.0, 3.0], 64);
    let report = solver
        .apply_gradient_smoothing(&mesh, &mut field, &mut linear_solver())
        .unwrap();
    assert!(report.linear_solve.converged);
    // Only the 8 interior nodes are free
    assert_eq!(report.dirichlet_nodes.len(), 64 - 8);
    // Interior values of the solution of -Δu = c with u = 0 on the boundary have the sign of c
    for node in [21, 22, 25, 26, 37, 38, 41, 42] {
        assert!(!report.dirichlet_nodes.contains(&node));
        assert!(field.column(node).iter().all(|&value| value > 0.0));
    }
}

#[test]
fn stiffness_annihilates_constants() {
    let settings = SmoothingSettings::default().with_parameters(1.3, 0.0);
    let meshes = [
        create_unit_square_tri_mesh::<f64>(3),
        create_unit_square_quad_mesh::<f64>(3),
    ];
    for mesh in &meshes {
        let mut solver = GradientSmoothingSolver::new(mesh, settings.clone()).unwrap();
        solver.reset();
        solver.assemble_stiffness(mesh).unwrap();
        let matrix = solver.matrix().to_dense();
        assert_eq!(matrix.nrows(), 32);
        let product = &matrix * DVector::repeat(32, 1.0);
        assert_matrix_eq!(product, DVector::zeros(32), comp = abs, tol = 1e-12);
        assert!(util::max_asymmetry(&matrix) <= 1e-14);
    }

    let mesh = create_unit_cube_hex_mesh::<f64>(2);
    let mut solver = GradientSmoothingSolver::new(&mesh, settings).unwrap();
    solver.assemble_stiffness(&mesh).unwrap();
    let matrix = solver.matrix().to_dense();
    let product = &matrix * DVector::repeat(81, 1.0);
    assert_matrix_eq!(product, DVector::zeros(81), comp = abs, tol = 1e-12);
    assert!(util::max_asymmetry(&matrix) <= 1e-14);
}

#[test]
fn reset_clears_previous_assembly() {
    let mesh = create_unit_square_quad_mesh::<f64>(2);
    let mut solver = GradientSmoothingSolver::new(&mesh, SmoothingSettings::default()).unwrap();
    let field = wiggly_field(2, 9);

    solver.assemble_stiffness(&mesh).unwrap();
    solver.assemble_rhs(&mesh, &field).unwrap();
    let matrix = solver.matrix().clone();
    let rhs = solver.rhs().clone();

    // Stages accumulate
    solver.assemble_stiffness(&mesh).unwrap();
    assert_matrix_eq!(solver.matrix().to_dense(), matrix.to_dense() * 2.0, comp = abs, tol = 1e-14);

    solver.reset();
    assert!(solver.matrix().values().iter().all(|&v| v == 0.0));
    assert_eq!(solver.rhs(), &DVector::zeros(18));
    assert_eq!(solver.solution(), &DVector::zeros(18));

    solver.assemble_stiffness(&mesh).unwrap();
    solver.assemble_rhs(&mesh, &field).unwrap();
    assert_eq!(solver.matrix(), &matrix);
    assert_eq!(solver.rhs(), &rhs);
}

#[test]
fn repeated_passes_give_identical_results() {
    let mesh = create_unit_square_tri_mesh::<f64>(3);
    let settings = SmoothingSettings::default()
        .with_parameters(0.3, 1.0)
        .with_marker("bottom", BoundaryConditionKind::Essential);
    let mut solver = GradientSmoothingSolver::new(&mesh, settings).unwrap();
    let field = wiggly_field(2, 16);

    let mut first = field.clone();
    solver
        .apply_gradient_smoothing(&mesh, &mut first, &mut linear_solver())
        .unwrap();
    let mut second = field.clone();
    solver
        .apply_gradient_smoothing(&mesh, &mut second, &mut linear_solver())
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn dirichlet_markers_pin_field_to_zero() {
    let mesh = create_unit_square_quad_mesh::<f64>(3);
    let settings = SmoothingSettings::default()
        .with_parameters(0.5, 1.0)
        .with_marker("left", BoundaryConditionKind::Essential)
        .with_marker("top", BoundaryConditionKind::Natural);
    let mut solver = GradientSmoothingSolver::new(&mesh, settings).unwrap();
    let field = wiggly_field(2, 16) + DMatrix::repeat(2, 16, 2.0);

    solver.reset();
    solver.assemble_stiffness(&mesh).unwrap();
    solver.assemble_rhs(&mesh, &field).unwrap();
    let dirichlet_nodes = solver.apply_boundary_conditions(&mesh).unwrap();
    assert_eq!(dirichlet_nodes, vec![0, 4, 8, 12]);

    let matrix = solver.matrix();
    for &node in &dirichlet_nodes {
        for (col, block) in matrix.row_blocks(node) {
            if col == node {
                assert!(block[(0, 0)] > 0.0);
                assert_eq!(block, DMatrix::identity(2, 2) * block[(0, 0)]);
            } else {
                assert_eq!(block, DMatrix::zeros(2, 2));
                // The column is zeroed as well
                assert_eq!(matrix.block(col, node).unwrap(), DMatrix::zeros(2, 2));
            }
        }
        assert_eq!(solver.rhs()[2 * node], 0.0);
        assert_eq!(solver.rhs()[2 * node + 1], 0.0);
    }
    assert!(solver.rhs()[2] > 0.0);

    let mut smoothed = field.clone();
    let report = solver
        .apply_gradient_smoothing(&mesh, &mut smoothed, &mut linear_solver())
        .unwrap();
    assert!(report.linear_solve.converged);
    assert_eq!(report.dirichlet_nodes, dirichlet_nodes);
    for node in 0..16 {
        if dirichlet_nodes.contains(&node) {
            assert_eq!(smoothed.column(node), DVector::zeros(2));
            assert_eq!(solver.solution()[2 * node], 0.0);
        } else {
            assert!(smoothed.column(node).iter().all(|&value| value > 0.0));
        }
    }
}

#[test]
fn halo_nodes_only_get_their_columns_zeroed() {
    let mut mesh = create_unit_square_quad_mesh::<f64>(2);
    mesh.set_halo(6, true);
    let settings = SmoothingSettings::default().with_marker("left", BoundaryConditionKind::Essential);
    let mut solver = GradientSmoothingSolver::new(&mesh, settings).unwrap();
    let field = constant_field(&[1.0, 1.0], 9);

    solver.assemble_stiffness(&mesh).unwrap();
    solver.assemble_rhs(&mesh, &field).unwrap();
    let dirichlet_nodes = solver.apply_boundary_conditions(&mesh).unwrap();
    assert_eq!(dirichlet_nodes, vec![0, 3]);

    let matrix = solver.matrix();
    for row in [3, 4, 6, 7] {
        assert_eq!(matrix.block(row, 6).unwrap(), DMatrix::zeros(2, 2));
    }
    // The halo row is kept
    assert!(matrix.block(6, 7).unwrap()[(0, 0)] != 0.0);
    assert!(solver.rhs()[12] > 0.0);
    assert!(solver.rhs()[13] > 0.0);
}

#[test]
fn unconfigured_markers_are_natural() {
    let mesh = create_unit_square_quad_mesh::<f64>(2);
    let mut solver = GradientSmoothingSolver::new(&mesh, SmoothingSettings::default()).unwrap();
    solver.assemble_stiffness(&mesh).unwrap();
    let assembled = solver.matrix().clone();
    assert!(solver.apply_boundary_conditions(&mesh).unwrap().is_empty());
    assert_eq!(solver.matrix(), &assembled);
}

#[test]
fn parallel_and_sequential_assembly_are_identical() {
    let mut mesh = create_unit_cube_hex_mesh::<f64>(5);
    mesh.transform_coordinates(|x| x.map(|v| v + 0.1 * (7.0 * v).sin()));
    let settings = SmoothingSettings::default().with_parameters(0.7, 1.1);
    let field = wiggly_field(3, mesh.num_nodes());

    let assemble = |parallel: bool| {
        let mut solver = GradientSmoothingSolver::new(&mesh, settings.clone()).unwrap();
        solver.set_parallel(parallel);
        assert_eq!(solver.is_parallel(), parallel);
        solver.assemble_stiffness(&mesh).unwrap();
        solver.assemble_rhs(&mesh, &field).unwrap();
        (solver.matrix().values().to_vec(), solver.rhs().clone())
    };
    let (parallel_values, parallel_rhs) = assemble(true);
    let (sequential_values, sequential_rhs) = assemble(false);
    assert_eq!(parallel_values, sequential_values);
    assert_eq!(parallel_rhs, sequential_rhs);
}

#[test]
fn unsupported_tags_are_rejected() {
    let mut mesh = create_unit_square_quad_mesh::<f64>(1);
    mesh.add_element(42, &[0, 1, 2]).unwrap();
    let error = GradientSmoothingSolver::new(&mesh, SmoothingSettings::default()).unwrap_err();
    assert_eq!(
        assembly_error(&error),
        &AssemblyError::UnsupportedTopology { element: 1, tag: 42 }
    );
}

#[test]
fn topology_dimension_must_match_domain() {
    let mut mesh = SmoothingMesh::from_coordinates(DMatrix::<f64>::zeros(2, 4));
    mesh.add_element(Topology::Tetrahedron.vtk_type(), &[0, 1, 2, 3])
        .unwrap();
    let error = GradientSmoothingSolver::new(&mesh, SmoothingSettings::default()).unwrap_err();
    assert_eq!(
        assembly_error(&error),
        &AssemblyError::TopologyDimensionMismatch {
            element: 0,
            topology: Topology::Tetrahedron,
            expected_dim: 2
        }
    );

    let mesh = create_unit_cube_hex_mesh::<f64>(1);
    let settings = SmoothingSettings::default().with_domain(SmoothingDomain::Surface);
    let error = GradientSmoothingSolver::new(&mesh, settings).unwrap_err();
    assert_eq!(
        assembly_error(&error),
        &AssemblyError::TopologyDimensionMismatch {
            element: 0,
            topology: Topology::Hexahedron,
            expected_dim: 2
        }
    );
}

#[test]
fn node_count_must_match_topology() {
    let mut mesh = create_unit_square_quad_mesh::<f64>(1);
    mesh.add_element(Topology::Quadrilateral.vtk_type(), &[0, 1, 2])
        .unwrap();
    let error = GradientSmoothingSolver::new(&mesh, SmoothingSettings::default()).unwrap_err();
    assert_eq!(
        assembly_error(&error),
        &AssemblyError::NodeCountMismatch {
            element: 1,
            topology: Topology::Quadrilateral,
            expected: 4,
            actual: 3
        }
    );
    assert_eq!(assembly_error(&error).element(), 1);
}

#[test]
fn degenerate_elements_fail_assembly_without_side_effects() {
    #[rustfmt::skip]
    let coordinates = DMatrix::from_column_slice(2, 4, &[
        0.0, 0.0,
        1.0, 0.0,
        0.0, 1.0,
        2.0, 0.0,
    ]);
    let mut mesh = SmoothingMesh::from_coordinates(coordinates);
    mesh.add_element(Topology::Triangle.vtk_type(), &[0, 1, 2])
        .unwrap();
    // Collinear nodes
    mesh.add_element(Topology::Triangle.vtk_type(), &[0, 1, 3])
        .unwrap();

    for parallel in [true, false] {
        let mut solver = GradientSmoothingSolver::new(&mesh, SmoothingSettings::default()).unwrap();
        solver.set_parallel(parallel);
        let error = solver.assemble_stiffness(&mesh).unwrap_err();
        assert_eq!(
            assembly_error(&error),
            &AssemblyError::InvalidElementGeometry {
                element: 1,
                topology: Topology::Triangle
            }
        );
        assert!(solver.matrix().values().iter().all(|&v| v == 0.0));

        let error = solver
            .assemble_rhs(&mesh, &constant_field(&[1.0, 1.0], 4))
            .unwrap_err();
        assert_eq!(assembly_error(&error).element(), 1);
        assert_eq!(solver.rhs(), &DVector::zeros(8));
    }
}

#[test]
fn surface_smoothing_on_a_closed_curve() {
    let mesh = create_circle_segment_mesh(24, 1.5);
    let settings = SmoothingSettings::default()
        .with_parameters(0.5, 1.0)
        .with_domain(SmoothingDomain::Surface);
    let solver = GradientSmoothingSolver::new(&mesh, settings.clone()).unwrap();
    assert_eq!(solver.block_size(), 2);
    assert_eq!(solver.intrinsic_dim(), 1);
    assert!(solver.reference_element(Topology::Segment).is_some());
    assert!(solver.reference_element(Topology::Triangle).is_none());

    assert_reproduces(&mesh, settings.clone(), constant_field(&[1.0, -3.0], 24), 1e-8);
    assert_reproduces(&mesh, settings.with_parameters(0.0, 1.0), wiggly_field(2, 24), 1e-9);
}

#[test]
fn surface_smoothing_on_a_tilted_plane() {
    let mut mesh = create_unit_square_quad_surface_mesh::<f64>(3);
    let rotation = Rotation3::from_axis_angle(&Vector3::x_axis(), 0.6) * Rotation3::from_axis_angle(&Vector3::z_axis(), 0.3);
    let rotation = DMatrix::from_iterator(3, 3, rotation.matrix().iter().copied());
    mesh.transform_coordinates(|x| &rotation * x);

    let settings = SmoothingSettings::default()
        .with_parameters(1.0, 1.0)
        .with_domain(SmoothingDomain::Surface);
    let solver = GradientSmoothingSolver::new(&mesh, settings.clone()).unwrap();
    assert_eq!(solver.block_size(), 3);
    assert_eq!(solver.intrinsic_dim(), 2);
    assert_eq!(solver.operator().gradient_dim(), Some(3));

    assert_reproduces(&mesh, settings.clone(), constant_field(&[1.0, 2.0, -1.0], 16), 1e-8);
    assert_reproduces(&mesh, settings.with_parameters(0.0, 1.0), wiggly_field(3, 16), 1e-9);
}

#[test]
fn inadmissible_dimensions_are_rejected() {
    let mesh = SmoothingMesh::from_coordinates(DMatrix::<f64>::zeros(4, 3));
    assert!(GradientSmoothingSolver::new(&mesh, SmoothingSettings::default()).is_err());

    let mesh = SmoothingMesh::from_coordinates(DMatrix::<f64>::zeros(1, 3));
    let settings = SmoothingSettings::default().with_domain(SmoothingDomain::Surface);
    assert!(GradientSmoothingSolver::new(&mesh, settings).is_err());
}

#[test]
fn mismatched_fields_and_geometries_are_rejected() {
    let mesh = create_unit_square_quad_mesh::<f64>(2);
    let mut solver = GradientSmoothingSolver::new(&mesh, SmoothingSettings::default()).unwrap();

    assert!(solver.assemble_rhs(&mesh, &DMatrix::<f64>::zeros(3, 9)).is_err());
    assert!(solver.assemble_rhs(&mesh, &DMatrix::<f64>::zeros(2, 8)).is_err());
    assert!(solver.write_back(&mut DMatrix::<f64>::zeros(2, 5)).is_err());

    let other = create_unit_square_quad_mesh::<f64>(3);
    assert!(solver.assemble_stiffness(&other).is_err());
    let mut field = DMatrix::<f64>::zeros(2, 9);
    assert!(solver
        .apply_gradient_smoothing(&other, &mut field, &mut linear_solver())
        .is_err());
    assert_eq!(solver.num_nodes(), 9);
}

#[test]
fn changed_connectivity_fails_assembly_without_side_effects() {
    #[rustfmt::skip]
    let coordinates = DMatrix::from_column_slice(2, 4, &[
        0.0, 0.0,
        1.0, 0.0,
        1.0, 1.0,
        0.0, 1.0,
    ]);
    let mut mesh = SmoothingMesh::from_coordinates(coordinates.clone());
    mesh.add_element(Topology::Triangle.vtk_type(), &[0, 1, 2])
        .unwrap();
    mesh.add_element(Topology::Triangle.vtk_type(), &[0, 2, 3])
        .unwrap();
    // Same node and element counts, but the other diagonal
    let mut flipped = SmoothingMesh::from_coordinates(coordinates);
    flipped
        .add_element(Topology::Triangle.vtk_type(), &[0, 1, 3])
        .unwrap();
    flipped
        .add_element(Topology::Triangle.vtk_type(), &[1, 2, 3])
        .unwrap();
    let expected = AssemblyError::ConnectivityMismatch {
        element: 0,
        nodes: (1, 3),
    };

    for parallel in [true, false] {
        let mut solver = GradientSmoothingSolver::new(&mesh, SmoothingSettings::default()).unwrap();
        solver.set_parallel(parallel);
        solver.assemble_stiffness(&mesh).unwrap();
        let assembled = solver.matrix().clone();

        let error = solver.assemble_stiffness(&flipped).unwrap_err();
        assert_eq!(assembly_error(&error), &expected);
        assert_eq!(solver.matrix(), &assembled);

        let error = solver
            .assemble_rhs(&flipped, &constant_field(&[1.0, 1.0], 4))
            .unwrap_err();
        assert_eq!(assembly_error(&error), &expected);
        assert_eq!(solver.rhs(), &DVector::zeros(8));

        let mut field = constant_field(&[1.0, 1.0], 4);
        let error = solver
            .apply_gradient_smoothing(&flipped, &mut field, &mut linear_solver())
            .unwrap_err();
        assert_eq!(assembly_error(&error).element(), 0);
        assert_eq!(field, constant_field(&[1.0, 1.0], 4));
    }
}

#[test]
fn out_of_bounds_marker_nodes_are_rejected() {
    let mesh = create_unit_square_quad_mesh::<f64>(2);
    let settings = SmoothingSettings::default().with_marker("extra", BoundaryConditionKind::Essential);
    let geometry = WithExtraMarker {
        mesh: &mesh,
        nodes: vec![0, 9],
    };
    let mut solver = GradientSmoothingSolver::new(&geometry, settings).unwrap();
    solver.assemble_stiffness(&geometry).unwrap();
    solver
        .assemble_rhs(&geometry, &constant_field(&[1.0, 1.0], 9))
        .unwrap();
    let matrix = solver.matrix().clone();
    let rhs = solver.rhs().clone();

    assert!(solver.apply_boundary_conditions(&geometry).is_err());
    assert_eq!(solver.matrix(), &matrix);
    assert_eq!(solver.rhs(), &rhs);

    let mut field = constant_field(&[1.0, 1.0], 9);
    assert!(solver
        .apply_gradient_smoothing(&geometry, &mut field, &mut linear_solver())
        .is_err());

    let in_bounds = WithExtraMarker {
        mesh: &mesh,
        nodes: vec![8, 0, 8],
    };
    solver.reset();
    assert_eq!(solver.apply_boundary_conditions(&in_bounds).unwrap(), vec![0, 8]);
}

#[test]
fn assembly_spanning_several_chunks() {
    // More elements than are held in memory at once
    let mut mesh = create_unit_square_tri_mesh::<f64>(46);
    assert!(mesh.num_elements() > 4096);
    mesh.transform_coordinates(|x| x.map(|v| v + 0.05 * (5.0 * v).sin()));
    let settings = SmoothingSettings::default().with_parameters(0.2, 1.0);
    let field = wiggly_field(2, mesh.num_nodes());

    let assemble = |mesh: &SmoothingMesh<f64>, parallel: bool| {
        let mut solver = GradientSmoothingSolver::new(mesh, settings.clone()).unwrap();
        solver.set_parallel(parallel);
        let stiffness = solver.assemble_stiffness(mesh);
        let rhs = solver.assemble_rhs(mesh, &field);
        (stiffness, rhs, solver.matrix().values().to_vec(), solver.rhs().clone())
    };
    let (stiffness, rhs, parallel_values, parallel_rhs) = assemble(&mesh, true);
    assert!(stiffness.is_ok() && rhs.is_ok());
    let (_, _, sequential_values, sequential_rhs) = assemble(&mesh, false);
    assert_eq!(parallel_values, sequential_values);
    assert_eq!(parallel_rhs, sequential_rhs);

    assert!(parallel_values.iter().any(|&v| v != 0.0));

    // A broken node in the last cell only affects elements of a later chunk
    let last_node = mesh.num_nodes() - 1;
    mesh.coordinates_mut().column_mut(last_node).fill(f64::NAN);
    let first_broken = (0..mesh.num_elements())
        .find(|&e| mesh.element_nodes(e).contains(&last_node))
        .unwrap();
    assert!(first_broken >= 4096);

    for parallel in [true, false] {
        let (stiffness, rhs, values, rhs_values) = assemble(&mesh, parallel);
        assert_eq!(assembly_error(&stiffness.unwrap_err()).element(), first_broken);
        assert_eq!(assembly_error(&rhs.unwrap_err()).element(), first_broken);
        assert!(values.iter().all(|&v| v == 0.0));
        assert!(rhs_values.iter().all(|&v| v == 0.0));
    }
}
