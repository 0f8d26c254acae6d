//! The gradient smoothing pipeline.
//!
//! [`GradientSmoothingSolver::apply_gradient_smoothing`] runs the stages
//!
//! 1. [`reset`](GradientSmoothingSolver::reset) the global matrix and vectors,
//! 2. [`assemble_stiffness`](GradientSmoothingSolver::assemble_stiffness),
//! 3. [`assemble_rhs`](GradientSmoothingSolver::assemble_rhs) from the input field,
//! 4. [`apply_boundary_conditions`](GradientSmoothingSolver::apply_boundary_conditions),
//! 5. [`solve`](GradientSmoothingSolver::solve) with a [`LinearSolver`],
//! 6. [`write_back`](GradientSmoothingSolver::write_back) the smoothed field,
//!
//! strictly in this order. The stages are public so that each may be inspected in isolation.
use crate::assembly::global::{
    apply_homogeneous_dirichlet_bc, apply_homogeneous_dirichlet_bc_rhs, assemble_block_pattern,
    ElementContribution,
};
use crate::assembly::local::{assemble_element_load, populate_system_blocks, SmoothingOperator};
use crate::element::{Element, Frame, ReferenceElement, Topology};
use crate::error::AssemblyError;
use crate::field::SensitivityField;
use crate::linear_system::{LinearSolveReport, LinearSolver};
use crate::mesh::SmoothingGeometry;
use crate::settings::{BoundaryConditionKind, SmoothingDomain, SmoothingSettings};
use crate::Real;
use eyre::eyre;
use log::{debug, info, warn};
use nalgebra::{DMatrix, DMatrixViewMut, DVector};
use rayon::prelude::*;
use sobolev_sparse::BlockCsrMatrix;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;
use std::sync::Arc;
use thread_local::ThreadLocal;

/// Number of elements whose contributions are held in memory at once during assembly.
const ASSEMBLY_CHUNK_SIZE: usize = 4096;

/// The outcome of a full smoothing pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingReport<T> {
    pub linear_solve: LinearSolveReport<T>,
    /// Owned nodes on which the homogeneous Dirichlet condition was imposed, sorted.
    pub dirichlet_nodes: Vec<usize>,
}

/// Per-thread element buffers, one element instance per topology.
#[derive(Debug)]
struct ElementWorkspace<T: Real> {
    elements: BTreeMap<Topology, Element<T>>,
    sensitivities: DMatrix<T>,
}

impl<T: Real> Default for ElementWorkspace<T> {
    fn default() -> Self {
        Self {
            elements: BTreeMap::new(),
            sensitivities: DMatrix::zeros(0, 0),
        }
    }
}

/// Smooths a per-node vector field by solving `-epsilon^2 Δu + zeta u = s` with linear
/// isoparametric finite elements.
///
/// The solver is bound to the connectivity of the geometry it was constructed with: every
/// geometry passed to its stages must have the same nodes and elements, although node
/// coordinates may change between passes.
#[derive(Debug)]
pub struct GradientSmoothingSolver<T: Real> {
    settings: SmoothingSettings,
    operator: SmoothingOperator<T>,
    coordinate_dim: usize,
    intrinsic_dim: usize,
    num_elements: usize,
    reference_elements: BTreeMap<Topology, Arc<ReferenceElement<T>>>,
    matrix: BlockCsrMatrix<T>,
    rhs: DVector<T>,
    solution: DVector<T>,
    workspace: ThreadLocal<RefCell<ElementWorkspace<T>>>,
    parallel: bool,
}

impl<T: Real> GradientSmoothingSolver<T> {
    /// Builds the reference elements admissible for the configured domain, the block sparsity
    /// pattern of the mesh, and zeroed system vectors.
    ///
    /// Fails if the coordinate dimension is not admissible for the domain, or if any element
    /// cannot be assembled: an unsupported tag, a topology of the wrong dimension, a wrong node
    /// count or out-of-bounds node indices. Element failures are [`AssemblyError`]s.
    pub fn new<G>(geometry: &G, settings: SmoothingSettings) -> eyre::Result<Self>
    where
        G: ?Sized + SmoothingGeometry<T>,
    {
        let coordinate_dim = geometry.coordinate_dim();
        let intrinsic_dim = match settings.domain {
            SmoothingDomain::Volume if (1..=3).contains(&coordinate_dim) => coordinate_dim,
            SmoothingDomain::Surface if (2..=3).contains(&coordinate_dim) => coordinate_dim - 1,
            domain => {
                return Err(eyre!(
                    "{:?} smoothing is not supported for {}-dimensional coordinates",
                    domain,
                    coordinate_dim
                ))
            }
        };

        let reference_elements: BTreeMap<_, _> = Topology::ALL
            .into_iter()
            .filter(|topology| topology.reference_dim() == intrinsic_dim)
            .map(|topology| (topology, Arc::new(ReferenceElement::new(topology))))
            .collect();

        let operator = SmoothingOperator::new(nalgebra::convert(settings.epsilon), nalgebra::convert(settings.zeta))
            .with_gradient_dim(intrinsic_dim + usize::from(settings.domain == SmoothingDomain::Surface));

        // The pattern can only be built from valid connectivity
        let num_nodes = geometry.num_nodes();
        let num_elements = geometry.num_elements();
        for element in 0..num_elements {
            resolve_topology(geometry, element, &reference_elements, intrinsic_dim)?;
        }
        let pattern = assemble_block_pattern(num_nodes, (0..num_elements).map(|e| geometry.element_nodes(e)));
        let matrix = BlockCsrMatrix::from_pattern(Arc::new(pattern), coordinate_dim);

        debug!(
            "Created smoothing solver for {} nodes and {} elements ({:?}, block size {}, {} stored blocks)",
            num_nodes,
            num_elements,
            settings.domain,
            coordinate_dim,
            matrix.num_blocks()
        );

        Ok(Self {
            settings,
            operator,
            coordinate_dim,
            intrinsic_dim,
            num_elements,
            reference_elements,
            matrix,
            rhs: DVector::zeros(coordinate_dim * num_nodes),
            solution: DVector::zeros(coordinate_dim * num_nodes),
            workspace: ThreadLocal::new(),
            parallel: true,
        })
    }

    pub fn settings(&self) -> &SmoothingSettings {
        &self.settings
    }

    pub fn operator(&self) -> &SmoothingOperator<T> {
        &self.operator
    }

    /// The number of solution components per node, equal to the coordinate dimension.
    pub fn block_size(&self) -> usize {
        self.coordinate_dim
    }

    /// The dimension of the reference domain of the elements that are smoothed over.
    pub fn intrinsic_dim(&self) -> usize {
        self.intrinsic_dim
    }

    pub fn num_nodes(&self) -> usize {
        self.matrix.num_block_rows()
    }

    pub fn reference_element(&self, topology: Topology) -> Option<&Arc<ReferenceElement<T>>> {
        self.reference_elements.get(&topology)
    }

    pub fn matrix(&self) -> &BlockCsrMatrix<T> {
        &self.matrix
    }

    pub fn rhs(&self) -> &DVector<T> {
        &self.rhs
    }

    pub fn solution(&self) -> &DVector<T> {
        &self.solution
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Enables or disables parallel assembly. Both modes produce identical results.
    pub fn set_parallel(&mut self, parallel: bool) {
        self.parallel = parallel;
    }

    /// Zeroes the global matrix, right-hand side and solution, and drops all per-thread
    /// element buffers.
    pub fn reset(&mut self) {
        debug!("Resetting smoothing system");
        self.matrix.fill_zero();
        self.rhs.fill(T::zero());
        self.solution.fill(T::zero());
        self.workspace.clear();
    }

    /// Adds the system blocks of every element to the global matrix.
    ///
    /// On failure, nothing is added and the error of the first failing element is returned.
    /// An element that couples nodes the solver was not built with fails with
    /// [`AssemblyError::ConnectivityMismatch`].
    pub fn assemble_stiffness<G>(&mut self, geometry: &G) -> eyre::Result<()>
    where
        G: ?Sized + Sync + SmoothingGeometry<T>,
    {
        self.check_connectivity(geometry)?;
        debug!("Assembling smoothing operator over {} elements", self.num_elements);
        let mut staged = BlockCsrMatrix::from_pattern(Arc::clone(self.matrix.pattern()), self.block_size());
        self.reduce_contributions(
            |ws, element| self.element_stiffness(ws, geometry, element),
            |contribution| contribution.add_to_matrix(&mut staged),
        )?;
        self.matrix.add_assign_same_pattern(&staged);
        Ok(())
    }

    /// Adds the consistent load of the field, `∫ N_i s_h`, to the right-hand side.
    ///
    /// The field must have one value per node and one component per solution component.
    /// On failure, nothing is added and the error of the first failing element is returned.
    pub fn assemble_rhs<G, F>(&mut self, geometry: &G, field: &F) -> eyre::Result<()>
    where
        G: ?Sized + Sync + SmoothingGeometry<T>,
        F: ?Sized + Sync + SensitivityField<T>,
    {
        self.check_connectivity(geometry)?;
        self.check_field(field.num_nodes(), field.num_components())?;
        debug!("Assembling smoothing right-hand side over {} elements", self.num_elements);
        let mut staged = DVector::zeros(self.rhs.len());
        self.reduce_contributions(
            |ws, element| self.element_load(ws, geometry, field, element),
            |contribution| contribution.add_to_vector(&mut staged),
        )?;
        self.rhs += staged;
        Ok(())
    }

    /// Imposes the homogeneous Dirichlet condition of every essential marker.
    ///
    /// Owned marker nodes get their block row replaced by a scaled identity, their block column
    /// zeroed and their right-hand side and solution entries zeroed. Halo marker nodes only get
    /// their block column zeroed. Natural markers, and markers without a configured kind, leave
    /// the system untouched.
    ///
    /// Returns the owned Dirichlet nodes, sorted. Fails without touching the system if an
    /// essential marker references a node outside of the mesh.
    pub fn apply_boundary_conditions<G>(&mut self, geometry: &G) -> eyre::Result<Vec<usize>>
    where
        G: ?Sized + SmoothingGeometry<T>,
    {
        let num_nodes = self.num_nodes();
        let mut owned = BTreeSet::new();
        let mut halo = BTreeSet::new();
        for marker in 0..geometry.num_markers() {
            let name = geometry.marker_name(marker);
            match self.settings.markers.get(name) {
                Some(BoundaryConditionKind::Essential) => {
                    for &node in geometry.marker_nodes(marker) {
                        if node >= num_nodes {
                            return Err(eyre!(
                                "marker {} references node {}, but the mesh has {} nodes",
                                name,
                                node,
                                num_nodes
                            ));
                        }
                        if geometry.is_halo(node) {
                            halo.insert(node);
                        } else {
                            owned.insert(node);
                        }
                    }
                }
                Some(BoundaryConditionKind::Natural) => {}
                None => warn!(
                    "No boundary condition configured for marker {}, treating it as natural",
                    name
                ),
            }
        }

        let owned: Vec<usize> = owned.into_iter().collect();
        let halo: Vec<usize> = halo.into_iter().collect();
        debug!(
            "Imposing Dirichlet conditions on {} owned and {} halo nodes",
            owned.len(),
            halo.len()
        );

        let block_size = self.block_size();
        apply_homogeneous_dirichlet_bc(&mut self.matrix, &owned, &halo);
        apply_homogeneous_dirichlet_bc_rhs(&mut self.rhs, &owned, block_size);
        apply_homogeneous_dirichlet_bc_rhs(&mut self.solution, &owned, block_size);
        Ok(owned)
    }

    /// Solves the assembled system, starting from the current solution.
    ///
    /// A solve that does not converge is logged and reported, not raised.
    pub fn solve(&mut self, linear_solver: &mut dyn LinearSolver<T>) -> eyre::Result<LinearSolveReport<T>> {
        debug!("Solving smoothing system with {} unknowns", self.rhs.len());
        let report = linear_solver.solve(&self.matrix, &self.rhs, &mut self.solution)?;
        if report.converged {
            info!(
                "Smoothing solve converged in {} iterations (residual norm {})",
                report.iterations, report.residual_norm
            );
        } else {
            warn!(
                "Smoothing solve did not converge after {} iterations (residual norm {})",
                report.iterations, report.residual_norm
            );
        }
        Ok(report)
    }

    /// Overwrites every value of the field with the solution.
    pub fn write_back<F>(&self, field: &mut F) -> eyre::Result<()>
    where
        F: ?Sized + SensitivityField<T>,
    {
        self.check_field(field.num_nodes(), field.num_components())?;
        let block_size = self.block_size();
        for node in 0..self.num_nodes() {
            for component in 0..block_size {
                field.set_sensitivity(node, component, self.solution[block_size * node + component]);
            }
        }
        Ok(())
    }

    /// Replaces the field by its smoothed counterpart, running all stages in order.
    pub fn apply_gradient_smoothing<G, F>(
        &mut self,
        geometry: &G,
        field: &mut F,
        linear_solver: &mut dyn LinearSolver<T>,
    ) -> eyre::Result<SmoothingReport<T>>
    where
        G: ?Sized + Sync + SmoothingGeometry<T>,
        F: ?Sized + Sync + SensitivityField<T>,
    {
        self.reset();
        self.assemble_stiffness(geometry)?;
        self.assemble_rhs(geometry, &*field)?;
        let dirichlet_nodes = self.apply_boundary_conditions(geometry)?;
        let linear_solve = self.solve(linear_solver)?;
        self.write_back(field)?;
        Ok(SmoothingReport {
            linear_solve,
            dirichlet_nodes,
        })
    }
}

impl<T: Real> GradientSmoothingSolver<T> {
    fn check_connectivity<G>(&self, geometry: &G) -> eyre::Result<()>
    where
        G: ?Sized + SmoothingGeometry<T>,
    {
        if geometry.num_nodes() != self.num_nodes() || geometry.num_elements() != self.num_elements {
            return Err(eyre!(
                "geometry with {} nodes and {} elements does not match solver built for {} nodes and {} elements",
                geometry.num_nodes(),
                geometry.num_elements(),
                self.num_nodes(),
                self.num_elements
            ));
        }
        if geometry.coordinate_dim() != self.coordinate_dim {
            return Err(eyre!(
                "geometry coordinate dimension {} does not match solver dimension {}",
                geometry.coordinate_dim(),
                self.coordinate_dim
            ));
        }
        Ok(())
    }

    fn check_field(&self, num_nodes: usize, num_components: usize) -> eyre::Result<()> {
        if num_nodes != self.num_nodes() || num_components != self.block_size() {
            return Err(eyre!(
                "field of {} nodes with {} components does not match solver with {} nodes and {} components",
                num_nodes,
                num_components,
                self.num_nodes(),
                self.block_size()
            ));
        }
        Ok(())
    }

    fn resolve_topology<G>(&self, geometry: &G, element: usize) -> Result<Topology, AssemblyError>
    where
        G: ?Sized + SmoothingGeometry<T>,
    {
        resolve_topology(geometry, element, &self.reference_elements, self.intrinsic_dim)
    }

    /// Every node pair of the element must be stored in the matrix pattern.
    fn check_element_coupling<G>(&self, geometry: &G, element: usize) -> Result<(), AssemblyError>
    where
        G: ?Sized + SmoothingGeometry<T>,
    {
        let nodes = geometry.element_nodes(element);
        for &a in nodes {
            if let Some(&b) = nodes
                .iter()
                .find(|&&b| self.matrix.find_block_index(a, b).is_none())
            {
                return Err(AssemblyError::ConnectivityMismatch {
                    element,
                    nodes: (a, b),
                });
            }
        }
        Ok(())
    }

    /// Loads the coordinates of the element into the cleared element instance of its topology
    /// and computes reference-frame gradients.
    fn prepare_element<'w, G>(
        &self,
        elements: &'w mut BTreeMap<Topology, Element<T>>,
        geometry: &G,
        element_index: usize,
    ) -> Result<&'w mut Element<T>, AssemblyError>
    where
        G: ?Sized + SmoothingGeometry<T>,
    {
        let topology = self.resolve_topology(geometry, element_index)?;
        self.check_element_coupling(geometry, element_index)?;
        let coordinate_dim = self.coordinate_dim;
        let element = elements.entry(topology).or_insert_with(|| {
            let reference = self.reference_elements[&topology].clone();
            Element::new(reference, coordinate_dim)
        });

        element.clear_element();
        element.set_ref_coords_from(
            geometry.reference_coordinates(),
            geometry.element_nodes(element_index),
        );
        element.compute_gradients(Frame::Reference);
        if !element.is_valid(Frame::Reference) {
            return Err(AssemblyError::InvalidElementGeometry {
                element: element_index,
                topology,
            });
        }
        Ok(element)
    }

    fn element_stiffness<G>(
        &self,
        ws: &mut ElementWorkspace<T>,
        geometry: &G,
        element_index: usize,
    ) -> Result<ElementContribution<T>, AssemblyError>
    where
        G: ?Sized + SmoothingGeometry<T>,
    {
        let element = self.prepare_element(&mut ws.elements, geometry, element_index)?;
        self.operator.compute_tangent_matrix(element);

        let nodes = geometry.element_nodes(element_index).to_vec();
        let mut contribution = ElementContribution::new(element_index, nodes, self.block_size());
        populate_system_blocks(element, &mut contribution.matrix_blocks);
        Ok(contribution)
    }

    fn element_load<G, F>(
        &self,
        ws: &mut ElementWorkspace<T>,
        geometry: &G,
        field: &F,
        element_index: usize,
    ) -> Result<ElementContribution<T>, AssemblyError>
    where
        G: ?Sized + SmoothingGeometry<T>,
        F: ?Sized + SensitivityField<T>,
    {
        let block_size = self.block_size();
        let element = self.prepare_element(&mut ws.elements, geometry, element_index)?;
        let nodes = geometry.element_nodes(element_index);

        let sensitivities = &mut ws.sensitivities;
        sensitivities.resize_mut(block_size, nodes.len(), T::zero());
        for (local, &node) in nodes.iter().enumerate() {
            for component in 0..block_size {
                sensitivities[(component, local)] = field.sensitivity(node, component);
            }
        }

        let mut contribution = ElementContribution::new(element_index, nodes.to_vec(), block_size);
        contribution.vector_blocks = vec![T::zero(); block_size * nodes.len()];
        let rhs = DMatrixViewMut::from_slice(&mut contribution.vector_blocks, block_size, nodes.len());
        assemble_element_load(element, sensitivities.as_view(), rhs);
        Ok(contribution)
    }

    /// Computes one contribution per element, in parallel if enabled, and hands them to
    /// `reduce` on the calling thread in element order.
    ///
    /// Elements are processed in chunks of [`ASSEMBLY_CHUNK_SIZE`], and only the contributions
    /// of the current chunk are held in memory. Every element of a chunk is computed even if
    /// some fail. The error of the lowest failing element index is returned, so that the outcome
    /// does not depend on scheduling, and later chunks are skipped.
    fn reduce_contributions<F, R>(&self, compute: F, mut reduce: R) -> Result<(), AssemblyError>
    where
        F: Sync + Fn(&mut ElementWorkspace<T>, usize) -> Result<ElementContribution<T>, AssemblyError>,
        R: FnMut(&ElementContribution<T>),
    {
        let compute_with_workspace = |element: usize| {
            let ws = &mut *self.workspace.get_or_default().borrow_mut();
            compute(ws, element)
        };
        for chunk_begin in (0..self.num_elements).step_by(ASSEMBLY_CHUNK_SIZE) {
            let chunk = chunk_begin..usize::min(chunk_begin + ASSEMBLY_CHUNK_SIZE, self.num_elements);
            let results: Vec<_> = if self.parallel {
                chunk
                    .into_par_iter()
                    .with_min_len(64)
                    .map(&compute_with_workspace)
                    .collect()
            } else {
                chunk.map(&compute_with_workspace).collect()
            };
            for result in results {
                reduce(&result?);
            }
        }
        Ok(())
    }
}

/// Looks up the topology of the element and validates its connectivity.
fn resolve_topology<T, G>(
    geometry: &G,
    element: usize,
    reference_elements: &BTreeMap<Topology, Arc<ReferenceElement<T>>>,
    intrinsic_dim: usize,
) -> Result<Topology, AssemblyError>
where
    T: Real,
    G: ?Sized + SmoothingGeometry<T>,
{
    let tag = geometry.element_tag(element);
    let topology = Topology::try_from(tag).map_err(|_| AssemblyError::UnsupportedTopology { element, tag })?;
    if !reference_elements.contains_key(&topology) {
        return Err(AssemblyError::TopologyDimensionMismatch {
            element,
            topology,
            expected_dim: intrinsic_dim,
        });
    }

    let nodes = geometry.element_nodes(element);
    if nodes.len() != topology.num_nodes() {
        return Err(AssemblyError::NodeCountMismatch {
            element,
            topology,
            expected: topology.num_nodes(),
            actual: nodes.len(),
        });
    }
    let num_nodes = geometry.num_nodes();
    if let Some(&node) = nodes.iter().find(|&&node| node >= num_nodes) {
        return Err(AssemblyError::NodeOutOfBounds {
            element,
            node,
            num_nodes,
        });
    }
    Ok(topology)
}
