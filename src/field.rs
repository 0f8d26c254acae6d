//! The per-node field that is smoothed in place.
use nalgebra::{DMatrix, Scalar};

/// A vector-valued field with one value per mesh node, read before assembly and overwritten
/// with the smoothed values afterwards.
pub trait SensitivityField<T> {
    fn num_nodes(&self) -> usize;

    fn num_components(&self) -> usize;

    fn sensitivity(&self, node: usize, component: usize) -> T;

    fn set_sensitivity(&mut self, node: usize, component: usize, value: T);
}

/// One column per node, one row per component.
impl<T: Scalar> SensitivityField<T> for DMatrix<T> {
    fn num_nodes(&self) -> usize {
        self.ncols()
    }

    fn num_components(&self) -> usize {
        self.nrows()
    }

    fn sensitivity(&self, node: usize, component: usize) -> T {
        self[(component, node)].clone()
    }

    fn set_sensitivity(&mut self, node: usize, component: usize, value: T) {
        self[(component, node)] = value;
    }
}
