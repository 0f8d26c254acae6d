//! Element-local evaluation of the smoothing operator and its global assembly.
pub mod global;
pub mod local;
