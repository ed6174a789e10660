//! Dependency edges: which series changes trigger which computations

pub mod model;
pub mod tracker;

pub use model::{DependencyEdge, ReplaceOutcome};
pub use tracker::DependencyTracker;
