//! Computations: definitions and their store

pub mod model;
pub mod store;

pub use model::{CompParm, Computation, ParmDirection, ParmTemplate, TIMED_INTERVAL_PROPERTY};
pub use store::{CompFilter, ComputationStore};
