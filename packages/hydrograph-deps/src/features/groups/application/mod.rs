//! Group application layer: expansion

pub mod resolver;

pub use resolver::{GroupExpansion, GroupResolver, GroupSource};
