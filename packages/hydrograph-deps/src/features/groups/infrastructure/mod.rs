//! Group persistence

pub mod group_store;
pub mod parent_graph;

pub use group_store::GroupStore;
pub use parent_graph::GroupParentGraph;
