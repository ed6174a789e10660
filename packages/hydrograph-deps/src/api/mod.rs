//! Public entry point

pub mod service;

pub use service::{DependencyService, GroupDeletion};
