//! Common test utilities for hydrograph-deps
//!
//! Shared catalogs, sessions and a query-counting executor for the
//! integration tests.

#![allow(dead_code)]

mod fixtures;
mod counting;

pub use counting::*;
pub use fixtures::*;
