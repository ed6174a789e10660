//! Time-series metadata
//!
//! The identifier catalog is an external collaborator. The core only sees
//! [`MetadataResolver`]; two reference implementations ship here, one over
//! a map and one over the `ts_id` table.

pub mod memory_catalog;
pub mod ports;
pub mod sql_catalog;

pub use memory_catalog::InMemoryTsCatalog;
pub use ports::MetadataResolver;
pub use sql_catalog::SqlTsCatalog;
