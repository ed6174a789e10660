//! Object cache backing every store
//!
//! Each [`crate::api::DependencyService`] session owns its caches; nothing
//! here is process-global.

pub mod metrics;
pub mod object_cache;

pub use metrics::CacheMetrics;
pub use object_cache::{Cachable, CacheSnapshot, CacheStats, ObjectCache};

/// Which session cache an invalidation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Groups,
    Computations,
    TimeSeries,
    All,
}
