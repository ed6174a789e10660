//! Configuration
//!
//! One versioned YAML document configures a dependency session:
//!
//! ```yaml
//! version: 1
//! cache:
//!   group_ttl_secs: 1200
//!   staleness_watermark_secs: 60
//! notify:
//!   delivery: at_least_once
//!   lease_secs: 300
//! updater:
//!   cache_refresh_secs: 900
//! ```
//!
//! Every section and field is optional except `version`; omitted values take
//! the defaults shown above. Unknown fields are rejected.

pub mod deps_config;
pub mod error;

// Re-exports
pub use deps_config::{
    CacheConfig, DeliveryMode, DepsConfig, DepsConfigFileV1, NotifyConfig, UpdaterConfig,
    SUPPORTED_VERSIONS,
};
pub use error::{ConfigError, ConfigResult, Unit};
