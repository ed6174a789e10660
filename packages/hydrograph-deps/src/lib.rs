/*
 * hydrograph-deps - computation dependency tracking for time-series databases
 *
 * Feature-first layout:
 * - shared/    : identifiers, keys, clock
 * - config/    : versioned YAML session configuration
 * - features/  : cache → metadata → groups → computation → dependency → notify → updater
 * - api/       : DependencyService session facade
 *
 * Storage goes through hydrograph-storage's StatementExecutor; every
 * multi-statement write runs in one transaction.
 */

#![allow(clippy::too_many_arguments)] // Stores take their collaborators explicitly
#![allow(clippy::new_without_default)]

// ═══════════════════════════════════════════════════════════════════════════
// Module Exports
// ═══════════════════════════════════════════════════════════════════════════

pub mod api;
pub mod config;
pub mod errors;
pub mod features;
pub mod shared;

pub use api::{DependencyService, GroupDeletion};
pub use config::{ConfigError, DeliveryMode, DepsConfig};
pub use errors::{DepsError, DepsResult, ObjectKind};
pub use features::cache::{CacheKind, ObjectCache};
pub use features::computation::{CompFilter, CompParm, Computation, ParmDirection, ParmTemplate};
pub use features::dependency::{DependencyEdge, DependencyTracker, ReplaceOutcome};
pub use features::groups::{CombineMode, GroupExpansion, GroupResolver, GroupSource, TsGroup};
pub use features::metadata::{InMemoryTsCatalog, MetadataResolver, SqlTsCatalog};
pub use features::notify::{NotificationQueue, NotificationRecord, NotifyEventType};
pub use features::updater::{DependsUpdater, PollOutcome, UpdaterStats};
pub use shared::{Clock, DbKey, ManualClock, SystemClock, TimeSeriesIdentifier, TsIdParts, TsSet};
