//! Port to the external metadata component that owns time-series identifiers

use crate::errors::DepsResult;
use crate::shared::models::{DbKey, TimeSeriesIdentifier, TsIdParts};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MetadataResolver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Canonical identifier lookup.
///
/// Absence is reported as [`crate::DepsError::NotFound`]; any other error is
/// a backing-store failure and aborts whatever operation asked.
pub trait MetadataResolver: Send + Sync {
    fn by_key(&self, key: DbKey) -> DepsResult<TimeSeriesIdentifier>;

    /// Canonical identifier for a (possibly template-transformed) name
    fn resolve(&self, parts: &TsIdParts) -> DepsResult<TimeSeriesIdentifier>;

    /// Every known identifier; the universe group criteria are matched against
    fn list_all(&self) -> DepsResult<Vec<TimeSeriesIdentifier>>;

    /// Forget one cached identifier, or everything with `None`
    fn invalidate(&self, key: Option<DbKey>);
}
