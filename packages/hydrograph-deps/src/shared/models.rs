//! Core identifiers
//!
//! A time-series identifier is a six-part composite name
//! `Location.Param.ParamType.Interval.Duration.Version` plus the surrogate
//! key the store assigned to it. Location, param and version may carry a
//! base/sub split at the first hyphen (`Bank-Left` = base `Bank`, sub `Left`).

use crate::errors::{DepsError, DepsResult};
use hydrograph_storage::SqlValue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Surrogate database key. Stores never assign 0.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DbKey(pub i64);

impl DbKey {
    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for DbKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DbKey {
    fn from(v: i64) -> Self {
        DbKey(v)
    }
}

impl From<DbKey> for SqlValue {
    fn from(key: DbKey) -> Self {
        SqlValue::Integer(key.0)
    }
}

/// Split `Base-Sub` at the first hyphen; no hyphen means no sub part
pub fn split_base_sub(value: &str) -> (&str, &str) {
    match value.split_once('-') {
        Some((base, sub)) => (base, sub),
        None => (value, ""),
    }
}

/// The six textual parts of a time-series identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TsIdParts {
    pub location: String,
    pub param: String,
    pub param_type: String,
    pub interval: String,
    pub duration: String,
    pub version: String,
}

impl TsIdParts {
    pub fn new(
        location: impl Into<String>,
        param: impl Into<String>,
        param_type: impl Into<String>,
        interval: impl Into<String>,
        duration: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            location: location.into(),
            param: param.into(),
            param_type: param_type.into(),
            interval: interval.into(),
            duration: duration.into(),
            version: version.into(),
        }
    }

    /// Parse `Location.Param.ParamType.Interval.Duration.Version`
    pub fn parse(unique_name: &str) -> DepsResult<Self> {
        let parts: Vec<&str> = unique_name.split('.').collect();
        if parts.len() != 6 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(DepsError::validation(format!(
                "'{}' is not a six-part time-series identifier",
                unique_name
            )));
        }
        Ok(Self::new(parts[0], parts[1], parts[2], parts[3], parts[4], parts[5]))
    }

    pub fn unique_string(&self) -> String {
        format!(
            "{}.{}.{}.{}.{}.{}",
            self.location, self.param, self.param_type, self.interval, self.duration, self.version
        )
    }

    pub fn base_location(&self) -> &str {
        split_base_sub(&self.location).0
    }

    pub fn sub_location(&self) -> &str {
        split_base_sub(&self.location).1
    }

    pub fn base_param(&self) -> &str {
        split_base_sub(&self.param).0
    }

    pub fn sub_param(&self) -> &str {
        split_base_sub(&self.param).1
    }

    pub fn base_version(&self) -> &str {
        split_base_sub(&self.version).0
    }

    pub fn sub_version(&self) -> &str {
        split_base_sub(&self.version).1
    }
}

impl fmt::Display for TsIdParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unique_string())
    }
}

/// A concrete, stored time series. Identity is the surrogate key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesIdentifier {
    pub key: DbKey,
    pub site_id: Option<DbKey>,
    pub datatype_id: Option<DbKey>,
    pub parts: TsIdParts,
}

impl TimeSeriesIdentifier {
    pub fn new(key: DbKey, parts: TsIdParts) -> Self {
        Self {
            key,
            site_id: None,
            datatype_id: None,
            parts,
        }
    }

    pub fn with_site(mut self, site_id: DbKey) -> Self {
        self.site_id = Some(site_id);
        self
    }

    pub fn with_datatype(mut self, datatype_id: DbKey) -> Self {
        self.datatype_id = Some(datatype_id);
        self
    }

    pub fn unique_string(&self) -> String {
        self.parts.unique_string()
    }
}

impl PartialEq for TimeSeriesIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for TimeSeriesIdentifier {}

impl Hash for TimeSeriesIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for TimeSeriesIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeSeriesIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for TimeSeriesIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.parts, self.key)
    }
}

/// Ordered set of identifiers, the result type of group resolution
pub type TsSet = BTreeSet<TimeSeriesIdentifier>;
