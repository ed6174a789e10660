//! In-memory identifier catalog

use super::ports::MetadataResolver;
use crate::errors::{DepsError, DepsResult, ObjectKind};
use crate::shared::models::{DbKey, TimeSeriesIdentifier, TsIdParts};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct InMemoryTsCatalog {
    series: RwLock<BTreeMap<DbKey, TimeSeriesIdentifier>>,
}

impl InMemoryTsCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series<I>(series: I) -> Self
    where
        I: IntoIterator<Item = TimeSeriesIdentifier>,
    {
        let catalog = Self::new();
        for ts in series {
            catalog.insert(ts);
        }
        catalog
    }

    pub fn insert(&self, ts: TimeSeriesIdentifier) {
        self.series.write().insert(ts.key, ts);
    }

    pub fn remove(&self, key: DbKey) -> Option<TimeSeriesIdentifier> {
        self.series.write().remove(&key)
    }

    pub fn len(&self) -> usize {
        self.series.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataResolver for InMemoryTsCatalog {
    fn by_key(&self, key: DbKey) -> DepsResult<TimeSeriesIdentifier> {
        self.series
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| DepsError::not_found(ObjectKind::TimeSeries, key))
    }

    fn resolve(&self, parts: &TsIdParts) -> DepsResult<TimeSeriesIdentifier> {
        let wanted = parts.unique_string();
        self.series
            .read()
            .values()
            .find(|ts| ts.unique_string().eq_ignore_ascii_case(&wanted))
            .cloned()
            .ok_or_else(|| DepsError::not_found(ObjectKind::TimeSeries, wanted))
    }

    fn list_all(&self) -> DepsResult<Vec<TimeSeriesIdentifier>> {
        Ok(self.series.read().values().cloned().collect())
    }

    fn invalidate(&self, _key: Option<DbKey>) {}
}
