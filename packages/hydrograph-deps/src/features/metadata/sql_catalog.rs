//! `ts_id` table catalog with a session cache in front

use super::ports::MetadataResolver;
use crate::errors::{DepsError, DepsResult, ObjectKind};
use crate::features::cache::{Cachable, ObjectCache};
use crate::shared::models::{DbKey, TimeSeriesIdentifier, TsIdParts};
use hydrograph_storage::{sql_params, Row, StatementExecutor};
use std::sync::Arc;

const SELECT_TS: &str = "SELECT ts_key, site_id, datatype_id, location, param, param_type, \
                         interval, duration, version FROM ts_id";

impl Cachable for TimeSeriesIdentifier {
    fn cache_key(&self) -> DbKey {
        self.key
    }

    fn unique_name(&self) -> Option<String> {
        Some(self.unique_string())
    }
}

fn ts_from_row(row: &Row) -> DepsResult<TimeSeriesIdentifier> {
    Ok(TimeSeriesIdentifier {
        key: DbKey(row.get_i64("ts_key")?),
        site_id: row.get_opt_i64("site_id")?.map(DbKey),
        datatype_id: row.get_opt_i64("datatype_id")?.map(DbKey),
        parts: TsIdParts {
            location: row.get_string("location")?,
            param: row.get_string("param")?,
            param_type: row.get_string_or_empty("param_type")?,
            interval: row.get_string_or_empty("interval")?,
            duration: row.get_string_or_empty("duration")?,
            version: row.get_string_or_empty("version")?,
        },
    })
}

pub struct SqlTsCatalog {
    db: Arc<dyn StatementExecutor>,
    cache: ObjectCache<TimeSeriesIdentifier>,
}

impl SqlTsCatalog {
    pub fn new(db: Arc<dyn StatementExecutor>, cache: ObjectCache<TimeSeriesIdentifier>) -> Self {
        Self { db, cache }
    }

    pub fn cache(&self) -> &ObjectCache<TimeSeriesIdentifier> {
        &self.cache
    }

    /// Register a new identifier and return it with its assigned key
    pub fn create(
        &self,
        parts: &TsIdParts,
        site_id: Option<DbKey>,
        datatype_id: Option<DbKey>,
    ) -> DepsResult<TimeSeriesIdentifier> {
        let row = self
            .db
            .query_one(
                "INSERT INTO ts_id (site_id, datatype_id, location, param, param_type, interval, \
                 duration, version, unique_name) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                 RETURNING ts_key",
                &sql_params![
                    site_id,
                    datatype_id,
                    &parts.location,
                    &parts.param,
                    &parts.param_type,
                    &parts.interval,
                    &parts.duration,
                    &parts.version,
                    parts.unique_string()
                ],
            )?
            .ok_or_else(|| DepsError::validation("ts_id insert returned no key"))?;

        let ts = TimeSeriesIdentifier {
            key: DbKey(row.get_i64("ts_key")?),
            site_id,
            datatype_id,
            parts: parts.clone(),
        };
        tracing::debug!(ts_key = %ts.key, name = %ts.parts, "time series created");
        self.cache.put(ts.clone());
        Ok(ts)
    }

    /// Remove an identifier row. Dependency clean-up is the tracker's job.
    pub fn delete(&self, key: DbKey) -> DepsResult<bool> {
        self.cache.remove(key);
        let n = self
            .db
            .execute("DELETE FROM ts_id WHERE ts_key = ?1", &sql_params![key])?;
        Ok(n > 0)
    }

    fn load_all(&self) -> DepsResult<Vec<TimeSeriesIdentifier>> {
        self.db
            .query(&format!("{SELECT_TS} ORDER BY ts_key"), &[])?
            .iter()
            .map(ts_from_row)
            .collect()
    }
}

impl MetadataResolver for SqlTsCatalog {
    fn by_key(&self, key: DbKey) -> DepsResult<TimeSeriesIdentifier> {
        if let Some(ts) = self.cache.get_by_key(key) {
            return Ok(ts);
        }
        let row = self
            .db
            .query_one(&format!("{SELECT_TS} WHERE ts_key = ?1"), &sql_params![key])?
            .ok_or_else(|| DepsError::not_found(ObjectKind::TimeSeries, key))?;
        let ts = ts_from_row(&row)?;
        self.cache.put(ts.clone());
        Ok(ts)
    }

    fn resolve(&self, parts: &TsIdParts) -> DepsResult<TimeSeriesIdentifier> {
        let unique = parts.unique_string();
        if let Some(ts) = self.cache.get_by_name(&unique) {
            return Ok(ts);
        }
        let row = self
            .db
            .query_one(
                &format!("{SELECT_TS} WHERE unique_name = ?1"),
                &sql_params![unique.as_str()],
            )?
            .ok_or_else(|| DepsError::not_found(ObjectKind::TimeSeries, &unique))?;
        let ts = ts_from_row(&row)?;
        self.cache.put(ts.clone());
        Ok(ts)
    }

    fn list_all(&self) -> DepsResult<Vec<TimeSeriesIdentifier>> {
        if self.cache.needs_refill() {
            let all = self.load_all()?;
            tracing::debug!(count = all.len(), "time-series cache refilled");
            self.cache.refill(all);
        }
        Ok(self.cache.iter().iter().cloned().collect())
    }

    fn invalidate(&self, key: Option<DbKey>) {
        match key {
            Some(k) => {
                self.cache.remove(k);
            }
            None => self.cache.clear(),
        }
    }
}
