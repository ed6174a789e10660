//! Dependency edge maintenance
//!
//! Edges are recomputed from a computation's input parameters and written
//! with a scratch-table diff:
//!
//! ```text
//! scratch(c) := new edges
//! live(c)    -= live(c) \ scratch(c)      -- deleted
//! live(c)    += scratch(c) \ live(c)      -- inserted
//! scratch(c) := ∅
//! ```
//!
//! all inside one transaction, so live rows only change by the true delta.

use super::model::{DependencyEdge, ReplaceOutcome};
use crate::errors::{DepsError, DepsResult};
use crate::features::computation::Computation;
use crate::features::groups::{GroupResolver, GroupStore};
use crate::features::metadata::MetadataResolver;
use crate::shared::models::{DbKey, TimeSeriesIdentifier, TsSet};
use hydrograph_storage::{in_transaction, sql_params, SqlValue, StatementExecutor};
use std::collections::BTreeSet;
use std::sync::Arc;

const DELETE_STALE: &str = "DELETE FROM cp_comp_depends WHERE computation_id = ?1 \
     AND ts_key NOT IN (SELECT ts_key FROM cp_comp_depends_scratchpad WHERE computation_id = ?1)";

const INSERT_NEW: &str = "INSERT INTO cp_comp_depends (ts_key, computation_id) \
     SELECT ts_key, computation_id FROM cp_comp_depends_scratchpad WHERE computation_id = ?1 \
     AND ts_key NOT IN (SELECT ts_key FROM cp_comp_depends WHERE computation_id = ?1)";

const DELETE_STALE_ALL: &str = "DELETE FROM cp_comp_depends WHERE NOT EXISTS \
     (SELECT 1 FROM cp_comp_depends_scratchpad s \
      WHERE s.ts_key = cp_comp_depends.ts_key AND s.computation_id = cp_comp_depends.computation_id)";

const INSERT_NEW_ALL: &str = "INSERT INTO cp_comp_depends (ts_key, computation_id) \
     SELECT ts_key, computation_id FROM cp_comp_depends_scratchpad \
     EXCEPT SELECT ts_key, computation_id FROM cp_comp_depends";

pub struct DependencyTracker {
    db: Arc<dyn StatementExecutor>,
    groups: Arc<GroupStore>,
    metadata: Arc<dyn MetadataResolver>,
}

impl DependencyTracker {
    pub fn new(
        db: Arc<dyn StatementExecutor>,
        groups: Arc<GroupStore>,
        metadata: Arc<dyn MetadataResolver>,
    ) -> Self {
        Self {
            db,
            groups,
            metadata,
        }
    }

    /// Edges the computation should have right now. Disabled and timed
    /// computations have none.
    pub fn recompute(&self, comp: &Computation) -> DepsResult<BTreeSet<DependencyEdge>> {
        let comp_id = comp
            .id
            .ok_or_else(|| DepsError::validation("cannot track dependencies of an unsaved computation"))?;
        let mut edges = BTreeSet::new();
        if !comp.is_triggered() {
            return Ok(edges);
        }

        let mut members: Option<TsSet> = None;
        for parm in comp.inputs() {
            if let Some(ts_key) = parm.ts_key {
                edges.insert(DependencyEdge::new(ts_key, comp_id));
                continue;
            }
            let Some(group_id) = comp.group_id else {
                tracing::debug!(comp = %comp, role = %parm.role_name, "unbound input without a group; no edges");
                continue;
            };
            if members.is_none() {
                members = Some(self.group_members(group_id)?);
            }
            let Some(members) = members.as_ref() else {
                continue;
            };

            for member in members {
                let (parts, changed) = parm.template.transform(&member.parts);
                if !changed {
                    edges.insert(DependencyEdge::new(member.key, comp_id));
                    continue;
                }
                match self.metadata.resolve(&parts) {
                    Ok(ts) => {
                        edges.insert(DependencyEdge::new(ts.key, comp_id));
                    }
                    Err(e) if e.is_not_found() => {
                        tracing::trace!(comp = %comp, member = %member.key, transformed = %parts, "no such series; skipped");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        tracing::debug!(comp = %comp, edges = edges.len(), "dependencies recomputed");
        Ok(edges)
    }

    fn group_members(&self, group_id: DbKey) -> DepsResult<TsSet> {
        let resolver = GroupResolver::new(self.groups.as_ref(), self.metadata.as_ref());
        match resolver.resolve_id(group_id) {
            Ok(members) => Ok(members),
            Err(e) if e.is_not_found() => {
                tracing::warn!(group = %group_id, "computation references a missing group; no group members");
                Ok(TsSet::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Make `comp_id`'s live edges equal `edges`
    pub fn replace(&self, comp_id: DbKey, edges: &BTreeSet<DependencyEdge>) -> DepsResult<ReplaceOutcome> {
        if let Some(foreign) = edges.iter().find(|e| e.computation_id != comp_id) {
            return Err(DepsError::validation(format!(
                "edge {} does not belong to computation {}",
                foreign, comp_id
            )));
        }

        let outcome = in_transaction(self.db.as_ref(), |db| -> DepsResult<ReplaceOutcome> {
            db.execute(
                "DELETE FROM cp_comp_depends_scratchpad WHERE computation_id = ?1",
                &sql_params![comp_id],
            )?;
            for edge in edges {
                db.execute(
                    "INSERT INTO cp_comp_depends_scratchpad (ts_key, computation_id) VALUES (?1, ?2)",
                    &sql_params![edge.ts_key, comp_id],
                )?;
            }
            let deleted = db.execute(DELETE_STALE, &sql_params![comp_id])?;
            let inserted = db.execute(INSERT_NEW, &sql_params![comp_id])?;
            db.execute(
                "DELETE FROM cp_comp_depends_scratchpad WHERE computation_id = ?1",
                &sql_params![comp_id],
            )?;
            Ok(ReplaceOutcome { inserted, deleted })
        })?;

        if !outcome.is_noop() {
            tracing::info!(
                comp = %comp_id,
                inserted = outcome.inserted,
                deleted = outcome.deleted,
                "dependencies replaced"
            );
        }
        Ok(outcome)
    }

    pub fn recompute_and_replace(&self, comp: &Computation) -> DepsResult<ReplaceOutcome> {
        let edges = self.recompute(comp)?;
        let comp_id = comp.id.unwrap_or_default();
        self.replace(comp_id, &edges)
    }

    pub fn remove_for_computation(&self, comp_id: DbKey) -> DepsResult<usize> {
        in_transaction(self.db.as_ref(), |db| -> DepsResult<usize> {
            db.execute(
                "DELETE FROM cp_comp_depends_scratchpad WHERE computation_id = ?1",
                &sql_params![comp_id],
            )?;
            Ok(db.execute(
                "DELETE FROM cp_comp_depends WHERE computation_id = ?1",
                &sql_params![comp_id],
            )?)
        })
    }

    pub fn remove_for_time_series(&self, ts_key: DbKey) -> DepsResult<usize> {
        in_transaction(self.db.as_ref(), |db| -> DepsResult<usize> {
            db.execute(
                "DELETE FROM cp_comp_depends_scratchpad WHERE ts_key = ?1",
                &sql_params![ts_key],
            )?;
            Ok(db.execute(
                "DELETE FROM cp_comp_depends WHERE ts_key = ?1",
                &sql_params![ts_key],
            )?)
        })
    }

    /// Insert edges not already live; returns how many were new
    pub fn add_edges(&self, edges: &BTreeSet<DependencyEdge>) -> DepsResult<usize> {
        in_transaction(self.db.as_ref(), |db| -> DepsResult<usize> {
            let mut added = 0;
            for edge in edges {
                added += db.execute(
                    "INSERT OR IGNORE INTO cp_comp_depends (ts_key, computation_id) VALUES (?1, ?2)",
                    &sql_params![edge.ts_key, edge.computation_id],
                )?;
            }
            Ok(added)
        })
    }

    /// Recompute every computation into the scratch area, then merge it
    /// into the live table in one transaction
    pub fn full_rebuild(&self, comps: &[Computation]) -> DepsResult<ReplaceOutcome> {
        let outcome = in_transaction(self.db.as_ref(), |db| -> DepsResult<ReplaceOutcome> {
            db.execute("DELETE FROM cp_comp_depends_scratchpad", &[])?;
            for comp in comps.iter().filter(|c| c.id.is_some()) {
                for edge in self.recompute(comp)? {
                    db.execute(
                        "INSERT INTO cp_comp_depends_scratchpad (ts_key, computation_id) VALUES (?1, ?2)",
                        &sql_params![edge.ts_key, edge.computation_id],
                    )?;
                }
            }
            let deleted = db.execute(DELETE_STALE_ALL, &[])?;
            let inserted = db.execute(INSERT_NEW_ALL, &[])?;
            db.execute("DELETE FROM cp_comp_depends_scratchpad", &[])?;
            Ok(ReplaceOutcome { inserted, deleted })
        })?;
        tracing::info!(
            computations = comps.len(),
            inserted = outcome.inserted,
            deleted = outcome.deleted,
            "full dependency rebuild complete"
        );
        Ok(outcome)
    }

    /// Series whose changes trigger `comp_id`
    pub fn triggers_for(&self, comp_id: DbKey) -> DepsResult<Vec<TimeSeriesIdentifier>> {
        let rows = self.db.query(
            "SELECT ts_key FROM cp_comp_depends WHERE computation_id = ?1 ORDER BY ts_key",
            &sql_params![comp_id],
        )?;
        let mut out = Vec::with_capacity(rows.len());
        for r in &rows {
            let key = DbKey(r.get_i64("ts_key")?);
            match self.metadata.by_key(key) {
                Ok(ts) => out.push(ts),
                Err(e) if e.is_not_found() => {
                    tracing::warn!(comp = %comp_id, ts_key = %key, "dependency on a missing series; skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Computations triggered by any of `ts_keys`, optionally only those
    /// loaded by one application
    pub fn computations_for(&self, ts_keys: &[DbKey], app_id: Option<DbKey>) -> DepsResult<Vec<DbKey>> {
        if ts_keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut params: Vec<SqlValue> = ts_keys.iter().map(|k| SqlValue::from(*k)).collect();
        let placeholders = (1..=ts_keys.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "SELECT DISTINCT d.computation_id FROM cp_comp_depends d \
             JOIN cp_computation c ON c.computation_id = d.computation_id \
             WHERE d.ts_key IN ({placeholders})"
        );
        if let Some(app) = app_id {
            params.push(app.into());
            sql.push_str(&format!(" AND c.loading_application_id = ?{}", params.len()));
        }
        sql.push_str(" ORDER BY d.computation_id");

        let mut out = Vec::new();
        for r in self.db.query(&sql, &params)? {
            out.push(DbKey(r.get_i64("computation_id")?));
        }
        Ok(out)
    }

    pub fn edges_for(&self, comp_id: DbKey) -> DepsResult<BTreeSet<DependencyEdge>> {
        let rows = self.db.query(
            "SELECT ts_key FROM cp_comp_depends WHERE computation_id = ?1",
            &sql_params![comp_id],
        )?;
        let mut out = BTreeSet::new();
        for r in &rows {
            out.insert(DependencyEdge::new(DbKey(r.get_i64("ts_key")?), comp_id));
        }
        Ok(out)
    }

    pub fn all_edges(&self) -> DepsResult<BTreeSet<DependencyEdge>> {
        let mut out = BTreeSet::new();
        for r in self.db.query("SELECT ts_key, computation_id FROM cp_comp_depends", &[])? {
            out.insert(DependencyEdge::new(
                DbKey(r.get_i64("ts_key")?),
                DbKey(r.get_i64("computation_id")?),
            ));
        }
        Ok(out)
    }
}
