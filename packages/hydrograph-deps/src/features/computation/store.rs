//! Computation persistence (`cp_computation`, parameters, properties)
//!
//! Every write keeps the dependency table in step: saving recomputes the
//! computation's edges and deleting removes them, inside the same
//! transaction as the definition rows and the `ComputationModified`
//! notification.

use super::model::{CompParm, Computation, ParmDirection, ParmTemplate};
use crate::errors::{DepsError, DepsResult, ObjectKind};
use crate::features::cache::{Cachable, ObjectCache};
use crate::features::dependency::DependencyTracker;
use crate::features::groups::GroupStore;
use crate::features::metadata::MetadataResolver;
use crate::features::notify::{NotificationQueue, NotifyEventType};
use crate::shared::clock::Clock;
use crate::shared::models::DbKey;
use hydrograph_storage::{in_transaction, sql_params, Row, SqlValue, StatementExecutor};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

impl Cachable for Computation {
    fn cache_key(&self) -> DbKey {
        self.id.unwrap_or_default()
    }

    fn unique_name(&self) -> Option<String> {
        Some(self.name.clone())
    }
}

/// Conjunctive listing filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompFilter {
    pub enabled_only: bool,
    pub group_id: Option<DbKey>,
    pub app_id: Option<DbKey>,
    pub algorithm_id: Option<DbKey>,
}

impl CompFilter {
    pub fn enabled() -> Self {
        Self {
            enabled_only: true,
            ..Self::default()
        }
    }

    pub fn with_group(mut self, group_id: DbKey) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_app(mut self, app_id: DbKey) -> Self {
        self.app_id = Some(app_id);
        self
    }

    pub fn matches(&self, comp: &Computation) -> bool {
        (!self.enabled_only || comp.enabled)
            && self.group_id.map_or(true, |g| comp.group_id == Some(g))
            && self.app_id.map_or(true, |a| comp.app_id == Some(a))
            && self.algorithm_id.map_or(true, |a| comp.algorithm_id == Some(a))
    }
}

pub struct ComputationStore {
    db: Arc<dyn StatementExecutor>,
    cache: ObjectCache<Computation>,
    groups: Arc<GroupStore>,
    metadata: Arc<dyn MetadataResolver>,
    tracker: Arc<DependencyTracker>,
    queue: Arc<NotificationQueue>,
    clock: Arc<dyn Clock>,
}

impl ComputationStore {
    pub fn new(
        db: Arc<dyn StatementExecutor>,
        cache: ObjectCache<Computation>,
        groups: Arc<GroupStore>,
        metadata: Arc<dyn MetadataResolver>,
        tracker: Arc<DependencyTracker>,
        queue: Arc<NotificationQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            cache,
            groups,
            metadata,
            tracker,
            queue,
            clock,
        }
    }

    pub fn cache(&self) -> &ObjectCache<Computation> {
        &self.cache
    }

    pub fn invalidate(&self, id: Option<DbKey>) {
        match id {
            Some(id) => {
                self.cache.remove(id);
            }
            None => self.cache.clear(),
        }
    }

    pub fn get_by_id(&self, id: DbKey) -> DepsResult<Option<Computation>> {
        if let Some(comp) = self.cache.get_by_key_checked(id, |c| self.is_current(c)) {
            return Ok(Some(comp));
        }
        self.get_by_id_fresh(id)
    }

    pub fn get_by_id_fresh(&self, id: DbKey) -> DepsResult<Option<Computation>> {
        let found = self.read_computations(Some(id))?.into_iter().next();
        match &found {
            Some(comp) => self.cache.put(comp.clone()),
            None => {
                self.cache.remove(id);
            }
        }
        Ok(found)
    }

    pub fn get_by_name(&self, name: &str) -> DepsResult<Option<Computation>> {
        if let Some(comp) = self.cache.get_by_name(name) {
            return Ok(Some(comp));
        }
        let row = self.db.query_one(
            "SELECT computation_id FROM cp_computation WHERE computation_name = ?1",
            &sql_params![name],
        )?;
        match row {
            Some(r) => self.get_by_id_fresh(DbKey(r.get_i64("computation_id")?)),
            None => Ok(None),
        }
    }

    pub fn list(&self, filter: &CompFilter) -> DepsResult<Vec<Computation>> {
        if self.cache.needs_refill() {
            self.fill_cache()?;
        }
        Ok(self.cache.search(|c| filter.matches(c)))
    }

    pub fn list_enabled(&self) -> DepsResult<Vec<Computation>> {
        self.list(&CompFilter::enabled())
    }

    pub fn fill_cache(&self) -> DepsResult<usize> {
        let comps = self.read_computations(None)?;
        let n = comps.len();
        self.cache.refill(comps);
        tracing::info!(computations = n, "computation cache filled");
        Ok(n)
    }

    /// Ids of computations directly referencing `group_id`, read from the store
    pub fn computations_using_group(&self, group_id: DbKey) -> DepsResult<Vec<DbKey>> {
        let rows = self.db.query(
            "SELECT computation_id FROM cp_computation WHERE group_id = ?1 ORDER BY computation_id",
            &sql_params![group_id],
        )?;
        let mut out = Vec::with_capacity(rows.len());
        for r in &rows {
            out.push(DbKey(r.get_i64("computation_id")?));
        }
        Ok(out)
    }

    fn is_current(&self, comp: &Computation) -> DepsResult<bool> {
        let Some(id) = comp.id else {
            return Ok(false);
        };
        let row = self.db.query_one(
            "SELECT modified_at FROM cp_computation WHERE computation_id = ?1",
            &sql_params![id],
        )?;
        Ok(match row {
            Some(r) => r.get_i64("modified_at")? == comp.modified_at,
            None => false,
        })
    }

    fn read_computations(&self, only: Option<DbKey>) -> DepsResult<Vec<Computation>> {
        let (filter, params): (&str, Vec<SqlValue>) = match only {
            Some(id) => (" WHERE computation_id = ?1", vec![id.into()]),
            None => ("", Vec::new()),
        };

        let mut comps: BTreeMap<DbKey, Computation> = BTreeMap::new();
        for r in self.db.query(
            &format!(
                "SELECT computation_id, computation_name, enabled, algorithm_id, group_id, \
                 loading_application_id, comment, modified_at FROM cp_computation{filter}"
            ),
            &params,
        )? {
            let id = DbKey(r.get_i64("computation_id")?);
            let mut c = Computation::new(r.get_string("computation_name")?);
            c.id = Some(id);
            c.enabled = r.get_bool("enabled")?;
            c.algorithm_id = r.get_opt_i64("algorithm_id")?.map(DbKey);
            c.group_id = r.get_opt_i64("group_id")?.map(DbKey);
            c.app_id = r.get_opt_i64("loading_application_id")?.map(DbKey);
            c.comment = r.get_string_or_empty("comment")?;
            c.modified_at = r.get_i64("modified_at")?;
            comps.insert(id, c);
        }
        if comps.is_empty() {
            return Ok(Vec::new());
        }

        for r in self.db.query(
            &format!(
                "SELECT computation_id, role_name, parm_type, ts_key, location, param, param_type, \
                 interval, duration, version FROM cp_comp_ts_parm{filter} ORDER BY computation_id, seq"
            ),
            &params,
        )? {
            if let Some(c) = comps.get_mut(&DbKey(r.get_i64("computation_id")?)) {
                c.parms.push(parm_from_row(&r)?);
            }
        }
        for r in self.db.query(
            &format!("SELECT computation_id, prop_name, prop_value FROM cp_comp_property{filter}"),
            &params,
        )? {
            if let Some(c) = comps.get_mut(&DbKey(r.get_i64("computation_id")?)) {
                c.properties
                    .insert(r.get_string("prop_name")?, r.get_string_or_empty("prop_value")?);
            }
        }

        Ok(comps.into_values().collect())
    }

    /// Validate, write definition rows, refresh dependencies and notify, all
    /// in one transaction. Assigns `id` and `modified_at`.
    pub fn save(&self, comp: &mut Computation) -> DepsResult<DbKey> {
        self.validate(comp)?;

        let mut saved = comp.clone();
        saved.name = comp.name.trim().to_string();
        saved.modified_at = self.clock.now_millis().max(comp.modified_at + 1);

        let id = in_transaction(self.db.as_ref(), |db| -> DepsResult<DbKey> {
            ensure_name_free(db, &saved.name, saved.id)?;
            let id = write_row(db, &saved)?;
            saved.id = Some(id);
            write_children(db, id, &saved)?;
            let outcome = self.tracker.recompute_and_replace(&saved)?;
            tracing::debug!(comp = %saved, inserted = outcome.inserted, deleted = outcome.deleted, "edges refreshed on save");
            self.queue.enqueue(NotifyEventType::ComputationModified, id)?;
            Ok(id)
        })?;

        saved.id = Some(id);
        self.cache.put(saved.clone());
        *comp = saved;
        tracing::info!(comp = %comp, enabled = comp.enabled, "computation saved");
        Ok(id)
    }

    fn validate(&self, comp: &Computation) -> DepsResult<()> {
        let name = comp.name.trim();
        if name.is_empty() {
            return Err(DepsError::validation("computation name must not be empty"));
        }
        if let Some(group_id) = comp.group_id {
            if self.groups.get_by_id(group_id)?.is_none() {
                return Err(DepsError::validation(format!(
                    "computation '{}' references unknown group {}",
                    name, group_id
                )));
            }
        }

        let mut roles = BTreeSet::new();
        for parm in &comp.parms {
            if !roles.insert(parm.role_name.to_lowercase()) {
                return Err(DepsError::validation(format!(
                    "computation '{}' has duplicate role '{}'",
                    name, parm.role_name
                )));
            }
            let Some(ts_key) = parm.ts_key.filter(|_| parm.is_input()) else {
                continue;
            };
            match self.metadata.by_key(ts_key) {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    return Err(DepsError::validation(format!(
                        "input '{}' of computation '{}' is bound to unknown series {}",
                        parm.role_name, name, ts_key
                    )))
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Remove edges, then parameter, property and definition rows, then
    /// enqueue `ComputationModified`
    pub fn delete(&self, id: DbKey) -> DepsResult<()> {
        in_transaction(self.db.as_ref(), |db| -> DepsResult<()> {
            let edges = self.tracker.remove_for_computation(id)?;
            db.execute("DELETE FROM cp_comp_ts_parm WHERE computation_id = ?1", &sql_params![id])?;
            db.execute("DELETE FROM cp_comp_property WHERE computation_id = ?1", &sql_params![id])?;
            let n = db.execute("DELETE FROM cp_computation WHERE computation_id = ?1", &sql_params![id])?;
            if n == 0 {
                return Err(DepsError::not_found(ObjectKind::Computation, id));
            }
            self.queue.enqueue(NotifyEventType::ComputationModified, id)?;
            tracing::info!(comp = %id, edges_removed = edges, "computation deleted");
            Ok(())
        })?;
        self.cache.remove(id);
        Ok(())
    }

    /// Clear the enabled flag and drop the computation's edges. Returns false
    /// when no such computation exists.
    pub fn disable(&self, id: DbKey) -> DepsResult<bool> {
        let now = self.clock.now_millis();
        let existed = in_transaction(self.db.as_ref(), |db| -> DepsResult<bool> {
            let n = db.execute(
                "UPDATE cp_computation SET enabled = 0, modified_at = MAX(modified_at + 1, ?1) \
                 WHERE computation_id = ?2",
                &sql_params![now, id],
            )?;
            if n == 0 {
                return Ok(false);
            }
            self.tracker.remove_for_computation(id)?;
            self.queue.enqueue(NotifyEventType::ComputationModified, id)?;
            Ok(true)
        })?;
        self.cache.remove(id);
        if existed {
            tracing::info!(comp = %id, "computation disabled");
        }
        Ok(existed)
    }

    /// Disable every computation referencing `group_id` and clear the
    /// reference, removing their edges and enqueueing one notification each.
    /// Returns the affected computations.
    pub fn disable_for_group(&self, group_id: DbKey) -> DepsResult<Vec<DbKey>> {
        let now = self.clock.now_millis();
        let affected = in_transaction(self.db.as_ref(), |db| -> DepsResult<Vec<DbKey>> {
            let affected = self.computations_using_group(group_id)?;
            for comp_id in &affected {
                db.execute(
                    "UPDATE cp_computation SET enabled = 0, group_id = NULL, \
                     modified_at = MAX(modified_at + 1, ?1) WHERE computation_id = ?2",
                    &sql_params![now, *comp_id],
                )?;
                self.tracker.remove_for_computation(*comp_id)?;
                self.queue.enqueue(NotifyEventType::ComputationModified, *comp_id)?;
            }
            Ok(affected)
        })?;
        for comp_id in &affected {
            self.cache.remove(*comp_id);
            tracing::warn!(comp = %comp_id, group = %group_id, "group removed; computation disabled");
        }
        Ok(affected)
    }

    /// Disable computations with an input explicitly bound to `ts_key`
    pub fn disable_bound_to(&self, ts_key: DbKey) -> DepsResult<Vec<DbKey>> {
        let rows = self.db.query(
            "SELECT DISTINCT p.computation_id FROM cp_comp_ts_parm p \
             JOIN cp_computation c ON c.computation_id = p.computation_id \
             WHERE p.ts_key = ?1 AND p.parm_type = 'i' AND c.enabled <> 0 \
             ORDER BY p.computation_id",
            &sql_params![ts_key],
        )?;
        let mut disabled = Vec::with_capacity(rows.len());
        for r in &rows {
            let id = DbKey(r.get_i64("computation_id")?);
            if self.disable(id)? {
                disabled.push(id);
            }
        }
        Ok(disabled)
    }
}

fn parm_from_row(r: &Row) -> DepsResult<CompParm> {
    Ok(CompParm {
        role_name: r.get_string("role_name")?,
        direction: ParmDirection::from_code(&r.get_string_or_empty("parm_type")?),
        ts_key: r.get_opt_i64("ts_key")?.map(DbKey),
        template: ParmTemplate {
            location: r.get_opt_string("location")?,
            param: r.get_opt_string("param")?,
            param_type: r.get_opt_string("param_type")?,
            interval: r.get_opt_string("interval")?,
            duration: r.get_opt_string("duration")?,
            version: r.get_opt_string("version")?,
        },
    })
}

/// Runs inside the save transaction so a concurrent writer cannot slip in
fn ensure_name_free(db: &dyn StatementExecutor, name: &str, id: Option<DbKey>) -> DepsResult<()> {
    let clash = db.query_one(
        "SELECT computation_id FROM cp_computation WHERE computation_name = ?1 AND computation_id <> ?2",
        &sql_params![name, id.map(|k| k.0).unwrap_or(-1)],
    )?;
    if clash.is_some() {
        return Err(DepsError::validation(format!(
            "a computation named '{}' already exists",
            name
        )));
    }
    Ok(())
}

fn write_row(db: &dyn StatementExecutor, comp: &Computation) -> DepsResult<DbKey> {
    match comp.id {
        None => {
            let row = db
                .query_one(
                    "INSERT INTO cp_computation (computation_name, enabled, algorithm_id, group_id, \
                     loading_application_id, comment, modified_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) RETURNING computation_id",
                    &sql_params![
                        comp.name.as_str(),
                        comp.enabled,
                        comp.algorithm_id,
                        comp.group_id,
                        comp.app_id,
                        comp.comment.as_str(),
                        comp.modified_at
                    ],
                )?
                .ok_or_else(|| DepsError::validation("computation insert returned no id"))?;
            Ok(DbKey(row.get_i64("computation_id")?))
        }
        Some(id) => {
            let n = db.execute(
                "UPDATE cp_computation SET computation_name = ?1, enabled = ?2, algorithm_id = ?3, \
                 group_id = ?4, loading_application_id = ?5, comment = ?6, modified_at = ?7 \
                 WHERE computation_id = ?8",
                &sql_params![
                    comp.name.as_str(),
                    comp.enabled,
                    comp.algorithm_id,
                    comp.group_id,
                    comp.app_id,
                    comp.comment.as_str(),
                    comp.modified_at,
                    id
                ],
            )?;
            if n == 0 {
                return Err(DepsError::not_found(ObjectKind::Computation, id));
            }
            Ok(id)
        }
    }
}

fn write_children(db: &dyn StatementExecutor, id: DbKey, comp: &Computation) -> DepsResult<()> {
    db.execute("DELETE FROM cp_comp_ts_parm WHERE computation_id = ?1", &sql_params![id])?;
    db.execute("DELETE FROM cp_comp_property WHERE computation_id = ?1", &sql_params![id])?;

    for (seq, p) in comp.parms.iter().enumerate() {
        let t = &p.template;
        db.execute(
            "INSERT INTO cp_comp_ts_parm (computation_id, seq, role_name, parm_type, ts_key, \
             location, param, param_type, interval, duration, version) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            &sql_params![
                id,
                seq,
                p.role_name.as_str(),
                p.direction.code(),
                p.ts_key,
                t.location.as_deref(),
                t.param.as_deref(),
                t.param_type.as_deref(),
                t.interval.as_deref(),
                t.duration.as_deref(),
                t.version.as_deref()
            ],
        )?;
    }
    for (name, value) in &comp.properties {
        db.execute(
            "INSERT INTO cp_comp_property (computation_id, prop_name, prop_value) VALUES (?1, ?2, ?3)",
            &sql_params![id, name.as_str(), value.as_str()],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeliveryMode, NotifyConfig};
    use crate::features::groups::TsGroup;
    use crate::features::metadata::InMemoryTsCatalog;
    use crate::shared::clock::ManualClock;
    use crate::shared::models::{TimeSeriesIdentifier, TsIdParts};
    use hydrograph_storage::SqliteDatabase;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct Fixture {
        comps: ComputationStore,
        groups: Arc<GroupStore>,
        tracker: Arc<DependencyTracker>,
        queue: Arc<NotificationQueue>,
    }

    fn fixture() -> Fixture {
        let db = SqliteDatabase::in_memory().unwrap().into_shared();
        let clock = Arc::new(ManualClock::new(5_000));
        let queue = Arc::new(NotificationQueue::new(
            Arc::clone(&db),
            clock.clone(),
            NotifyConfig {
                delivery: DeliveryMode::AtMostOnce,
                ..NotifyConfig::default()
            },
        ));
        let ttl = Duration::from_secs(600);
        let groups = Arc::new(GroupStore::new(
            Arc::clone(&db),
            ObjectCache::new("groups", ttl, Duration::from_secs(60)),
            Arc::clone(&queue),
            clock.clone(),
        ));
        let metadata: Arc<dyn MetadataResolver> = Arc::new(InMemoryTsCatalog::with_series(
            [(1, "A.Stage.Inst.1Hour.0.Raw", 1), (2, "B.Stage.Inst.1Hour.0.Raw", 2)].map(
                |(k, n, s)| {
                    TimeSeriesIdentifier::new(DbKey(k), TsIdParts::parse(n).unwrap()).with_site(DbKey(s))
                },
            ),
        ));
        let tracker = Arc::new(DependencyTracker::new(
            Arc::clone(&db),
            Arc::clone(&groups),
            Arc::clone(&metadata),
        ));
        let comps = ComputationStore::new(
            db,
            ObjectCache::new("computations", ttl, Duration::from_secs(60)),
            Arc::clone(&groups),
            metadata,
            Arc::clone(&tracker),
            Arc::clone(&queue),
            clock,
        );
        Fixture {
            comps,
            groups,
            tracker,
            queue,
        }
    }

    fn drained(queue: &NotificationQueue) -> Vec<(NotifyEventType, DbKey)> {
        std::iter::from_fn(|| queue.dequeue_oldest().unwrap())
            .map(|r| (r.event_type, r.key))
            .collect()
    }

    #[test]
    fn test_save_writes_rows_edges_and_notification() {
        let f = fixture();
        let mut c = Computation::new("Copy A")
            .with_parm(CompParm::bound_input("input", DbKey(1)))
            .with_parm(CompParm::output(
                "output",
                ParmTemplate {
                    version: Some("Rev".into()),
                    ..ParmTemplate::default()
                },
            ))
            .with_property("note", "x");
        let id = f.comps.save(&mut c).unwrap();

        assert_eq!(c.id, Some(id));
        assert_eq!(f.tracker.edges_for(id).unwrap().len(), 1);
        assert_eq!(drained(&f.queue), vec![(NotifyEventType::ComputationModified, id)]);

        f.comps.invalidate(None);
        let loaded = f.comps.get_by_id(id).unwrap().unwrap();
        assert_eq!(loaded, c);
        assert!(f.comps.get_by_name("copy a").unwrap().is_some());
    }

    #[test]
    fn test_validation_failures_write_nothing() {
        let f = fixture();
        let unknown_series = Computation::new("x").with_parm(CompParm::bound_input("in", DbKey(99)));
        assert!(matches!(
            f.comps.save(&mut unknown_series.clone()).unwrap_err(),
            DepsError::Validation(_)
        ));
        let unknown_group = Computation::new("y").with_group(DbKey(42));
        assert!(f.comps.save(&mut unknown_group.clone()).is_err());
        assert!(f.comps.save(&mut Computation::new(" ")).is_err());

        f.comps.save(&mut Computation::new("dup")).unwrap();
        assert!(f.comps.save(&mut Computation::new("DUP")).is_err());
        assert_eq!(f.comps.list(&CompFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_name_is_rejected_inside_the_save() {
        let f = fixture();
        let mut first = Computation::new("Copy A").with_parm(CompParm::bound_input("in", DbKey(1)));
        let id = f.comps.save(&mut first).unwrap();
        drained(&f.queue);

        let mut dup = Computation::new("copy a").with_parm(CompParm::bound_input("in", DbKey(2)));
        assert!(matches!(f.comps.save(&mut dup).unwrap_err(), DepsError::Validation(_)));
        assert_eq!(dup.id, None);
        assert!(drained(&f.queue).is_empty());
        assert_eq!(f.tracker.all_edges().unwrap().len(), 1);

        first.name = "COPY A".into();
        assert_eq!(f.comps.save(&mut first).unwrap(), id);
        assert_eq!(drained(&f.queue), vec![(NotifyEventType::ComputationModified, id)]);
    }

    #[test]
    fn test_disable_removes_edges() {
        let f = fixture();
        let mut c = Computation::new("c").with_parm(CompParm::bound_input("in", DbKey(2)));
        let id = f.comps.save(&mut c).unwrap();
        assert!(f.comps.disable(id).unwrap());
        assert!(f.tracker.edges_for(id).unwrap().is_empty());
        assert!(!f.comps.get_by_id(id).unwrap().unwrap().enabled);
        assert!(!f.comps.disable(DbKey(999)).unwrap());
    }

    #[test]
    fn test_delete_and_group_detach() {
        let f = fixture();
        let gid = f.groups.save(&mut TsGroup::new("g").add_site(DbKey(1))).unwrap();
        let mut a = Computation::new("a")
            .with_group(gid)
            .with_parm(CompParm::template_input("in", ParmTemplate::default()));
        let mut b = Computation::new("b").with_parm(CompParm::bound_input("in", DbKey(2)));
        let a_id = f.comps.save(&mut a).unwrap();
        let b_id = f.comps.save(&mut b).unwrap();
        assert_eq!(f.comps.computations_using_group(gid).unwrap(), vec![a_id]);
        drained(&f.queue);

        assert_eq!(f.comps.disable_for_group(gid).unwrap(), vec![a_id]);
        let a = f.comps.get_by_id(a_id).unwrap().unwrap();
        assert!(!a.enabled);
        assert_eq!(a.group_id, None);
        assert!(f.tracker.edges_for(a_id).unwrap().is_empty());

        f.comps.delete(b_id).unwrap();
        assert!(f.comps.get_by_id(b_id).unwrap().is_none());
        assert!(f.tracker.all_edges().unwrap().is_empty());
        assert_eq!(
            drained(&f.queue),
            vec![
                (NotifyEventType::ComputationModified, a_id),
                (NotifyEventType::ComputationModified, b_id)
            ]
        );
        assert!(f.comps.delete(b_id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_filters() {
        let f = fixture();
        f.comps.save(&mut Computation::new("on").with_app(DbKey(3))).unwrap();
        f.comps.save(&mut Computation::new("off").with_enabled(false)).unwrap();
        let names = |v: Vec<Computation>| v.into_iter().map(|c| c.name).collect::<Vec<_>>();
        assert_eq!(names(f.comps.list_enabled().unwrap()), vec!["on".to_string()]);
        assert_eq!(
            names(f.comps.list(&CompFilter::default().with_app(DbKey(3))).unwrap()),
            vec!["on".to_string()]
        );
        assert_eq!(f.comps.list(&CompFilter::default()).unwrap().len(), 2);
    }

    #[test]
    fn test_disable_bound_to_series() {
        let f = fixture();
        let id = f
            .comps
            .save(&mut Computation::new("c").with_parm(CompParm::bound_input("in", DbKey(1))))
            .unwrap();
        assert_eq!(f.comps.disable_bound_to(DbKey(1)).unwrap(), vec![id]);
        assert!(f.comps.disable_bound_to(DbKey(1)).unwrap().is_empty());
    }
}
