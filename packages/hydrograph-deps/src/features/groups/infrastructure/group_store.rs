//! Group persistence (`tsdb_group` + member tables) behind a session cache

use super::parent_graph::GroupParentGraph;
use crate::errors::{DepsError, DepsResult, ObjectKind};
use crate::features::cache::{Cachable, ObjectCache};
use crate::features::groups::application::GroupSource;
use crate::features::groups::domain::{CombineMode, GroupCriterion, SubGroupRef, TsGroup};
use crate::features::notify::{NotificationQueue, NotifyEventType};
use crate::shared::clock::Clock;
use crate::shared::models::DbKey;
use hydrograph_storage::{in_transaction, sql_params, Row, SqlValue, StatementExecutor};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

impl Cachable for TsGroup {
    fn cache_key(&self) -> DbKey {
        self.id.unwrap_or_default()
    }

    fn unique_name(&self) -> Option<String> {
        Some(self.name.clone())
    }
}

pub struct GroupStore {
    db: Arc<dyn StatementExecutor>,
    cache: ObjectCache<TsGroup>,
    queue: Arc<NotificationQueue>,
    clock: Arc<dyn Clock>,
}

impl GroupStore {
    pub fn new(
        db: Arc<dyn StatementExecutor>,
        cache: ObjectCache<TsGroup>,
        queue: Arc<NotificationQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            cache,
            queue,
            clock,
        }
    }

    pub fn cache(&self) -> &ObjectCache<TsGroup> {
        &self.cache
    }

    /// Drop one cached group, or all of them
    pub fn invalidate(&self, id: Option<DbKey>) {
        match id {
            Some(id) => {
                self.cache.remove(id);
            }
            None => self.cache.clear(),
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Reads
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Cached lookup; entries past the staleness watermark are re-checked
    /// against the stored modify time
    pub fn get_by_id(&self, id: DbKey) -> DepsResult<Option<TsGroup>> {
        if let Some(group) = self.cache.get_by_key_checked(id, |g| self.is_current(g)) {
            return Ok(Some(group));
        }
        self.get_by_id_fresh(id)
    }

    /// Always read from the store, refreshing the cache entry
    pub fn get_by_id_fresh(&self, id: DbKey) -> DepsResult<Option<TsGroup>> {
        let found = self.read_groups(Some(id))?.into_iter().next();
        match &found {
            Some(group) => self.cache.put(group.clone()),
            None => {
                self.cache.remove(id);
            }
        }
        Ok(found)
    }

    /// Case-insensitive name lookup
    pub fn get_by_name(&self, name: &str) -> DepsResult<Option<TsGroup>> {
        if let Some(group) = self.cache.get_by_name(name) {
            return Ok(Some(group));
        }
        let row = self.db.query_one(
            "SELECT group_id FROM tsdb_group WHERE group_name = ?1",
            &sql_params![name],
        )?;
        match row {
            Some(r) => self.get_by_id_fresh(DbKey(r.get_i64("group_id")?)),
            None => Ok(None),
        }
    }

    /// All groups, optionally only those of one type (case-insensitive).
    /// Refills the cache first when its refill threshold has passed.
    pub fn list(&self, group_type: Option<&str>) -> DepsResult<Vec<TsGroup>> {
        if self.cache.needs_refill() {
            self.fill_cache()?;
        }
        Ok(match group_type {
            Some(t) => self.cache.search(|g| g.group_type.eq_ignore_ascii_case(t)),
            None => self.cache.iter().iter().cloned().collect(),
        })
    }

    /// Clear and bulk-load every group
    pub fn fill_cache(&self) -> DepsResult<usize> {
        let groups = self.read_groups(None)?;
        let n = groups.len();
        self.cache.refill(groups);
        tracing::info!(groups = n, "group cache filled");
        Ok(n)
    }

    pub fn count_computations_using(&self, id: DbKey) -> DepsResult<usize> {
        let row = self.db.query_one(
            "SELECT COUNT(*) AS n FROM cp_computation WHERE group_id = ?1",
            &sql_params![id],
        )?;
        Ok(match row {
            Some(r) => r.get_i64("n")?.max(0) as usize,
            None => 0,
        })
    }

    /// Containment graph of every stored group
    pub fn parent_graph(&self) -> DepsResult<GroupParentGraph> {
        let rows = self.db.query(
            "SELECT parent_group_id, child_group_id, include_group FROM tsdb_group_member_group",
            &[],
        )?;
        let mut edges = Vec::with_capacity(rows.len());
        for r in &rows {
            edges.push((
                DbKey(r.get_i64("parent_group_id")?),
                DbKey(r.get_i64("child_group_id")?),
                CombineMode::from_code(&r.get_string_or_empty("include_group")?),
            ));
        }
        Ok(GroupParentGraph::from_edges(edges))
    }

    /// `id` and every group that transitively contains it
    pub fn ancestors_of(&self, id: DbKey) -> DepsResult<BTreeSet<DbKey>> {
        Ok(self.parent_graph()?.ancestors_of(id))
    }

    fn is_current(&self, group: &TsGroup) -> DepsResult<bool> {
        let Some(id) = group.id else {
            return Ok(false);
        };
        let row = self.db.query_one(
            "SELECT modified_at FROM tsdb_group WHERE group_id = ?1",
            &sql_params![id],
        )?;
        Ok(match row {
            Some(r) => r.get_i64("modified_at")? == group.modified_at,
            None => false,
        })
    }

    fn read_groups(&self, only: Option<DbKey>) -> DepsResult<Vec<TsGroup>> {
        let (filter, parent_filter, params): (&str, &str, Vec<SqlValue>) = match only {
            Some(id) => (
                " WHERE group_id = ?1",
                " WHERE parent_group_id = ?1",
                vec![id.into()],
            ),
            None => ("", "", Vec::new()),
        };

        let mut groups: BTreeMap<DbKey, TsGroup> = BTreeMap::new();
        for r in self.db.query(
            &format!(
                "SELECT group_id, group_name, group_type, description, modified_at \
                 FROM tsdb_group{filter} ORDER BY group_id"
            ),
            &params,
        )? {
            let id = DbKey(r.get_i64("group_id")?);
            let mut g = TsGroup::new(r.get_string("group_name")?)
                .with_id(id)
                .with_type(r.get_string_or_empty("group_type")?)
                .with_description(r.get_string_or_empty("description")?);
            g.modified_at = r.get_i64("modified_at")?;
            groups.insert(id, g);
        }
        if groups.is_empty() {
            return Ok(Vec::new());
        }

        let member_rows = |sql: String| -> DepsResult<Vec<Row>> { Ok(self.db.query(&sql, &params)?) };

        for r in member_rows(format!(
            "SELECT group_id, ts_key FROM tsdb_group_member_ts{filter} ORDER BY group_id, ts_key"
        ))? {
            if let Some(g) = groups.get_mut(&DbKey(r.get_i64("group_id")?)) {
                g.ts_members.push(DbKey(r.get_i64("ts_key")?));
            }
        }
        for r in member_rows(format!(
            "SELECT group_id, site_id FROM tsdb_group_member_site{filter} ORDER BY group_id, site_id"
        ))? {
            if let Some(g) = groups.get_mut(&DbKey(r.get_i64("group_id")?)) {
                g.site_ids.push(DbKey(r.get_i64("site_id")?));
            }
        }
        for r in member_rows(format!(
            "SELECT group_id, datatype_id FROM tsdb_group_member_dt{filter} \
             ORDER BY group_id, datatype_id"
        ))? {
            if let Some(g) = groups.get_mut(&DbKey(r.get_i64("group_id")?)) {
                g.datatype_ids.push(DbKey(r.get_i64("datatype_id")?));
            }
        }
        for r in member_rows(format!(
            "SELECT group_id, member_type, member_value FROM tsdb_group_member_other{filter} \
             ORDER BY group_id, seq"
        ))? {
            if let Some(g) = groups.get_mut(&DbKey(r.get_i64("group_id")?)) {
                g.criteria.push(GroupCriterion::new(
                    r.get_string("member_type")?,
                    r.get_string_or_empty("member_value")?,
                ));
            }
        }
        for r in member_rows(format!(
            "SELECT parent_group_id, child_group_id, include_group \
             FROM tsdb_group_member_group{parent_filter} ORDER BY parent_group_id, seq"
        ))? {
            if let Some(g) = groups.get_mut(&DbKey(r.get_i64("parent_group_id")?)) {
                g.children.push(SubGroupRef {
                    group_id: DbKey(r.get_i64("child_group_id")?),
                    mode: CombineMode::from_code(&r.get_string_or_empty("include_group")?),
                });
            }
        }

        Ok(groups.into_values().collect())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Writes
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    /// Insert or update a group and all its member rows, then enqueue
    /// `GroupModified`, in one transaction. Assigns `id` and `modified_at`.
    pub fn save(&self, group: &mut TsGroup) -> DepsResult<DbKey> {
        let name = group.name.trim().to_string();
        if name.is_empty() {
            return Err(DepsError::validation("group name must not be empty"));
        }
        let modified_at = self.clock.now_millis().max(group.modified_at + 1);
        let id = in_transaction(self.db.as_ref(), |db| -> DepsResult<DbKey> {
            ensure_name_free(db, &name, group.id)?;
            let id = match group.id {
                None => {
                    let row = db
                        .query_one(
                            "INSERT INTO tsdb_group (group_name, group_type, description, modified_at) \
                             VALUES (?1, ?2, ?3, ?4) RETURNING group_id",
                            &sql_params![
                                name.as_str(),
                                &group.group_type,
                                &group.description,
                                modified_at
                            ],
                        )?
                        .ok_or_else(|| DepsError::validation("group insert returned no id"))?;
                    DbKey(row.get_i64("group_id")?)
                }
                Some(id) => {
                    let n = db.execute(
                        "UPDATE tsdb_group SET group_name = ?1, group_type = ?2, description = ?3, \
                         modified_at = ?4 WHERE group_id = ?5",
                        &sql_params![
                            name.as_str(),
                            &group.group_type,
                            &group.description,
                            modified_at,
                            id
                        ],
                    )?;
                    if n == 0 {
                        return Err(DepsError::not_found(ObjectKind::Group, id));
                    }
                    id
                }
            };
            write_members(db, id, group)?;
            self.queue.enqueue(NotifyEventType::GroupModified, id)?;
            Ok(id)
        })?;

        group.id = Some(id);
        group.name = name;
        group.modified_at = modified_at;
        self.cache.put(group.clone());

        for child in &group.children {
            if child.group_id == id {
                tracing::warn!(group = %id, "group includes itself; the reference is ignored at resolve time");
            }
        }
        tracing::info!(group = %id, name = %group.name, "group saved");
        Ok(id)
    }

    /// Delete a group's rows and every reference to it from other groups.
    /// Enqueues `GroupModified` for each former parent and returns them.
    /// Computations using the group are the caller's concern.
    pub fn delete(&self, id: DbKey) -> DepsResult<BTreeSet<DbKey>> {
        let now = self.clock.now_millis();
        let parents = in_transaction(self.db.as_ref(), |db| -> DepsResult<BTreeSet<DbKey>> {
            let mut parents = BTreeSet::new();
            for r in db.query(
                "SELECT parent_group_id FROM tsdb_group_member_group WHERE child_group_id = ?1",
                &sql_params![id],
            )? {
                let parent = DbKey(r.get_i64("parent_group_id")?);
                if parent != id {
                    parents.insert(parent);
                }
            }

            db.execute(
                "DELETE FROM tsdb_group_member_group WHERE child_group_id = ?1",
                &sql_params![id],
            )?;
            delete_member_rows(db, id)?;
            let n = db.execute("DELETE FROM tsdb_group WHERE group_id = ?1", &sql_params![id])?;
            if n == 0 {
                return Err(DepsError::not_found(ObjectKind::Group, id));
            }

            for parent in &parents {
                db.execute(
                    "UPDATE tsdb_group SET modified_at = MAX(modified_at + 1, ?1) WHERE group_id = ?2",
                    &sql_params![now, *parent],
                )?;
                self.queue.enqueue(NotifyEventType::GroupModified, *parent)?;
            }
            Ok(parents)
        })?;

        self.cache.remove(id);
        for parent in &parents {
            self.cache.remove(*parent);
        }
        tracing::info!(group = %id, parents = parents.len(), "group deleted");
        Ok(parents)
    }

    /// Remove a series from every group's explicit member list. Returns the
    /// groups that changed.
    pub fn remove_ts_member(&self, ts_key: DbKey) -> DepsResult<BTreeSet<DbKey>> {
        let now = self.clock.now_millis();
        let changed = in_transaction(self.db.as_ref(), |db| -> DepsResult<BTreeSet<DbKey>> {
            let mut changed = BTreeSet::new();
            for r in db.query(
                "SELECT group_id FROM tsdb_group_member_ts WHERE ts_key = ?1",
                &sql_params![ts_key],
            )? {
                changed.insert(DbKey(r.get_i64("group_id")?));
            }
            db.execute(
                "DELETE FROM tsdb_group_member_ts WHERE ts_key = ?1",
                &sql_params![ts_key],
            )?;
            for g in &changed {
                db.execute(
                    "UPDATE tsdb_group SET modified_at = MAX(modified_at + 1, ?1) WHERE group_id = ?2",
                    &sql_params![now, *g],
                )?;
            }
            Ok(changed)
        })?;
        for g in &changed {
            self.cache.remove(*g);
        }
        Ok(changed)
    }
}

fn delete_member_rows(db: &dyn StatementExecutor, id: DbKey) -> DepsResult<()> {
    for table in [
        "tsdb_group_member_ts",
        "tsdb_group_member_site",
        "tsdb_group_member_dt",
        "tsdb_group_member_other",
    ] {
        db.execute(
            &format!("DELETE FROM {table} WHERE group_id = ?1"),
            &sql_params![id],
        )?;
    }
    db.execute(
        "DELETE FROM tsdb_group_member_group WHERE parent_group_id = ?1",
        &sql_params![id],
    )?;
    Ok(())
}

/// Checked under the write lock so two writers cannot both claim a name
fn ensure_name_free(db: &dyn StatementExecutor, name: &str, id: Option<DbKey>) -> DepsResult<()> {
    let clash = db.query_one(
        "SELECT group_id FROM tsdb_group WHERE group_name = ?1 AND group_id <> ?2",
        &sql_params![name, id.map(|k| k.0).unwrap_or(-1)],
    )?;
    match clash {
        Some(r) => Err(DepsError::validation(format!(
            "a group named '{}' already exists (id {})",
            name,
            r.get_i64("group_id")?
        ))),
        None => Ok(()),
    }
}

fn write_members(db: &dyn StatementExecutor, id: DbKey, group: &TsGroup) -> DepsResult<()> {
    delete_member_rows(db, id)?;

    let unique = |keys: &[DbKey]| -> BTreeSet<DbKey> { keys.iter().copied().collect() };
    for ts_key in unique(&group.ts_members) {
        db.execute(
            "INSERT INTO tsdb_group_member_ts (group_id, ts_key) VALUES (?1, ?2)",
            &sql_params![id, ts_key],
        )?;
    }
    for site in unique(&group.site_ids) {
        db.execute(
            "INSERT INTO tsdb_group_member_site (group_id, site_id) VALUES (?1, ?2)",
            &sql_params![id, site],
        )?;
    }
    for dt in unique(&group.datatype_ids) {
        db.execute(
            "INSERT INTO tsdb_group_member_dt (group_id, datatype_id) VALUES (?1, ?2)",
            &sql_params![id, dt],
        )?;
    }
    for (seq, c) in group.criteria.iter().enumerate() {
        db.execute(
            "INSERT INTO tsdb_group_member_other (group_id, seq, member_type, member_value) \
             VALUES (?1, ?2, ?3, ?4)",
            &sql_params![id, seq, &c.attribute, &c.pattern],
        )?;
    }
    let mut seen = HashSet::new();
    for (seq, child) in group.children.iter().enumerate() {
        if !seen.insert(child.group_id) {
            continue;
        }
        db.execute(
            "INSERT INTO tsdb_group_member_group (parent_group_id, child_group_id, include_group, seq) \
             VALUES (?1, ?2, ?3, ?4)",
            &sql_params![id, child.group_id, child.mode.code(), seq],
        )?;
    }
    Ok(())
}

impl GroupSource for GroupStore {
    fn find_group(&self, id: DbKey) -> DepsResult<Option<TsGroup>> {
        self.get_by_id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotifyConfig;
    use crate::shared::clock::ManualClock;
    use hydrograph_storage::SqliteDatabase;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct Fixture {
        store: GroupStore,
        queue: Arc<NotificationQueue>,
        clock: Arc<ManualClock>,
    }

    fn fixture(watermark: Duration) -> Fixture {
        let db = SqliteDatabase::in_memory().unwrap().into_shared();
        let clock = Arc::new(ManualClock::new(10_000));
        let config = NotifyConfig {
            delivery: crate::config::DeliveryMode::AtMostOnce,
            ..NotifyConfig::default()
        };
        let queue = Arc::new(NotificationQueue::new(Arc::clone(&db), clock.clone(), config));
        let cache = ObjectCache::new("groups", Duration::from_secs(600), watermark);
        let store = GroupStore::new(db, cache, Arc::clone(&queue), clock.clone());
        Fixture { store, queue, clock }
    }

    fn drain(queue: &NotificationQueue) -> Vec<(NotifyEventType, i64)> {
        std::iter::from_fn(|| queue.dequeue_oldest().unwrap())
            .map(|r| (r.event_type, r.key.0))
            .collect()
    }

    #[test]
    fn test_save_roundtrips_all_member_kinds() {
        let f = fixture(Duration::from_secs(60));
        let mut child = TsGroup::new("Child");
        let child_id = f.store.save(&mut child).unwrap();

        let mut g = TsGroup::new("Basin Stage")
            .with_type("basin")
            .with_description("all stage gauges")
            .add_ts(DbKey(7))
            .add_site(DbKey(1))
            .add_datatype(DbKey(2))
            .add_criterion("SubLocation", "Gate*")
            .add_criterion("Version", "Raw")
            .subtract_group(child_id);
        let id = f.store.save(&mut g).unwrap();

        f.store.invalidate(None);
        let loaded = f.store.get_by_id(id).unwrap().unwrap();
        assert_eq!(loaded, g);
        assert_eq!(loaded.children[0].mode, CombineMode::Subtract);
        assert_eq!(
            drain(&f.queue),
            vec![
                (NotifyEventType::GroupModified, child_id.0),
                (NotifyEventType::GroupModified, id.0)
            ]
        );
    }

    #[test]
    fn test_update_replaces_members_and_bumps_modify_time() {
        let f = fixture(Duration::from_secs(60));
        let mut g = TsGroup::new("G").add_site(DbKey(1)).add_site(DbKey(2));
        let id = f.store.save(&mut g).unwrap();
        let first_stamp = g.modified_at;

        g.site_ids = vec![DbKey(3)];
        f.store.save(&mut g).unwrap();
        assert!(g.modified_at > first_stamp);

        let fresh = f.store.get_by_id_fresh(id).unwrap().unwrap();
        assert_eq!(fresh.site_ids, vec![DbKey(3)]);
    }

    #[test]
    fn test_name_is_unique_case_insensitively() {
        let f = fixture(Duration::from_secs(60));
        f.store.save(&mut TsGroup::new("Rivers")).unwrap();
        let err = f.store.save(&mut TsGroup::new("RIVERS")).unwrap_err();
        assert!(matches!(err, DepsError::Validation(_)));
        assert!(f.store.save(&mut TsGroup::new("  ")).is_err());

        f.store.invalidate(None);
        assert!(f.store.get_by_name("rivers").unwrap().is_some());
        assert!(f.store.get_by_name("lakes").unwrap().is_none());
    }

    #[test]
    fn test_name_clash_rolls_back_and_own_name_is_free() {
        let f = fixture(Duration::from_secs(60));
        let mut rivers = TsGroup::new("Rivers");
        let id = f.store.save(&mut rivers).unwrap();
        drain(&f.queue);

        let mut dup = TsGroup::new("rivers").add_site(DbKey(1));
        let err = f.store.save(&mut dup).unwrap_err();
        assert!(err.to_string().contains(&format!("id {}", id)));
        assert_eq!(dup.id, None);
        assert!(drain(&f.queue).is_empty());

        // Re-casing a group's own name is not a clash
        rivers.name = "RIVERS".into();
        assert_eq!(f.store.save(&mut rivers).unwrap(), id);
        assert_eq!(f.store.get_by_id_fresh(id).unwrap().unwrap().name, "RIVERS");
        assert_eq!(drain(&f.queue), vec![(NotifyEventType::GroupModified, id.0)]);
    }

    #[test]
    fn test_list_by_type() {
        let f = fixture(Duration::from_secs(60));
        f.store.save(&mut TsGroup::new("a").with_type("basin")).unwrap();
        f.store.save(&mut TsGroup::new("b").with_type("Project")).unwrap();
        f.store.save(&mut TsGroup::new("c").with_type("BASIN")).unwrap();

        let names: Vec<String> = f
            .store
            .list(Some("basin"))
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(f.store.list(None).unwrap().len(), 3);
    }

    #[test]
    fn test_delete_detaches_from_parents() {
        let f = fixture(Duration::from_secs(60));
        let mut child = TsGroup::new("child");
        let child_id = f.store.save(&mut child).unwrap();
        let mut parent = TsGroup::new("parent").include_group(child_id);
        let parent_id = f.store.save(&mut parent).unwrap();
        drain(&f.queue);

        let parents = f.store.delete(child_id).unwrap();
        assert_eq!(parents, BTreeSet::from([parent_id]));
        assert!(f.store.get_by_id(child_id).unwrap().is_none());
        assert!(f.store.get_by_id(parent_id).unwrap().unwrap().children.is_empty());
        assert_eq!(drain(&f.queue), vec![(NotifyEventType::GroupModified, parent_id.0)]);

        assert!(f.store.delete(child_id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_stale_cache_entry_is_reloaded() {
        let f = fixture(Duration::ZERO);
        let mut g = TsGroup::new("G").add_site(DbKey(1));
        let id = f.store.save(&mut g).unwrap();

        // Another session edits the group behind this cache
        f.clock.advance_millis(1_000);
        f.store
            .db
            .execute(
                "UPDATE tsdb_group SET description = 'edited', modified_at = ?1 WHERE group_id = ?2",
                &sql_params![f.clock.now_millis(), id],
            )
            .unwrap();

        let loaded = f.store.get_by_id(id).unwrap().unwrap();
        assert_eq!(loaded.description, "edited");
    }

    #[test]
    fn test_ancestors_and_counts() {
        let f = fixture(Duration::from_secs(60));
        let leaf = f.store.save(&mut TsGroup::new("leaf")).unwrap();
        let mid = f.store.save(&mut TsGroup::new("mid").include_group(leaf)).unwrap();
        let top = f.store.save(&mut TsGroup::new("top").intersect_group(mid)).unwrap();
        assert_eq!(f.store.ancestors_of(leaf).unwrap(), BTreeSet::from([leaf, mid, top]));
        assert_eq!(f.store.count_computations_using(leaf).unwrap(), 0);
    }

    #[test]
    fn test_remove_ts_member() {
        let f = fixture(Duration::from_secs(60));
        let a = f.store.save(&mut TsGroup::new("a").add_ts(DbKey(5))).unwrap();
        f.store.save(&mut TsGroup::new("b").add_ts(DbKey(6))).unwrap();
        assert_eq!(f.store.remove_ts_member(DbKey(5)).unwrap(), BTreeSet::from([a]));
        assert!(f.store.get_by_id(a).unwrap().unwrap().ts_members.is_empty());
    }
}
