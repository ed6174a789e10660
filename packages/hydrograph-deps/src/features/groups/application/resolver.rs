//! Recursive group expansion
//!
//! ```text
//! resolve(G):
//!   guard += G
//!   running = explicit(G) ∪ { ts ∈ universe | criteria(G) passes ts }
//!   for (child, mode) in children(G), in declaration order:
//!       child ∈ guard    → warn, skip          (cycle)
//!       child missing    → warn, skip
//!       otherwise        → running = mode(running, resolve(child))
//!   guard -= G
//! ```
//!
//! All per-call state (cycle guard, compiled criteria, the candidate
//! universe, absorbed warnings) lives in a [`ResolveContext`] created by
//! each top-level call, so concurrent resolutions never share it.

use crate::errors::{DepsError, DepsResult, ObjectKind};
use crate::features::groups::domain::{CompiledCriteria, TsGroup};
use crate::features::metadata::MetadataResolver;
use crate::shared::models::{DbKey, TimeSeriesIdentifier, TsSet};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Where the resolver reads child group definitions from
pub trait GroupSource {
    /// `Ok(None)` when no such group exists
    fn find_group(&self, id: DbKey) -> DepsResult<Option<TsGroup>>;
}

impl GroupSource for HashMap<DbKey, TsGroup> {
    fn find_group(&self, id: DbKey) -> DepsResult<Option<TsGroup>> {
        Ok(self.get(&id).cloned())
    }
}

impl GroupSource for BTreeMap<DbKey, TsGroup> {
    fn find_group(&self, id: DbKey) -> DepsResult<Option<TsGroup>> {
        Ok(self.get(&id).cloned())
    }
}

/// Result of one resolution plus every condition it absorbed
#[derive(Debug)]
pub struct GroupExpansion {
    pub group_id: Option<DbKey>,
    pub members: TsSet,
    /// Cycles, missing children or members, dropped criteria
    pub warnings: Vec<DepsError>,
}

#[derive(Default)]
struct ResolveContext {
    guard: HashSet<DbKey>,
    compiled: HashMap<DbKey, Arc<CompiledCriteria>>,
    universe: Option<Vec<TimeSeriesIdentifier>>,
    warnings: Vec<DepsError>,
}

pub struct GroupResolver<'a> {
    groups: &'a dyn GroupSource,
    metadata: &'a dyn MetadataResolver,
}

impl<'a> GroupResolver<'a> {
    pub fn new(groups: &'a dyn GroupSource, metadata: &'a dyn MetadataResolver) -> Self {
        Self { groups, metadata }
    }

    /// Expand a group definition to concrete series
    pub fn resolve(&self, group: &TsGroup) -> DepsResult<TsSet> {
        Ok(self.resolve_report(group)?.members)
    }

    /// Expand a stored group by id
    pub fn resolve_id(&self, id: DbKey) -> DepsResult<TsSet> {
        let group = self
            .groups
            .find_group(id)?
            .ok_or_else(|| DepsError::not_found(ObjectKind::Group, id))?;
        self.resolve(&group)
    }

    /// Like [`Self::resolve`], also returning the absorbed warnings
    pub fn resolve_report(&self, group: &TsGroup) -> DepsResult<GroupExpansion> {
        let mut ctx = ResolveContext::default();
        let members = self.expand(group, &mut ctx)?;
        tracing::debug!(
            group = %group.display_id(),
            members = members.len(),
            warnings = ctx.warnings.len(),
            "group resolved"
        );
        Ok(GroupExpansion {
            group_id: group.id,
            members,
            warnings: ctx.warnings,
        })
    }

    fn expand(&self, group: &TsGroup, ctx: &mut ResolveContext) -> DepsResult<TsSet> {
        let pushed = group.id.map(|id| ctx.guard.insert(id)).unwrap_or(false);
        let result = self.expand_guarded(group, ctx);
        if pushed {
            if let Some(id) = group.id {
                ctx.guard.remove(&id);
            }
        }
        result
    }

    fn expand_guarded(&self, group: &TsGroup, ctx: &mut ResolveContext) -> DepsResult<TsSet> {
        let mut running = self.direct_members(group, ctx)?;

        for child in &group.children {
            if ctx.guard.contains(&child.group_id) {
                tracing::warn!(
                    group = %group.display_id(),
                    child = %child.group_id,
                    "cyclic group reference; child skipped"
                );
                ctx.warnings.push(DepsError::CyclicReference {
                    parent: group.id.unwrap_or_default(),
                    child: child.group_id,
                });
                continue;
            }

            let Some(sub) = self.groups.find_group(child.group_id)? else {
                tracing::warn!(
                    group = %group.display_id(),
                    child = %child.group_id,
                    "child group does not exist; skipped"
                );
                ctx.warnings
                    .push(DepsError::not_found(ObjectKind::Group, child.group_id));
                continue;
            };

            let members = self.expand(&sub, ctx)?;
            tracing::trace!(
                group = %group.display_id(),
                child = %child.group_id,
                mode = %child.mode,
                child_members = members.len(),
                "folding child group"
            );
            running = child.mode.apply(running, members);
        }

        Ok(running)
    }

    fn direct_members(&self, group: &TsGroup, ctx: &mut ResolveContext) -> DepsResult<TsSet> {
        let mut out = TsSet::new();

        for key in &group.ts_members {
            match self.metadata.by_key(*key) {
                Ok(ts) => {
                    out.insert(ts);
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!(group = %group.display_id(), ts_key = %key, "explicit member no longer exists");
                    ctx.warnings.push(e);
                }
                Err(e) => return Err(e),
            }
        }

        if !group.has_direct_criteria() {
            return Ok(out);
        }

        let memo = group.id.and_then(|id| ctx.compiled.get(&id).cloned());
        let criteria = match memo {
            Some(c) => c,
            None => {
                let (compiled, warnings) = CompiledCriteria::compile(group);
                ctx.warnings.extend(warnings);
                let compiled = Arc::new(compiled);
                if let Some(id) = group.id {
                    ctx.compiled.insert(id, Arc::clone(&compiled));
                }
                compiled
            }
        };
        if criteria.is_empty() {
            return Ok(out);
        }

        if ctx.universe.is_none() {
            ctx.universe = Some(self.metadata.list_all()?);
        }
        let universe = ctx.universe.as_deref().unwrap_or_default();
        out.extend(criteria.select(universe));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::groups::domain::CombineMode;
    use crate::features::metadata::InMemoryTsCatalog;
    use crate::shared::models::TsIdParts;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ts(key: i64, name: &str, site: i64) -> TimeSeriesIdentifier {
        TimeSeriesIdentifier::new(DbKey(key), TsIdParts::parse(name).unwrap()).with_site(DbKey(site))
    }

    fn catalog() -> InMemoryTsCatalog {
        InMemoryTsCatalog::with_series([
            ts(1, "S1.Stage.Inst.1Hour.0.Raw", 1),
            ts(2, "S1.Flow.Inst.1Hour.0.Raw", 1),
            ts(3, "S2.Stage.Inst.1Hour.0.Raw", 2),
            ts(4, "S3.Stage.Inst.1Hour.0.Raw", 3),
        ])
    }

    fn groups(defs: Vec<TsGroup>) -> HashMap<DbKey, TsGroup> {
        defs.into_iter().map(|g| (g.id.unwrap(), g)).collect()
    }

    fn keys(set: &TsSet) -> Vec<i64> {
        set.iter().map(|t| t.key.0).collect()
    }

    #[test]
    fn test_empty_group_resolves_to_nothing() {
        let cat = catalog();
        let src: HashMap<DbKey, TsGroup> = HashMap::new();
        let r = GroupResolver::new(&src, &cat);
        assert!(r.resolve(&TsGroup::new("empty")).unwrap().is_empty());
    }

    #[test]
    fn test_explicit_members_and_missing_member_warning() {
        let cat = catalog();
        let src: HashMap<DbKey, TsGroup> = HashMap::new();
        let r = GroupResolver::new(&src, &cat);
        let g = TsGroup::new("g").add_ts(DbKey(4)).add_ts(DbKey(99));
        let report = r.resolve_report(&g).unwrap();
        assert_eq!(keys(&report.members), vec![4]);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].is_not_found());
    }

    #[test]
    fn test_subtract_different_sites() {
        let cat = catalog();
        let src = groups(vec![
            TsGroup::new("A").with_id(DbKey(1)).add_site(DbKey(1)).subtract_group(DbKey(2)),
            TsGroup::new("B").with_id(DbKey(2)).add_site(DbKey(2)),
        ]);
        let r = GroupResolver::new(&src, &cat);
        assert_eq!(keys(&r.resolve_id(DbKey(1)).unwrap()), vec![1, 2]);
    }

    #[test]
    fn test_subtract_same_site_is_empty() {
        let cat = catalog();
        let src = groups(vec![
            TsGroup::new("A").with_id(DbKey(1)).add_site(DbKey(1)).subtract_group(DbKey(2)),
            TsGroup::new("B").with_id(DbKey(2)).add_site(DbKey(1)),
        ]);
        let r = GroupResolver::new(&src, &cat);
        assert!(r.resolve_id(DbKey(1)).unwrap().is_empty());
    }

    #[test]
    fn test_children_fold_in_declaration_order() {
        let cat = catalog();
        // ({S1} ∪ {S2}) ∩ {Stage} = {1, 3}
        let src = groups(vec![
            TsGroup::new("top")
                .with_id(DbKey(1))
                .add_site(DbKey(1))
                .include_group(DbKey(2))
                .intersect_group(DbKey(3)),
            TsGroup::new("s2").with_id(DbKey(2)).add_site(DbKey(2)),
            TsGroup::new("stage").with_id(DbKey(3)).add_criterion("Param", "Stage"),
        ]);
        let r = GroupResolver::new(&src, &cat);
        assert_eq!(keys(&r.resolve_id(DbKey(1)).unwrap()), vec![1, 3]);
    }

    #[test]
    fn test_self_include_terminates() {
        let cat = catalog();
        let src = groups(vec![TsGroup::new("A")
            .with_id(DbKey(1))
            .add_site(DbKey(3))
            .include_group(DbKey(1))]);
        let r = GroupResolver::new(&src, &cat);
        let report = r.resolve_report(&src[&DbKey(1)]).unwrap();
        assert_eq!(keys(&report.members), vec![4]);
        assert!(matches!(
            report.warnings[0],
            DepsError::CyclicReference { parent: DbKey(1), child: DbKey(1) }
        ));
    }

    #[test]
    fn test_transitive_cycle_terminates_without_double_counting() {
        let cat = catalog();
        let src = groups(vec![
            TsGroup::new("A").with_id(DbKey(1)).add_ts(DbKey(1)).include_group(DbKey(2)),
            TsGroup::new("B").with_id(DbKey(2)).add_ts(DbKey(3)).include_group(DbKey(3)),
            TsGroup::new("C").with_id(DbKey(3)).add_ts(DbKey(4)).include_group(DbKey(1)),
        ]);
        let r = GroupResolver::new(&src, &cat);
        let report = r.resolve_report(&src[&DbKey(1)]).unwrap();
        assert_eq!(keys(&report.members), vec![1, 3, 4]);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let cat = catalog();
        let src = groups(vec![
            TsGroup::new("top").with_id(DbKey(1)).include_group(DbKey(2)).include_group(DbKey(3)),
            TsGroup::new("left").with_id(DbKey(2)).include_group(DbKey(4)),
            TsGroup::new("right").with_id(DbKey(3)).include_group(DbKey(4)),
            TsGroup::new("leaf").with_id(DbKey(4)).add_ts(DbKey(2)),
        ]);
        let r = GroupResolver::new(&src, &cat);
        let report = r.resolve_report(&src[&DbKey(1)]).unwrap();
        assert_eq!(keys(&report.members), vec![2]);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_missing_child_is_skipped() {
        let cat = catalog();
        let src = groups(vec![TsGroup::new("A")
            .with_id(DbKey(1))
            .add_ts(DbKey(1))
            .add_child(DbKey(42), CombineMode::Intersect)]);
        let r = GroupResolver::new(&src, &cat);
        let report = r.resolve_report(&src[&DbKey(1)]).unwrap();
        assert_eq!(keys(&report.members), vec![1]);
        assert!(report.warnings[0].is_not_found());
    }

    #[test]
    fn test_resolve_unknown_id_is_not_found() {
        let cat = catalog();
        let src: HashMap<DbKey, TsGroup> = HashMap::new();
        let r = GroupResolver::new(&src, &cat);
        assert!(r.resolve_id(DbKey(5)).unwrap_err().is_not_found());
    }

    /// Counts universe loads to check the per-call memo
    struct CountingCatalog {
        inner: InMemoryTsCatalog,
        list_calls: AtomicUsize,
    }

    impl MetadataResolver for CountingCatalog {
        fn by_key(&self, key: DbKey) -> DepsResult<TimeSeriesIdentifier> {
            self.inner.by_key(key)
        }
        fn resolve(&self, parts: &TsIdParts) -> DepsResult<TimeSeriesIdentifier> {
            self.inner.resolve(parts)
        }
        fn list_all(&self) -> DepsResult<Vec<TimeSeriesIdentifier>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.list_all()
        }
        fn invalidate(&self, _key: Option<DbKey>) {}
    }

    #[test]
    fn test_universe_loaded_once_per_call() {
        let cat = CountingCatalog {
            inner: catalog(),
            list_calls: AtomicUsize::new(0),
        };
        let src = groups(vec![
            TsGroup::new("A").with_id(DbKey(1)).add_site(DbKey(1)).include_group(DbKey(2)),
            TsGroup::new("B").with_id(DbKey(2)).add_site(DbKey(2)),
        ]);
        let r = GroupResolver::new(&src, &cat);
        assert_eq!(keys(&r.resolve_id(DbKey(1)).unwrap()), vec![1, 2, 3]);
        assert_eq!(cat.list_calls.load(Ordering::SeqCst), 1);

        r.resolve_id(DbKey(2)).unwrap();
        assert_eq!(cat.list_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_storage_failure_propagates() {
        struct Broken;
        impl GroupSource for Broken {
            fn find_group(&self, _id: DbKey) -> DepsResult<Option<TsGroup>> {
                Err(hydrograph_storage::StorageError::database("connection lost").into())
            }
        }
        let cat = catalog();
        let r = GroupResolver::new(&Broken, &cat);
        let g = TsGroup::new("g").include_group(DbKey(2));
        assert!(r.resolve(&g).unwrap_err().is_backing_store());
    }
}
