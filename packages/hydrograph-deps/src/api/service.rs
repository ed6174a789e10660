//! Session facade over the stores, tracker and queue
//!
//! One `DependencyService` owns one executor and its caches. Sessions are
//! independent; each worker thread or process opens its own.

use crate::config::DepsConfig;
use crate::errors::{DepsError, DepsResult, ObjectKind};
use crate::features::cache::{CacheKind, CacheMetrics, ObjectCache};
use crate::features::computation::{Computation, ComputationStore};
use crate::features::dependency::{DependencyTracker, ReplaceOutcome};
use crate::features::groups::{GroupExpansion, GroupResolver, GroupStore, TsGroup};
use crate::features::metadata::{MetadataResolver, SqlTsCatalog};
use crate::features::notify::{NotificationQueue, NotificationRecord};
use crate::shared::clock::{Clock, SystemClock};
use crate::shared::models::{DbKey, TimeSeriesIdentifier, TsSet};
use hydrograph_storage::{in_transaction, StatementExecutor};
use prometheus::Registry;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// What a group deletion touched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDeletion {
    /// Computations disabled because they referenced the group
    pub disabled_computations: Vec<DbKey>,
    /// Groups that listed the deleted group as a child
    pub parents: Vec<DbKey>,
}

#[derive(Serialize)]
struct ExpansionDump<'a> {
    group_id: DbKey,
    name: &'a str,
    group_type: &'a str,
    members: Vec<&'a TimeSeriesIdentifier>,
    warnings: Vec<String>,
}

pub struct DependencyService {
    metadata: Arc<dyn MetadataResolver>,
    db: Arc<dyn StatementExecutor>,
    queue: Arc<NotificationQueue>,
    groups: Arc<GroupStore>,
    tracker: Arc<DependencyTracker>,
    computations: Arc<ComputationStore>,
    config: DepsConfig,
    clock: Arc<dyn Clock>,
}

impl DependencyService {
    pub fn new(
        db: Arc<dyn StatementExecutor>,
        metadata: Arc<dyn MetadataResolver>,
        config: DepsConfig,
        registry: Option<&Registry>,
    ) -> DepsResult<Self> {
        Self::with_clock(db, metadata, config, registry, Arc::new(SystemClock))
    }

    pub fn with_clock(
        db: Arc<dyn StatementExecutor>,
        metadata: Arc<dyn MetadataResolver>,
        config: DepsConfig,
        registry: Option<&Registry>,
        clock: Arc<dyn Clock>,
    ) -> DepsResult<Self> {
        config.validate()?;
        let watermark = config.cache.staleness_watermark();

        let queue = Arc::new(NotificationQueue::new(
            Arc::clone(&db),
            Arc::clone(&clock),
            config.notify.clone(),
        ));

        let group_cache = attach_metrics(
            ObjectCache::new("groups", config.cache.group_ttl(), watermark)
                .with_clock(Arc::clone(&clock)),
            registry,
        )?;
        let groups = Arc::new(GroupStore::new(
            Arc::clone(&db),
            group_cache,
            Arc::clone(&queue),
            Arc::clone(&clock),
        ));

        let tracker = Arc::new(DependencyTracker::new(
            Arc::clone(&db),
            Arc::clone(&groups),
            Arc::clone(&metadata),
        ));

        let comp_cache = attach_metrics(
            ObjectCache::new("computations", config.cache.computation_ttl(), watermark)
                .with_clock(Arc::clone(&clock)),
            registry,
        )?;
        let computations = Arc::new(ComputationStore::new(
            Arc::clone(&db),
            comp_cache,
            Arc::clone(&groups),
            Arc::clone(&metadata),
            Arc::clone(&tracker),
            Arc::clone(&queue),
            Arc::clone(&clock),
        ));

        tracing::info!(
            consumer = %queue.consumer(),
            delivery = ?queue.delivery(),
            "dependency session opened"
        );
        Ok(Self {
            metadata,
            db,
            queue,
            groups,
            tracker,
            computations,
            config,
            clock,
        })
    }

    /// `ts_id`-backed metadata catalog using the configured time-series TTL
    pub fn sql_catalog(
        db: Arc<dyn StatementExecutor>,
        config: &DepsConfig,
        registry: Option<&Registry>,
    ) -> DepsResult<Arc<SqlTsCatalog>> {
        let cache = attach_metrics(
            ObjectCache::new(
                "time_series",
                config.cache.time_series_ttl(),
                config.cache.staleness_watermark(),
            ),
            registry,
        )?;
        Ok(Arc::new(SqlTsCatalog::new(db, cache)))
    }

    pub fn config(&self) -> &DepsConfig {
        &self.config
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataResolver> {
        &self.metadata
    }

    pub fn groups(&self) -> &Arc<GroupStore> {
        &self.groups
    }

    pub fn computations(&self) -> &Arc<ComputationStore> {
        &self.computations
    }

    pub fn tracker(&self) -> &Arc<DependencyTracker> {
        &self.tracker
    }

    pub fn queue(&self) -> &Arc<NotificationQueue> {
        &self.queue
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Groups
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn resolve_group(&self, group_id: DbKey) -> DepsResult<TsSet> {
        GroupResolver::new(self.groups.as_ref(), self.metadata.as_ref()).resolve_id(group_id)
    }

    pub fn resolve_group_report(&self, group_id: DbKey) -> DepsResult<GroupExpansion> {
        let group = self
            .groups
            .get_by_id(group_id)?
            .ok_or_else(|| DepsError::not_found(ObjectKind::Group, group_id))?;
        GroupResolver::new(self.groups.as_ref(), self.metadata.as_ref()).resolve_report(&group)
    }

    pub fn save_group(&self, group: &mut TsGroup) -> DepsResult<DbKey> {
        self.groups.save(group)
    }

    /// Disable and detach the group's computations, then delete the group
    /// and its references, in one transaction
    pub fn delete_group(&self, group_id: DbKey) -> DepsResult<GroupDeletion> {
        let result = in_transaction(self.db.as_ref(), |_| -> DepsResult<GroupDeletion> {
            let disabled_computations = self.computations.disable_for_group(group_id)?;
            let parents = self.groups.delete(group_id)?.into_iter().collect();
            Ok(GroupDeletion {
                disabled_computations,
                parents,
            })
        });
        match result {
            Ok(deletion) => {
                tracing::info!(
                    group = %group_id,
                    computations = deletion.disabled_computations.len(),
                    parents = deletion.parents.len(),
                    "group deletion committed"
                );
                Ok(deletion)
            }
            Err(e) => {
                // Inner steps may have updated caches before the rollback
                self.groups.invalidate(None);
                self.computations.invalidate(None);
                Err(e)
            }
        }
    }

    /// Write every group's expansion to `dir/group-<id>.json`
    pub fn dump_expansions(&self, dir: &Path) -> DepsResult<usize> {
        std::fs::create_dir_all(dir)?;
        let resolver = GroupResolver::new(self.groups.as_ref(), self.metadata.as_ref());
        let groups = self.groups.list(None)?;
        for group in &groups {
            let Some(id) = group.id else { continue };
            let expansion = resolver.resolve_report(group)?;
            let dump = ExpansionDump {
                group_id: id,
                name: &group.name,
                group_type: &group.group_type,
                members: expansion.members.iter().collect(),
                warnings: expansion.warnings.iter().map(|w| w.to_string()).collect(),
            };
            let file = std::fs::File::create(dir.join(format!("group-{}.json", id)))?;
            serde_json::to_writer_pretty(std::io::BufWriter::new(file), &dump)?;
        }
        tracing::info!(dir = %dir.display(), groups = groups.len(), "group expansions written");
        Ok(groups.len())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Computations and dependencies
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn save_computation(&self, comp: &mut Computation) -> DepsResult<DbKey> {
        self.computations.save(comp)
    }

    pub fn delete_computation(&self, comp_id: DbKey) -> DepsResult<()> {
        self.computations.delete(comp_id)
    }

    /// Recompute every enabled computation and merge the result into the
    /// live dependency table
    pub fn rebuild_all_dependencies(&self) -> DepsResult<ReplaceOutcome> {
        self.computations.fill_cache()?;
        let comps = self.computations.list_enabled()?;
        self.tracker.full_rebuild(&comps)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Notifications and caches
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn poll_notification(&self) -> DepsResult<Option<NotificationRecord>> {
        self.queue.dequeue_oldest()
    }

    pub fn ack_notification(&self, record: &NotificationRecord) -> DepsResult<bool> {
        self.queue.ack(record)
    }

    pub fn release_notification(&self, record: &NotificationRecord) -> DepsResult<bool> {
        self.queue.release(record)
    }

    pub fn clear_cache(&self, kind: CacheKind) {
        match kind {
            CacheKind::Groups => self.groups.invalidate(None),
            CacheKind::Computations => self.computations.invalidate(None),
            CacheKind::TimeSeries => self.metadata.invalidate(None),
            CacheKind::All => {
                self.groups.invalidate(None);
                self.computations.invalidate(None);
                self.metadata.invalidate(None);
            }
        }
        tracing::debug!(?kind, "cache cleared");
    }

    /// Bulk-reload the group and computation caches
    pub fn refresh_caches(&self) -> DepsResult<()> {
        self.metadata.invalidate(None);
        self.groups.fill_cache()?;
        self.computations.fill_cache()?;
        Ok(())
    }
}

fn attach_metrics<T>(cache: ObjectCache<T>, registry: Option<&Registry>) -> DepsResult<ObjectCache<T>>
where
    T: crate::features::cache::Cachable,
{
    match registry {
        Some(reg) => {
            let metrics = CacheMetrics::new(cache.name(), reg)?;
            Ok(cache.with_metrics(metrics))
        }
        None => Ok(cache),
    }
}
