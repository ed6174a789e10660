//! Dependency updater worker
//!
//! Drains the notification queue and keeps the dependency table in step
//! with group, computation and time-series changes made by any process.

use crate::api::DependencyService;
use crate::errors::DepsResult;
use crate::features::computation::Computation;
use crate::features::dependency::DependencyEdge;
use crate::features::notify::{NotificationRecord, NotifyEventType};
use crate::shared::clock::Clock;
use crate::shared::models::DbKey;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What one poll did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Queue empty
    Idle,
    Processed(NotificationRecord),
    /// Same work as the previous record and enqueued before that record's
    /// processing began; acknowledged without processing
    Skipped(NotificationRecord),
    /// Processing failed; the record was released for another attempt
    Failed(NotificationRecord),
}

/// Running totals for one worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdaterStats {
    pub done: u64,
    pub skipped: u64,
    pub errors: u64,
}

/// A processed record and the clock millis at which its processing began
struct Processed {
    record: NotificationRecord,
    started_at: i64,
}

impl Processed {
    /// `next` describes the same work and its change was already visible
    /// when this record was processed
    fn covers(&self, next: &NotificationRecord) -> bool {
        self.record.same_work(next) && next.enqueued_at < self.started_at
    }
}

pub struct DependsUpdater {
    service: Arc<DependencyService>,
    last_processed: Option<Processed>,
    /// Clock millis of the last cache refresh
    last_refresh: Option<i64>,
    stats: UpdaterStats,
}

impl DependsUpdater {
    pub fn new(service: Arc<DependencyService>) -> Self {
        Self {
            service,
            last_processed: None,
            last_refresh: None,
            stats: UpdaterStats::default(),
        }
    }

    pub fn stats(&self) -> UpdaterStats {
        self.stats
    }

    pub fn service(&self) -> &Arc<DependencyService> {
        &self.service
    }

    /// Work until `shutdown` is set. Storage errors while polling end the loop.
    pub fn run(&mut self, shutdown: &AtomicBool) -> DepsResult<()> {
        let updater = self.service.config().updater.clone();
        let poll_interval = self.service.config().notify.poll_interval();
        tracing::info!(
            consumer = %self.service.queue().consumer(),
            full_eval = updater.full_eval_on_startup,
            "dependency updater starting"
        );

        if updater.full_eval_on_startup {
            self.service.rebuild_all_dependencies()?;
        }

        while !shutdown.load(Ordering::SeqCst) {
            self.refresh_if_due()?;
            if self.poll_once()? == PollOutcome::Idle {
                std::thread::sleep(poll_interval);
            }
        }

        tracing::info!(
            done = self.stats.done,
            skipped = self.stats.skipped,
            errors = self.stats.errors,
            "dependency updater stopped"
        );
        Ok(())
    }

    /// Reload caches when the refresh interval has passed, then write group
    /// dumps if configured. Returns whether a refresh happened.
    pub fn refresh_if_due(&mut self) -> DepsResult<bool> {
        let config = &self.service.config().updater;
        let now = self.service.clock().now_millis();
        let interval = i64::try_from(config.cache_refresh().as_millis()).unwrap_or(i64::MAX);
        let due = self.last_refresh.map_or(true, |at| now - at >= interval);
        if !due {
            return Ok(false);
        }

        self.service.refresh_caches()?;
        if let Some(dir) = &config.group_dump_dir {
            if let Err(e) = self.service.dump_expansions(dir) {
                tracing::error!(dir = %dir.display(), error = %e, "group dump failed");
            }
        }
        self.last_refresh = Some(now);
        Ok(true)
    }

    /// Take one record and handle it
    pub fn poll_once(&mut self) -> DepsResult<PollOutcome> {
        let Some(record) = self.service.poll_notification()? else {
            return Ok(PollOutcome::Idle);
        };

        if self
            .last_processed
            .as_ref()
            .is_some_and(|last| last.covers(&record))
        {
            tracing::debug!(record = %record, "already covered by previous notification; skipped");
            self.service.ack_notification(&record)?;
            self.stats.skipped += 1;
            return Ok(PollOutcome::Skipped(record));
        }

        let started_at = self.service.clock().now_millis();
        match self.process(&record) {
            Ok(()) => {
                self.service.ack_notification(&record)?;
                self.stats.done += 1;
                self.last_processed = Some(Processed {
                    record: record.clone(),
                    started_at,
                });
                Ok(PollOutcome::Processed(record))
            }
            Err(e) => {
                tracing::warn!(record = %record, error = %e, "notification processing failed");
                self.service.release_notification(&record)?;
                self.stats.errors += 1;
                self.last_processed = None;
                Ok(PollOutcome::Failed(record))
            }
        }
    }

    /// Apply one notification
    pub fn process(&self, record: &NotificationRecord) -> DepsResult<()> {
        tracing::info!(record = %record, "processing notification");
        match record.event_type {
            NotifyEventType::ComputationModified => self.computation_modified(record.key),
            NotifyEventType::GroupModified => self.group_modified(record.key),
            NotifyEventType::TsCreated => self.ts_created(record.key),
            NotifyEventType::TsDeleted => self.ts_deleted(record.key),
            NotifyEventType::TsModified => self.ts_modified(record.key),
            NotifyEventType::FullEvaluation => self.service.rebuild_all_dependencies().map(|_| ()),
        }
    }

    fn computation_modified(&self, comp_id: DbKey) -> DepsResult<()> {
        let comps = self.service.computations();
        let tracker = self.service.tracker();
        match comps.get_by_id_fresh(comp_id)? {
            Some(comp) if comp.is_triggered() => {
                tracker.recompute_and_replace(&comp)?;
            }
            _ => {
                let removed = tracker.remove_for_computation(comp_id)?;
                tracing::debug!(comp = %comp_id, removed, "computation gone or inactive; edges dropped");
            }
        }
        Ok(())
    }

    fn group_modified(&self, group_id: DbKey) -> DepsResult<()> {
        let groups = self.service.groups();
        let comps = self.service.computations();
        groups.invalidate(Some(group_id));

        let affected = groups.ancestors_of(group_id)?;
        let mut recomputed = 0usize;
        for gid in &affected {
            let group_exists = groups.get_by_id(*gid)?.is_some();
            for comp_id in comps.computations_using_group(*gid)? {
                let Some(comp) = comps.get_by_id_fresh(comp_id)? else {
                    continue;
                };
                if !comp.enabled {
                    continue;
                }
                if group_exists {
                    self.service.tracker().recompute_and_replace(&comp)?;
                    recomputed += 1;
                } else {
                    tracing::warn!(comp = %comp, group = %gid, "group no longer exists; disabling computation");
                    comps.disable(comp_id)?;
                }
            }
        }
        tracing::debug!(group = %group_id, groups = affected.len(), recomputed, "group change applied");
        Ok(())
    }

    fn ts_created(&self, ts_key: DbKey) -> DepsResult<()> {
        let metadata = self.service.metadata();
        metadata.invalidate(Some(ts_key));
        match metadata.by_key(ts_key) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(ts_key = %ts_key, "created series no longer exists; treating as deleted");
                return self.ts_deleted(ts_key);
            }
            Err(e) => return Err(e),
        }

        let group_comps: Vec<Computation> = self
            .service
            .computations()
            .list_enabled()?
            .into_iter()
            .filter(|c| c.group_id.is_some() && c.is_triggered())
            .collect();

        let mut new_edges = BTreeSet::new();
        for comp in &group_comps {
            let edges = self.service.tracker().recompute(comp)?;
            new_edges.extend(edges.into_iter().filter(|e: &DependencyEdge| e.ts_key == ts_key));
        }
        let added = self.service.tracker().add_edges(&new_edges)?;
        tracing::debug!(ts_key = %ts_key, added, "new series wired into group computations");
        Ok(())
    }

    fn ts_deleted(&self, ts_key: DbKey) -> DepsResult<()> {
        self.service.metadata().invalidate(Some(ts_key));
        let edges = self.service.tracker().remove_for_time_series(ts_key)?;
        let groups = self.service.groups().remove_ts_member(ts_key)?;
        let disabled = self.service.computations().disable_bound_to(ts_key)?;
        tracing::debug!(
            ts_key = %ts_key,
            edges,
            groups = groups.len(),
            disabled = disabled.len(),
            "deleted series detached"
        );
        Ok(())
    }

    /// Identifier changed in place: drop its edges, then wire it up again
    /// as if new. Computations bound to it stay enabled and are recomputed.
    fn ts_modified(&self, ts_key: DbKey) -> DepsResult<()> {
        self.service.metadata().invalidate(Some(ts_key));
        self.service.tracker().remove_for_time_series(ts_key)?;

        let bound: Vec<Computation> = self
            .service
            .computations()
            .list_enabled()?
            .into_iter()
            .filter(|c| c.inputs().any(|p| p.ts_key == Some(ts_key)))
            .collect();
        for comp in &bound {
            self.service.tracker().recompute_and_replace(comp)?;
        }
        self.ts_created(ts_key)
    }
}
