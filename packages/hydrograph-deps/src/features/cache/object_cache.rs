//! Generic keyed object cache
//!
//! - indexed by surrogate key and, optionally, a case-insensitive unique name
//! - coarse versioning: the whole cache has one "last refill" time and callers
//!   decide when to clear and bulk-repopulate (`needs_refill` / `refill`)
//! - optional staleness hook on key lookup: entries older than the watermark
//!   are re-checked against the store before being trusted
//!
//! One mutex guards all mutation and snapshotting. Staleness checks run with
//! the lock released so a check that hits the store never blocks other
//! readers, and caches never lock each other.

use super::metrics::CacheMetrics;
use crate::errors::DepsResult;
use crate::shared::clock::{Clock, SystemClock};
use crate::shared::models::DbKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Anything an [`ObjectCache`] can hold
pub trait Cachable: Clone + Send + Sync {
    fn cache_key(&self) -> DbKey;

    /// Secondary unique name, compared case-insensitively
    fn unique_name(&self) -> Option<String> {
        None
    }
}

struct Entry<T> {
    value: T,
    /// Clock millis when this entry was loaded or last confirmed fresh
    stamped_at: i64,
    /// Bumped on every put; a check only acts on the entry it inspected
    generation: u64,
    name: Option<String>,
}

struct State<T> {
    by_key: HashMap<DbKey, Entry<T>>,
    by_name: HashMap<String, DbKey>,
    last_fill: Option<i64>,
    next_generation: u64,
}

impl<T> State<T> {
    fn unlink_name(&mut self, key: DbKey, name: &Option<String>) {
        if let Some(name) = name {
            if self.by_name.get(name) == Some(&key) {
                self.by_name.remove(name);
            }
        }
    }
}

/// Point-in-time statistics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Restartable snapshot of cache contents, ordered by key
#[derive(Debug, Clone)]
pub struct CacheSnapshot<T> {
    items: Arc<[T]>,
}

impl<T> CacheSnapshot<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a, T> IntoIterator for &'a CacheSnapshot<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

pub struct ObjectCache<T> {
    name: String,
    state: Mutex<State<T>>,
    ttl: Duration,
    watermark: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    metrics: Option<CacheMetrics>,
    clock: Arc<dyn Clock>,
}

impl<T: Cachable> ObjectCache<T> {
    /// `ttl`: age after which `needs_refill` reports true.
    /// `watermark`: entry age after which checked lookups consult the store.
    pub fn new(name: impl Into<String>, ttl: Duration, watermark: Duration) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State {
                by_key: HashMap::new(),
                by_name: HashMap::new(),
                last_fill: None,
                next_generation: 0,
            }),
            ttl,
            watermark,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            metrics: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Age entries and refills against `clock` instead of the system clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: CacheMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert or replace, re-indexing the unique name
    pub fn put(&self, value: T) {
        let mut state = self.state.lock();
        Self::put_locked(&mut state, value, self.clock.now_millis());
        self.set_entries_gauge(state.by_key.len());
    }

    fn age(&self, since: i64) -> Duration {
        Duration::from_millis((self.clock.now_millis() - since).max(0) as u64)
    }

    fn put_locked(state: &mut State<T>, value: T, now: i64) {
        let key = value.cache_key();
        let name = value.unique_name().map(|n| n.to_lowercase());
        if let Some(old) = state.by_key.remove(&key) {
            state.unlink_name(key, &old.name);
        }
        if let Some(n) = &name {
            state.by_name.insert(n.clone(), key);
        }
        state.next_generation += 1;
        let generation = state.next_generation;
        state.by_key.insert(
            key,
            Entry {
                value,
                stamped_at: now,
                generation,
                name,
            },
        );
    }

    /// Plain lookup, no staleness check
    pub fn get_by_key(&self, key: DbKey) -> Option<T> {
        let found = self.state.lock().by_key.get(&key).map(|e| e.value.clone());
        self.record(found.is_some());
        found
    }

    /// Lookup that re-validates entries older than the watermark.
    ///
    /// `is_fresh` runs without the cache lock held. `Ok(false)` or an error
    /// evicts the entry and reports a miss; `Ok(true)` re-stamps it.
    pub fn get_by_key_checked<F>(&self, key: DbKey, is_fresh: F) -> Option<T>
    where
        F: FnOnce(&T) -> DepsResult<bool>,
    {
        let found = {
            let state = self.state.lock();
            state
                .by_key
                .get(&key)
                .map(|entry| {
                    let young = self.age(entry.stamped_at) < self.watermark;
                    (entry.value.clone(), entry.generation, young)
                })
        };

        let Some((candidate, generation, young)) = found else {
            self.record(false);
            return None;
        };
        if young {
            self.record(true);
            return Some(candidate);
        }

        let fresh = match is_fresh(&candidate) {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::warn!(cache = %self.name, key = %key, error = %e, "staleness check failed; evicting");
                false
            }
        };

        let now = self.clock.now_millis();
        let mut state = self.state.lock();
        let unchanged = state
            .by_key
            .get(&key)
            .is_some_and(|entry| entry.generation == generation);

        if fresh {
            if let Some(entry) = state.by_key.get_mut(&key).filter(|_| unchanged) {
                entry.stamped_at = now;
            }
            drop(state);
            self.record(true);
            return Some(candidate);
        }

        // A put that raced the check replaced the entry; keep the newer value
        if unchanged {
            if let Some(entry) = state.by_key.remove(&key) {
                state.unlink_name(key, &entry.name);
            }
            self.set_entries_gauge(state.by_key.len());
            drop(state);
            tracing::debug!(cache = %self.name, key = %key, "stale entry evicted");
            self.evictions.fetch_add(1, Ordering::Relaxed);
            if let Some(m) = &self.metrics {
                m.evictions.inc();
            }
        }
        self.record(false);
        None
    }

    /// Case-insensitive unique-name lookup
    pub fn get_by_name(&self, name: &str) -> Option<T> {
        let found = {
            let state = self.state.lock();
            state
                .by_name
                .get(&name.to_lowercase())
                .and_then(|key| state.by_key.get(key))
                .map(|e| e.value.clone())
        };
        self.record(found.is_some());
        found
    }

    /// Snapshot of every cached value, ordered by key
    pub fn iter(&self) -> CacheSnapshot<T> {
        let state = self.state.lock();
        let mut entries: Vec<(&DbKey, &Entry<T>)> = state.by_key.iter().collect();
        entries.sort_by_key(|(k, _)| **k);
        let items: Arc<[T]> = entries.into_iter().map(|(_, e)| e.value.clone()).collect();
        CacheSnapshot { items }
    }

    /// Linear scan; O(n) in the number of cached entries
    pub fn search<P>(&self, mut predicate: P) -> Vec<T>
    where
        P: FnMut(&T) -> bool,
    {
        let mut found: Vec<T> = {
            let state = self.state.lock();
            state
                .by_key
                .values()
                .filter(|e| predicate(&e.value))
                .map(|e| e.value.clone())
                .collect()
        };
        found.sort_by_key(|v| v.cache_key());
        found
    }

    pub fn remove(&self, key: DbKey) -> Option<T> {
        let mut state = self.state.lock();
        let removed = state.by_key.remove(&key).map(|entry| {
            state.unlink_name(key, &entry.name);
            entry.value
        });
        self.set_entries_gauge(state.by_key.len());
        removed
    }

    /// Drop everything and forget the last refill
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.by_key.clear();
        state.by_name.clear();
        state.last_fill = None;
        self.set_entries_gauge(0);
        tracing::debug!(cache = %self.name, "cache cleared");
    }

    /// Atomically replace the contents with a freshly loaded set
    pub fn refill<I>(&self, values: I)
    where
        I: IntoIterator<Item = T>,
    {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();
        state.by_key.clear();
        state.by_name.clear();
        for value in values {
            Self::put_locked(&mut state, value, now);
        }
        state.last_fill = Some(now);
        self.set_entries_gauge(state.by_key.len());
        tracing::debug!(cache = %self.name, entries = state.by_key.len(), "cache refilled");
    }

    pub fn mark_filled(&self) {
        self.state.lock().last_fill = Some(self.clock.now_millis());
    }

    /// True when never filled or the last refill is older than the TTL
    pub fn needs_refill(&self) -> bool {
        let last_fill = self.state.lock().last_fill;
        match last_fill {
            None => true,
            Some(at) => self.age(at) >= self.ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(m) = &self.metrics {
            if hit {
                m.hits.inc();
            } else {
                m.misses.inc();
            }
        }
    }

    fn set_entries_gauge(&self, len: usize) {
        if let Some(m) = &self.metrics {
            m.entries.set(len as i64);
        }
    }
}
