//! Prometheus metrics for object caches

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Opts, Registry,
};

/// Per-cache metrics, labelled `cache=<name>`
#[derive(Clone)]
pub struct CacheMetrics {
    pub hits: IntCounter,
    pub misses: IntCounter,
    pub evictions: IntCounter,
    pub entries: IntGauge,
}

impl CacheMetrics {
    pub fn new(cache_name: &str, registry: &Registry) -> prometheus::Result<Self> {
        let opts = |name: &str, help: &str| Opts::new(name, help).const_label("cache", cache_name);
        Ok(Self {
            hits: register_int_counter_with_registry!(
                opts("hydrograph_cache_hits_total", "Object cache hits"),
                registry
            )?,
            misses: register_int_counter_with_registry!(
                opts("hydrograph_cache_misses_total", "Object cache misses"),
                registry
            )?,
            evictions: register_int_counter_with_registry!(
                opts(
                    "hydrograph_cache_evictions_total",
                    "Entries evicted after a failed staleness check"
                ),
                registry
            )?,
            entries: register_int_gauge_with_registry!(
                opts("hydrograph_cache_entries", "Object cache entry count"),
                registry
            )?,
        })
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.get() as f64;
        let total = hits + self.misses.get() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_caches_share_one_registry() {
        let registry = Registry::new();
        let groups = CacheMetrics::new("groups", &registry).unwrap();
        let comps = CacheMetrics::new("computations", &registry).unwrap();

        groups.hits.inc();
        groups.misses.inc();
        comps.hits.inc_by(3);

        assert_eq!(groups.hit_rate(), 0.5);
        assert_eq!(comps.hit_rate(), 1.0);

        let families = registry.gather();
        let hits = families
            .iter()
            .find(|f| f.get_name() == "hydrograph_cache_hits_total")
            .unwrap();
        assert_eq!(hits.get_metric().len(), 2);
    }

    #[test]
    fn test_duplicate_cache_name_is_rejected() {
        let registry = Registry::new();
        CacheMetrics::new("groups", &registry).unwrap();
        assert!(CacheMetrics::new("groups", &registry).is_err());
    }
}
