//! Per-run counters

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters shared by the parallel discovery waves
#[derive(Debug, Default)]
pub struct RunStats {
    parses: AtomicUsize,
    surface_hits: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
}

/// Plain copy of [`RunStats`] at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub modules: usize,
    pub parses: usize,
    pub surface_hits: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub fetches: usize,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A guest module went through the front end
    pub fn record_parse(&self) {
        self.parses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_surface_hit(&self) {
        self.surface_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, modules: usize, fetches: usize) -> StatsSnapshot {
        StatsSnapshot {
            modules,
            parses: self.parses.load(Ordering::Relaxed),
            surface_hits: self.surface_hits.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            fetches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = RunStats::new();
        stats.record_parse();
        stats.record_parse();
        stats.record_cache_hit();
        stats.record_cache_miss();
        stats.record_surface_hit();

        let snapshot = stats.snapshot(4, 1);
        assert_eq!(snapshot.parses, 2);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.surface_hits, 1);
        assert_eq!(snapshot.modules, 4);
        assert_eq!(snapshot.fetches, 1);
    }
}
