//! Process-lifetime counters.
//!
//! One `Stats` is created at startup and injected (via `Arc`) into the cache
//! manager and the replication coordinator. Counters only move forward until
//! `reset` is called at teardown.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Stats {
    cache_local_hits: AtomicU64,
    cache_global_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_invalidations: AtomicU64,
    replication_scheduled: AtomicU64,
    replication_succeeded: AtomicU64,
    replication_failed: AtomicU64,
    replication_dropped: AtomicU64,
    heartbeats_published: AtomicU64,
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cache_local_hits: u64,
    pub cache_global_hits: u64,
    pub cache_misses: u64,
    pub cache_invalidations: u64,
    pub replication_scheduled: u64,
    pub replication_succeeded: u64,
    pub replication_failed: u64,
    pub replication_dropped: u64,
    pub heartbeats_published: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_local_hit(&self) {
        self.cache_local_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_global_hit(&self) {
        self.cache_global_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_invalidated(&self, keys: u64) {
        self.cache_invalidations.fetch_add(keys, Ordering::Relaxed);
    }

    pub fn replication_scheduled(&self) {
        self.replication_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn replication_succeeded(&self) {
        self.replication_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn replication_failed(&self) {
        self.replication_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A task rejected because the queue was full. Also counted as failed.
    pub fn replication_dropped(&self) {
        self.replication_dropped.fetch_add(1, Ordering::Relaxed);
        self.replication_failed();
    }

    pub fn heartbeat_published(&self) {
        self.heartbeats_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_local_hits: self.cache_local_hits.load(Ordering::Relaxed),
            cache_global_hits: self.cache_global_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_invalidations: self.cache_invalidations.load(Ordering::Relaxed),
            replication_scheduled: self.replication_scheduled.load(Ordering::Relaxed),
            replication_succeeded: self.replication_succeeded.load(Ordering::Relaxed),
            replication_failed: self.replication_failed.load(Ordering::Relaxed),
            replication_dropped: self.replication_dropped.load(Ordering::Relaxed),
            heartbeats_published: self.heartbeats_published.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.cache_local_hits,
            &self.cache_global_hits,
            &self.cache_misses,
            &self.cache_invalidations,
            &self.replication_scheduled,
            &self.replication_succeeded,
            &self.replication_failed,
            &self.replication_dropped,
            &self.heartbeats_published,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl StatsSnapshot {
    /// Fraction of lookups served from either tier.
    pub fn cache_hit_ratio(&self) -> f64 {
        let hits = self.cache_local_hits + self.cache_global_hits;
        let total = hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}
