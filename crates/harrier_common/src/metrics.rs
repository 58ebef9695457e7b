//! Per-target call metrics for the scatter core.
//!
//! One timing aggregate and one error counter per
//! (operation, keyspace, shard, tablet type) key. Counters are atomics
//! behind a concurrent map; snapshots are cheap and lock-free on the
//! read side. The decision of *which* errors count against a tablet
//! (client-caused codes do not) belongs to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use crate::types::{TabletType, Target};

/// Metrics key: one per (operation, keyspace, shard, tablet type).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey {
    pub operation: &'static str,
    pub keyspace: String,
    pub shard: String,
    pub tablet_type: TabletType,
}

impl CallKey {
    pub fn new(operation: &'static str, target: &Target) -> Self {
        Self {
            operation,
            keyspace: target.keyspace.clone(),
            shard: target.shard.clone(),
            tablet_type: target.tablet_type,
        }
    }
}

#[derive(Default)]
struct CallStats {
    calls: AtomicU64,
    errors: AtomicU64,
    total_us: AtomicU64,
    max_us: AtomicU64,
}

impl CallStats {
    fn record_call(&self, elapsed: Duration) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let us = elapsed.as_micros() as u64;
        self.total_us.fetch_add(us, Ordering::Relaxed);
        let mut cur = self.max_us.load(Ordering::Relaxed);
        while us > cur {
            match self.max_us.compare_exchange_weak(
                cur,
                us,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }
    }
}

/// Snapshot of one key's counters.
#[derive(Debug, Clone, Serialize)]
pub struct CallStatsSnapshot {
    pub operation: &'static str,
    pub keyspace: String,
    pub shard: String,
    pub tablet_type: TabletType,
    pub calls: u64,
    pub errors: u64,
    pub total_us: u64,
    pub max_us: u64,
}

/// Concurrent per-target call metrics registry.
#[derive(Default)]
pub struct ScatterMetrics {
    stats: DashMap<CallKey, Arc<CallStats>>,
}

impl ScatterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &CallKey) -> Arc<CallStats> {
        if let Some(s) = self.stats.get(key) {
            return Arc::clone(&s);
        }
        Arc::clone(
            &self
                .stats
                .entry(key.clone())
                .or_insert_with(|| Arc::new(CallStats::default())),
        )
    }

    /// Record one completed call (success or failure) with its latency.
    pub fn record_call(&self, key: &CallKey, elapsed: Duration) {
        self.entry(key).record_call(elapsed);
    }

    /// Record one tablet error against this key.
    pub fn record_error(&self, key: &CallKey) {
        self.entry(key).errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Error count for one key, 0 if the key has never been seen.
    pub fn error_count(&self, key: &CallKey) -> u64 {
        self.stats
            .get(key)
            .map(|s| s.errors.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Call count for one key, 0 if the key has never been seen.
    pub fn call_count(&self, key: &CallKey) -> u64 {
        self.stats
            .get(key)
            .map(|s| s.calls.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Snapshot every key's counters.
    pub fn snapshot(&self) -> Vec<CallStatsSnapshot> {
        let mut out: Vec<CallStatsSnapshot> = self
            .stats
            .iter()
            .map(|e| {
                let key = e.key();
                let s = e.value();
                CallStatsSnapshot {
                    operation: key.operation,
                    keyspace: key.keyspace.clone(),
                    shard: key.shard.clone(),
                    tablet_type: key.tablet_type,
                    calls: s.calls.load(Ordering::Relaxed),
                    errors: s.errors.load(Ordering::Relaxed),
                    total_us: s.total_us.load(Ordering::Relaxed),
                    max_us: s.max_us.load(Ordering::Relaxed),
                }
            })
            .collect();
        out.sort_by(|a, b| {
            (a.operation, &a.keyspace, &a.shard).cmp(&(b.operation, &b.keyspace, &b.shard))
        });
        out
    }
}
