//! Cache observability counters.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::Serialize;

/// How many recent lookup latencies feed the percentile estimates.
const LATENCY_WINDOW: usize = 1024;

/// Point-in-time snapshot of cache metrics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Cumulative hits (both tiers).
    pub hits: u64,
    /// Cumulative misses.
    pub misses: u64,
    /// Hit rate in [0, 1]; 0 when no lookups happened.
    pub hit_rate: f64,
    /// Median lookup latency over the recent window, in milliseconds.
    pub p50_latency_ms: f64,
    /// 95th-percentile lookup latency over the recent window.
    pub p95_latency_ms: f64,
    /// Most-hit normalized queries, best first.
    pub top_queries: Vec<(String, u64)>,
    /// Whether the cache is running on the in-process fallback.
    pub degraded: bool,
}

/// Thread-safe metric accumulators.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    latencies_ms: Mutex<VecDeque<f64>>,
    hit_counts: Mutex<AHashMap<String, u64>>,
}

impl CacheMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hit for a normalized query.
    pub fn record_hit(&self, query: &str, latency_ms: f64) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.push_latency(latency_ms);
        *self
            .hit_counts
            .lock()
            .entry(query.to_string())
            .or_insert(0) += 1;
    }

    /// Record a miss.
    pub fn record_miss(&self, latency_ms: f64) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.push_latency(latency_ms);
    }

    fn push_latency(&self, latency_ms: f64) {
        let mut latencies = self.latencies_ms.lock();
        if latencies.len() >= LATENCY_WINDOW {
            latencies.pop_front();
        }
        latencies.push_back(latency_ms);
    }

    /// Build a snapshot, taking the top `k` queries by hit count.
    pub fn snapshot(&self, top_k: usize, degraded: bool) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        let (p50, p95) = {
            let latencies = self.latencies_ms.lock();
            percentiles(&latencies)
        };

        let mut top_queries: Vec<(String, u64)> = self
            .hit_counts
            .lock()
            .iter()
            .map(|(query, count)| (query.clone(), *count))
            .collect();
        top_queries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_queries.truncate(top_k);

        CacheStats {
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            p50_latency_ms: p50,
            p95_latency_ms: p95,
            top_queries,
            degraded,
        }
    }
}

fn percentiles(latencies: &VecDeque<f64>) -> (f64, f64) {
    if latencies.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted: Vec<f64> = latencies.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pick = |p: f64| {
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    };
    (pick(0.50), pick(0.95))
}
