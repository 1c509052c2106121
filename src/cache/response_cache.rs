//! The two-tier response cache.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::analysis::NormalizedQuery;
use crate::classify::ClassificationResult;
use crate::embedding::EmbeddingMatcher;
use crate::storage::{cache_exact_key, KvStore, VectorIndex};
use crate::util::{dot, LruCache};

use super::metrics::{CacheMetrics, CacheStats};

/// Cache tuning knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cosine similarity required for a semantic hit on the normal path.
    pub similarity_threshold: f32,
    /// Looser similarity used by the fallback path when the LLM failed.
    pub fallback_similarity_threshold: f32,
    /// Entry time-to-live in seconds.
    pub ttl_seconds: i64,
    /// Maximum entries before LRU eviction.
    pub max_size: usize,
    /// Minimum token count for a query to be cacheable.
    pub min_query_tokens: usize,
    /// Minimum result confidence for a result to be cacheable.
    pub min_confidence: f32,
    /// Capacity of the in-process store used in degraded mode.
    pub degraded_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.95,
            fallback_similarity_threshold: 0.90,
            ttl_seconds: 24 * 60 * 60,
            max_size: 10_000,
            min_query_tokens: 3,
            min_confidence: 0.70,
            degraded_capacity: 1_000,
        }
    }
}

/// A stored cache record. Immutable after insertion except `hit_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The normalized query this entry answers.
    pub normalized_query: String,
    /// Unit-length query embedding; empty when the encoder was down.
    pub embedding: Vec<f32>,
    /// The cached classification result.
    pub result: ClassificationResult,
    /// Unix timestamp of insertion.
    pub stored_at: i64,
    /// Entry TTL in seconds.
    pub ttl_seconds: i64,
    /// Number of times this entry served a hit.
    pub hit_count: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: i64) -> bool {
        now >= self.stored_at + self.ttl_seconds
    }
}

/// Two-tier (exact + semantic) response cache with TTL, LRU eviction, and
/// an in-process degraded mode.
pub struct ResponseCache {
    config: CacheConfig,
    kv: Arc<dyn KvStore>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<EmbeddingMatcher>,
    /// Recency of exact keys, for LRU eviction over the external store.
    recency: Mutex<LruCache<String, ()>>,
    /// Degraded-mode store, keyed by exact key.
    fallback_store: Mutex<LruCache<String, CacheEntry>>,
    degraded: AtomicBool,
    metrics: CacheMetrics,
}

impl ResponseCache {
    /// Create a cache over the given stores.
    pub fn new(
        config: CacheConfig,
        kv: Arc<dyn KvStore>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<EmbeddingMatcher>,
    ) -> Self {
        let max_size = config.max_size.max(1);
        let degraded_capacity = config.degraded_capacity.max(1);
        Self {
            config,
            kv,
            vectors,
            embedder,
            recency: Mutex::new(LruCache::new(max_size)),
            fallback_store: Mutex::new(LruCache::new(degraded_capacity)),
            degraded: AtomicBool::new(false),
            metrics: CacheMetrics::new(),
        }
    }

    /// Whether the cache has fallen back to the in-process store.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Lookup with the normal similarity threshold.
    pub async fn get(&self, query: &NormalizedQuery) -> Option<ClassificationResult> {
        self.get_with_threshold(query, self.config.similarity_threshold)
            .await
    }

    /// Lookup with the looser fallback threshold, used when the LLM failed.
    pub async fn get_fallback(&self, query: &NormalizedQuery) -> Option<ClassificationResult> {
        self.get_with_threshold(query, self.config.fallback_similarity_threshold)
            .await
    }

    async fn get_with_threshold(
        &self,
        query: &NormalizedQuery,
        threshold: f32,
    ) -> Option<ClassificationResult> {
        let started = Instant::now();
        let result = self.lookup(query, threshold).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Some(_) => self.metrics.record_hit(&query.text, latency_ms),
            None => self.metrics.record_miss(latency_ms),
        }
        result
    }

    async fn lookup(
        &self,
        query: &NormalizedQuery,
        threshold: f32,
    ) -> Option<ClassificationResult> {
        if query.is_empty() {
            return None;
        }
        let key = cache_exact_key(&digest(&query.text));
        let now = Utc::now().timestamp();

        // Tier one: exact key.
        if let Some(mut entry) = self.load_entry(&key).await {
            if entry.is_expired(now) {
                self.remove_entry(&key).await;
            } else {
                entry.hit_count += 1;
                let remaining = entry.stored_at + entry.ttl_seconds - now;
                self.store_entry(&key, &entry, remaining.max(1)).await;
                debug!(query = %query.text, "exact cache hit");
                return Some(entry.result);
            }
        }

        // Tier two: semantic similarity.
        let query_vector = self.embedder.encode_cached(&query.text).await.ok()?;
        if self.is_degraded() {
            return self.semantic_lookup_fallback(&query_vector, threshold, now);
        }

        let neighbors = match self.vectors.search(&query_vector, 3, threshold).await {
            Ok(neighbors) => neighbors,
            Err(e) => {
                warn!(error = %e, "vector store unreachable; cache degraded");
                self.degraded.store(true, Ordering::Relaxed);
                return self.semantic_lookup_fallback(&query_vector, threshold, now);
            }
        };

        for neighbor in neighbors {
            match self.load_entry(&neighbor.key).await {
                Some(entry) if !entry.is_expired(now) => {
                    debug!(
                        query = %query.text,
                        matched = %entry.normalized_query,
                        similarity = neighbor.similarity,
                        "semantic cache hit"
                    );
                    return Some(entry.result);
                }
                _ => {
                    // Stale index entry; clean it up opportunistically.
                    self.remove_entry(&neighbor.key).await;
                }
            }
        }
        None
    }

    fn semantic_lookup_fallback(
        &self,
        query_vector: &[f32],
        threshold: f32,
        now: i64,
    ) -> Option<ClassificationResult> {
        let mut store = self.fallback_store.lock();
        let mut best: Option<(String, f32)> = None;
        let mut expired = Vec::new();
        for (key, entry) in store.iter() {
            if entry.is_expired(now) {
                expired.push(key.clone());
                continue;
            }
            if entry.embedding.is_empty() {
                continue;
            }
            let similarity = dot(query_vector, &entry.embedding);
            if similarity >= threshold
                && best.as_ref().map(|(_, s)| similarity > *s).unwrap_or(true)
            {
                best = Some((key.clone(), similarity));
            }
        }
        for key in expired {
            store.remove(&key);
        }
        let (key, _) = best?;
        store.get(&key).map(|entry| entry.result.clone())
    }

    /// Store a result when it qualifies (confident enough, long enough).
    pub async fn set(&self, query: &NormalizedQuery, result: &ClassificationResult) -> bool {
        if result.confidence < self.config.min_confidence
            || query.token_count() < self.config.min_query_tokens
        {
            return false;
        }

        let embedding = match self.embedder.encode_cached(&query.text).await {
            Ok(vector) => vector.as_ref().clone(),
            Err(_) => Vec::new(),
        };

        let key = cache_exact_key(&digest(&query.text));
        let entry = CacheEntry {
            normalized_query: query.text.clone(),
            embedding,
            result: result.clone(),
            stored_at: Utc::now().timestamp(),
            ttl_seconds: self.config.ttl_seconds,
            hit_count: 0,
        };

        self.store_entry(&key, &entry, self.config.ttl_seconds)
            .await;

        if !self.is_degraded() {
            if !entry.embedding.is_empty() {
                if let Err(e) = self.vectors.add(&key, entry.embedding.clone()).await {
                    warn!(error = %e, "vector store write failed; cache degraded");
                    self.degraded.store(true, Ordering::Relaxed);
                }
            }
            // Track recency and evict the least recently used entry once
            // the cache is full.
            let evicted = self.recency.lock().insert(key.clone(), ());
            if let Some((old_key, _)) = evicted {
                self.remove_entry(&old_key).await;
            }
        }
        true
    }

    /// Drop the entry for a query, both tiers.
    pub async fn invalidate(&self, query: &NormalizedQuery) {
        let key = cache_exact_key(&digest(&query.text));
        self.remove_entry(&key).await;
        self.recency.lock().remove(&key);
    }

    /// Drop everything.
    pub async fn clear(&self) {
        if let Ok(keys) = self.kv.scan_prefix("cache:exact:").await {
            for key in keys {
                let _ = self.kv.delete(&key).await;
            }
        }
        let _ = self.vectors.clear().await;
        self.recency.lock().clear();
        self.fallback_store.lock().clear();
    }

    /// Metrics snapshot.
    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot(10, self.is_degraded())
    }

    async fn load_entry(&self, key: &str) -> Option<CacheEntry> {
        if self.is_degraded() {
            return self.fallback_store.lock().get(&key.to_string()).cloned();
        }
        match self.kv.get(key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "kv store unreachable; cache degraded");
                self.degraded.store(true, Ordering::Relaxed);
                self.fallback_store.lock().get(&key.to_string()).cloned()
            }
        }
    }

    async fn store_entry(&self, key: &str, entry: &CacheEntry, ttl_seconds: i64) {
        if !self.is_degraded() {
            let raw = match serde_json::to_string(entry) {
                Ok(raw) => raw,
                Err(_) => return,
            };
            let ttl = std::time::Duration::from_secs(ttl_seconds.max(1) as u64);
            match self.kv.set(key, &raw, Some(ttl)).await {
                Ok(()) => {}
                Err(e) => {
                    warn!(error = %e, "kv store write failed; cache degraded");
                    self.degraded.store(true, Ordering::Relaxed);
                }
            }
        }
        // The in-process store shadows writes so a later degradation still
        // has recent entries to serve.
        self.fallback_store
            .lock()
            .insert(key.to_string(), entry.clone());
    }

    async fn remove_entry(&self, key: &str) {
        let _ = self.kv.delete(key).await;
        let _ = self.vectors.remove(key).await;
        self.fallback_store.lock().remove(&key.to_string());
    }
}

fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
