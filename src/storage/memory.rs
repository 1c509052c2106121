//! In-process store implementations.
//!
//! These back tests and the degraded mode that kicks in when the external
//! stores are unreachable. Semantics match the external implementations:
//! TTL expiry on read, prefix scans, cosine search over unit vectors.

use std::time::{Duration, Instant};

use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::util::dot;

use super::kv::KvStore;
use super::vector::{Neighbor, VectorIndex};

#[derive(Debug, Clone)]
struct KvEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl KvEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Mutex-protected map with per-entry deadlines.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<AHashMap<String, KvEntry>>,
}

impl MemoryKv {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries (expired entries are purged first).
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| !entry.is_expired(now));
        entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let entry = KvEntry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| !entry.is_expired(now));
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Brute-force cosine index over unit vectors.
#[derive(Debug, Default)]
pub struct MemoryVectorIndex {
    vectors: Mutex<AHashMap<String, Vec<f32>>>,
}

impl MemoryVectorIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn add(&self, key: &str, vector: Vec<f32>) -> Result<()> {
        self.vectors.lock().insert(key.to_string(), vector);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.vectors.lock().remove(key).is_some())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<Neighbor>> {
        let vectors = self.vectors.lock();
        let mut neighbors: Vec<Neighbor> = vectors
            .iter()
            .map(|(key, stored)| Neighbor {
                key: key.clone(),
                similarity: dot(vector, stored),
            })
            .filter(|n| n.similarity >= min_similarity)
            .collect();
        neighbors.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        neighbors.truncate(top_k);
        Ok(neighbors)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.vectors.lock().len())
    }

    async fn clear(&self) -> Result<()> {
        self.vectors.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_kv_set_get_delete() {
        let kv = MemoryKv::new();
        kv.set("a", "1", None).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some("1".to_string()));
        assert!(kv.delete("a").await.unwrap());
        assert!(!kv.delete("a").await.unwrap());
        assert_eq!(kv.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_kv_ttl_expiry() {
        let kv = MemoryKv::new();
        kv.set("a", "1", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert!(kv.get("a").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(kv.get("a").await.unwrap(), None);
        assert_eq!(kv.len(), 0);
    }

    #[tokio::test]
    async fn test_kv_scan_prefix() {
        let kv = MemoryKv::new();
        kv.set("ns:a", "1", None).await.unwrap();
        kv.set("ns:b", "2", None).await.unwrap();
        kv.set("other:c", "3", None).await.unwrap();

        let keys = kv.scan_prefix("ns:").await.unwrap();
        assert_eq!(keys, vec!["ns:a".to_string(), "ns:b".to_string()]);
    }

    #[tokio::test]
    async fn test_vector_search_order_and_threshold() {
        let index = MemoryVectorIndex::new();
        index.add("x", vec![1.0, 0.0]).await.unwrap();
        index.add("y", vec![0.0, 1.0]).await.unwrap();
        index
            .add("xy", vec![0.7071, 0.7071])
            .await
            .unwrap();

        let neighbors = index.search(&[1.0, 0.0], 10, 0.5).await.unwrap();
        let keys: Vec<_> = neighbors.iter().map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["x", "xy"]);

        let neighbors = index.search(&[1.0, 0.0], 1, 0.0).await.unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].key, "x");
    }

    #[tokio::test]
    async fn test_vector_remove_and_clear() {
        let index = MemoryVectorIndex::new();
        index.add("x", vec![1.0]).await.unwrap();
        assert!(index.remove("x").await.unwrap());
        assert!(!index.remove("x").await.unwrap());

        index.add("y", vec![1.0]).await.unwrap();
        index.clear().await.unwrap();
        assert_eq!(index.len().await.unwrap(), 0);
    }
}
