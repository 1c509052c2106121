//! Hashed TF-IDF text encoder.
//!
//! The default in-process encoder: token tf-idf weights are folded into a
//! fixed-dimension vector by signed feature hashing, so the output
//! dimension is independent of vocabulary size and encoding is fully
//! deterministic (stable FNV-1a hashing, no random state).

use ahash::AHashMap;
use async_trait::async_trait;

use crate::analysis::normalizer::normalize_uncached;
use crate::error::Result;
use crate::util::l2_normalize;

use super::encoder::TextEncoder;

/// Default output dimension, matching the sentence-transformer models the
/// reference deployments use.
pub const DEFAULT_DIMENSION: usize = 384;

/// Deterministic hashed TF-IDF encoder.
#[derive(Debug)]
pub struct HashedTfIdfEncoder {
    dimension: usize,
    document_frequencies: AHashMap<String, usize>,
    total_documents: usize,
}

impl Default for HashedTfIdfEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashedTfIdfEncoder {
    /// Create an encoder with the given output dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
            document_frequencies: AHashMap::new(),
            total_documents: 0,
        }
    }

    /// Create and fit in one step.
    pub fn fitted(dimension: usize, documents: &[&str]) -> Self {
        let mut encoder = Self::new(dimension);
        encoder.fit(documents);
        encoder
    }

    /// Fit document frequencies on a corpus. Encoding works without
    /// fitting (every term then carries the default idf weight).
    pub fn fit(&mut self, documents: &[&str]) {
        self.total_documents = documents.len();
        for document in documents {
            let normalized = normalize_uncached(document);
            let mut seen = std::collections::HashSet::new();
            for token in normalized.tokens {
                if seen.insert(token.clone()) {
                    *self.document_frequencies.entry(token).or_insert(0) += 1;
                }
            }
        }
    }

    /// Whether `fit` has been called.
    pub fn is_fitted(&self) -> bool {
        self.total_documents > 0
    }

    fn idf(&self, token: &str) -> f32 {
        if self.total_documents == 0 {
            return 1.0;
        }
        let df = self.document_frequencies.get(token).copied().unwrap_or(0);
        (1.0 + self.total_documents as f32 / (1.0 + df as f32)).ln()
    }

    fn encode_sync(&self, text: &str) -> Vec<f32> {
        let normalized = normalize_uncached(text);

        let mut term_counts: AHashMap<&str, usize> = AHashMap::new();
        for token in &normalized.tokens {
            *term_counts.entry(token.as_str()).or_insert(0) += 1;
        }

        let mut vector = vec![0.0f32; self.dimension];
        let total_terms = normalized.tokens.len().max(1) as f32;
        for (token, count) in term_counts {
            let tf = count as f32 / total_terms;
            let weight = tf * self.idf(token);
            let hash = fnv1a64(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            // A second hash bit decides the sign, spreading collisions.
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign * weight;
        }

        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl TextEncoder for HashedTfIdfEncoder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.encode_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "hashed_tfidf"
    }
}

/// Stable 64-bit FNV-1a.
fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::dot;

    fn corpus() -> Vec<&'static str> {
        vec![
            "add this to my cart",
            "put in my basket",
            "show my cart",
            "track my order",
            "where is my order",
            "find red shoes",
            "search for sneakers",
        ]
    }

    #[tokio::test]
    async fn test_deterministic() {
        let encoder = HashedTfIdfEncoder::fitted(64, &corpus());
        let a = encoder.encode("find red shoes").await.unwrap();
        let b = encoder.encode("find red shoes").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_unit_length() {
        let encoder = HashedTfIdfEncoder::fitted(64, &corpus());
        let v = encoder.encode("track my order").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_similar_texts_score_higher() {
        let encoder = HashedTfIdfEncoder::fitted(128, &corpus());
        let query = encoder.encode("find red shoes").await.unwrap();
        let close = encoder.encode("red shoes please").await.unwrap();
        let far = encoder.encode("track my order").await.unwrap();

        assert!(dot(&query, &close) > dot(&query, &far));
    }

    #[tokio::test]
    async fn test_empty_text() {
        let encoder = HashedTfIdfEncoder::fitted(64, &corpus());
        let v = encoder.encode("").await.unwrap();
        assert_eq!(v.len(), 64);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_unfitted_still_encodes() {
        let encoder = HashedTfIdfEncoder::new(64);
        assert!(!encoder.is_fitted());
        let v = encoder.encode_sync("hello world");
        assert_eq!(v.len(), 64);
        assert!(v.iter().any(|x| *x != 0.0));
    }

    #[test]
    fn test_dimension_floor() {
        let encoder = HashedTfIdfEncoder::new(2);
        assert_eq!(encoder.dimension(), 8);
    }
}
