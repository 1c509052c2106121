//! Embedding-based semantic matching stage.
//!
//! Reference vectors are derived from taxonomy example phrases on first
//! use (mean of encodings, unit-normalized). Initialization happens lazily
//! and blocks the first caller; a failed initialization flips a health
//! flag and the matcher degrades to returning nothing, which the decision
//! engine treats as "embedding unavailable".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::analysis::NormalizedQuery;
use crate::classify::types::{rank_candidates, Candidate, MatchSource};
use crate::error::{KestrelError, Result};
use crate::taxonomy::{ActionCode, Taxonomy};
use crate::util::{cosine_unit_rescaled, l2_normalize, LruCache};

use super::encoder::TextEncoder;

/// Default capacity of the query-embedding cache.
pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 512;

/// One action code and its unit-length reference vector.
#[derive(Debug)]
struct Reference {
    action_code: ActionCode,
    vector: Vec<f32>,
}

/// Precomputed reference set; all vectors share the encoder dimension.
#[derive(Debug)]
struct ReferenceSet {
    dimension: usize,
    references: Vec<Reference>,
}

/// The embedding matching stage.
pub struct EmbeddingMatcher {
    encoder: Arc<dyn TextEncoder>,
    taxonomy: Arc<Taxonomy>,
    references: OnceCell<Arc<ReferenceSet>>,
    init_failed: AtomicBool,
    query_cache: Mutex<LruCache<String, Arc<Vec<f32>>>>,
}

impl EmbeddingMatcher {
    /// Create a matcher; no encoding work happens until the first search.
    pub fn new(encoder: Arc<dyn TextEncoder>, taxonomy: Arc<Taxonomy>) -> Self {
        Self::with_cache_capacity(encoder, taxonomy, DEFAULT_QUERY_CACHE_CAPACITY)
    }

    /// Create a matcher with an explicit query-cache capacity (minimum 512).
    pub fn with_cache_capacity(
        encoder: Arc<dyn TextEncoder>,
        taxonomy: Arc<Taxonomy>,
        capacity: usize,
    ) -> Self {
        Self {
            encoder,
            taxonomy,
            references: OnceCell::new(),
            init_failed: AtomicBool::new(false),
            query_cache: Mutex::new(LruCache::new(capacity.max(512))),
        }
    }

    /// Whether the matcher is usable (encoder initialized or not yet tried).
    pub fn is_healthy(&self) -> bool {
        !self.init_failed.load(Ordering::Relaxed)
    }

    /// Whether reference vectors have been built.
    pub fn is_initialized(&self) -> bool {
        self.references.initialized()
    }

    /// Match a normalized query, returning up to `top_n` candidates with
    /// `source = embedding`, sorted descending. Returns an empty list when
    /// the encoder is unavailable.
    pub async fn search(&self, query: &NormalizedQuery, top_n: usize) -> Vec<Candidate> {
        if query.is_empty() || top_n == 0 || self.init_failed.load(Ordering::Relaxed) {
            return Vec::new();
        }

        let references = match self.references().await {
            Ok(refs) => refs,
            Err(e) => {
                warn!(error = %e, "embedding encoder initialization failed; matcher disabled");
                self.init_failed.store(true, Ordering::Relaxed);
                return Vec::new();
            }
        };

        let query_vector = match self.encode_cached(&query.text).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "query encoding failed");
                return Vec::new();
            }
        };

        let mut candidates: Vec<Candidate> = references
            .references
            .iter()
            .map(|reference| {
                let score = cosine_unit_rescaled(&query_vector, &reference.vector);
                Candidate::new(reference.action_code.clone(), score, MatchSource::Embedding)
            })
            .collect();
        candidates.sort_by(rank_candidates);
        candidates.truncate(top_n);
        candidates
    }

    /// Encode a normalized query through the bounded embedding cache.
    pub async fn encode_cached(&self, text: &str) -> Result<Arc<Vec<f32>>> {
        {
            let mut cache = self.query_cache.lock();
            if let Some(hit) = cache.get(&text.to_string()) {
                return Ok(Arc::clone(hit));
            }
        }

        let mut vector = self.encoder.encode(text).await?;
        if vector.len() != self.encoder.dimension() {
            return Err(KestrelError::encoder(format!(
                "encoder {} returned {} dims, expected {}",
                self.encoder.name(),
                vector.len(),
                self.encoder.dimension()
            )));
        }
        l2_normalize(&mut vector);
        let vector = Arc::new(vector);
        self.query_cache
            .lock()
            .insert(text.to_string(), Arc::clone(&vector));
        Ok(vector)
    }

    /// Number of cached query embeddings.
    pub fn query_cache_len(&self) -> usize {
        self.query_cache.lock().len()
    }

    async fn references(&self) -> Result<&Arc<ReferenceSet>> {
        self.references
            .get_or_try_init(|| self.build_references())
            .await
    }

    async fn build_references(&self) -> Result<Arc<ReferenceSet>> {
        let dimension = self.encoder.dimension();
        let mut references = Vec::with_capacity(self.taxonomy.len());

        for definition in self.taxonomy.definitions() {
            let mut mean = vec![0.0f32; dimension];
            let mut encoded = 0usize;
            for phrase in &definition.example_phrases {
                let vector = self.encoder.encode(phrase).await?;
                if vector.len() != dimension {
                    return Err(KestrelError::encoder(format!(
                        "reference vector for {} has {} dims, expected {dimension}",
                        definition.action_code,
                        vector.len()
                    )));
                }
                for (m, v) in mean.iter_mut().zip(vector.iter()) {
                    *m += v;
                }
                encoded += 1;
            }
            if encoded == 0 {
                continue;
            }
            for m in mean.iter_mut() {
                *m /= encoded as f32;
            }
            l2_normalize(&mut mean);
            references.push(Reference {
                action_code: definition.action_code.clone(),
                vector: mean,
            });
        }

        info!(
            references = references.len(),
            dimension,
            encoder = self.encoder.name(),
            "reference embeddings built"
        );
        Ok(Arc::new(ReferenceSet {
            dimension,
            references,
        }))
    }

    /// The encoder dimension once initialized, for diagnostics.
    pub async fn dimension(&self) -> Option<usize> {
        self.references.get().map(|r| r.dimension)
    }
}
