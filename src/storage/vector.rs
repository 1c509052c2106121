//! The vector index abstraction used by the semantic cache tier.

use async_trait::async_trait;

use crate::error::Result;

/// A scored neighbor from a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// The stored key.
    pub key: String,
    /// Raw cosine similarity in [-1, 1] (vectors are unit length).
    pub similarity: f32,
}

/// A store of unit vectors searchable by cosine similarity.
#[async_trait]
pub trait VectorIndex: Send + Sync + std::fmt::Debug {
    /// Insert or replace a vector under a key.
    async fn add(&self, key: &str, vector: Vec<f32>) -> Result<()>;

    /// Remove a key; returns whether it existed.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Return up to `top_k` neighbors with similarity ≥ `min_similarity`,
    /// best first.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<Neighbor>>;

    /// Number of stored vectors.
    async fn len(&self) -> Result<usize>;

    /// Drop everything.
    async fn clear(&self) -> Result<()>;
}
