//! Storage abstractions.
//!
//! The cache, queue, and status store all sit on top of two pluggable
//! interfaces: a TTL-aware key-value store and a vector index. Production
//! deployments back these with external services; the in-process
//! implementations here double as the degraded-mode fallback and the test
//! substrate.

pub mod kv;
pub mod memory;
pub mod vector;

pub use kv::KvStore;
pub use memory::{MemoryKv, MemoryVectorIndex};
pub use vector::VectorIndex;

/// Key prefix helpers shared by every store client, so namespaces cannot
/// collide in a shared backing store.
pub fn queue_key(prefix: &str, queue: &str) -> String {
    format!("{prefix}:queue:{queue}")
}

/// Exact-tier cache key for a normalized query digest.
pub fn cache_exact_key(digest: &str) -> String {
    format!("cache:exact:{digest}")
}

/// Status-store key for a request id.
pub fn status_key(prefix: &str, request_id: &str) -> String {
    format!("{prefix}:status:{request_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        assert_eq!(queue_key("kestrel", "ambiguous"), "kestrel:queue:ambiguous");
        assert_eq!(cache_exact_key("abc123"), "cache:exact:abc123");
        assert_eq!(status_key("kestrel", "r-1"), "kestrel:status:r-1");
    }
}
