//! The key-value store abstraction.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// A TTL-aware key-value store.
///
/// Values are opaque strings (callers serialize JSON). Implementations
/// must treat expired entries as absent on read.
#[async_trait]
pub trait KvStore: Send + Sync + std::fmt::Debug {
    /// Fetch a value, or `None` when missing or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, optionally with a time-to-live.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Delete a key; returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// List live keys with the given prefix.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Liveness probe; an error marks the store unreachable.
    async fn ping(&self) -> Result<()>;
}
