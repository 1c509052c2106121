//! Per-request status tracking.
//!
//! Every asynchronous escalation gets a status record clients can poll.
//! Records live in the key-value store with a one-hour TTL from their
//! last update; state transitions are monotonic and updates replace the
//! whole record so readers never observe a partial write.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classify::ClassificationResult;
use crate::error::Result;
use crate::storage::{status_key, KvStore};
use crate::util::LruCache;

/// Default record TTL.
pub const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(60 * 60);

/// Capacity of the degraded in-process store.
const FALLBACK_CAPACITY: usize = 4_096;

/// Lifecycle state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl RequestState {
    /// Monotonic ordering of the lifecycle.
    fn stage(&self) -> u8 {
        match self {
            RequestState::Queued => 0,
            RequestState::Processing => 1,
            RequestState::Completed | RequestState::Failed => 2,
        }
    }
}

/// Token and cost usage attached to a completed request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost: f64,
}

/// A pollable status record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStatus {
    pub request_id: String,
    pub state: RequestState,
    /// Non-technical message for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Final result for completed requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ClassificationResult>,
    /// Usage accounting for LLM-served requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RequestStatus {
    /// A fresh QUEUED record.
    pub fn queued(request_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            request_id: request_id.into(),
            state: RequestState::Queued,
            message: None,
            result: None,
            usage: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Status store over the key-value abstraction, with an in-process
/// fallback when the store is unreachable.
#[derive(Debug)]
pub struct StatusStore {
    kv: Arc<dyn KvStore>,
    prefix: String,
    ttl: Duration,
    degraded: AtomicBool,
    fallback: Mutex<LruCache<String, RequestStatus>>,
}

impl StatusStore {
    /// Create a store with the default TTL.
    pub fn new(kv: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        Self::with_ttl(kv, prefix, DEFAULT_STATUS_TTL)
    }

    /// Create a store with an explicit TTL.
    pub fn with_ttl(kv: Arc<dyn KvStore>, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
            ttl,
            degraded: AtomicBool::new(false),
            fallback: Mutex::new(LruCache::new(FALLBACK_CAPACITY)),
        }
    }

    /// Whether the store fell back to the in-process map.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Write a whole record (TTL restarts from now).
    pub async fn set(&self, status: &RequestStatus) -> Result<()> {
        let key = status_key(&self.prefix, &status.request_id);
        let raw = serde_json::to_string(status)?;
        if !self.is_degraded() {
            match self.kv.set(&key, &raw, Some(self.ttl)).await {
                Ok(()) => {}
                Err(e) => {
                    warn!(error = %e, "status store unreachable; using in-process fallback");
                    self.degraded.store(true, Ordering::Relaxed);
                }
            }
        }
        self.fallback
            .lock()
            .insert(status.request_id.clone(), status.clone());
        Ok(())
    }

    /// Read a record; expired or unknown ids return `None`.
    pub async fn get(&self, request_id: &str) -> Result<Option<RequestStatus>> {
        if self.is_degraded() {
            return Ok(self.fallback.lock().get(&request_id.to_string()).cloned());
        }
        let key = status_key(&self.prefix, request_id);
        match self.kv.get(&key).await {
            Ok(Some(raw)) => Ok(serde_json::from_str(&raw).ok()),
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(error = %e, "status store unreachable; using in-process fallback");
                self.degraded.store(true, Ordering::Relaxed);
                Ok(self.fallback.lock().get(&request_id.to_string()).cloned())
            }
        }
    }

    /// Transition a request to a new state, updating fields atomically.
    /// Backward transitions are rejected silently (the record keeps its
    /// later state), preserving monotonicity under racing writers.
    pub async fn transition(
        &self,
        request_id: &str,
        state: RequestState,
        message: Option<String>,
        result: Option<ClassificationResult>,
        usage: Option<UsageSummary>,
    ) -> Result<()> {
        let Some(mut status) = self.get(request_id).await? else {
            return Ok(());
        };
        if state.stage() < status.state.stage() {
            warn!(
                request_id,
                from = ?status.state,
                to = ?state,
                "ignoring backward status transition"
            );
            return Ok(());
        }
        status.state = state;
        if message.is_some() {
            status.message = message;
        }
        if result.is_some() {
            status.result = result;
        }
        if usage.is_some() {
            status.usage = usage;
        }
        status.updated_at = Utc::now();
        self.set(&status).await
    }

    /// Mark a request completed with its result.
    pub async fn complete(
        &self,
        request_id: &str,
        result: ClassificationResult,
        usage: Option<UsageSummary>,
    ) -> Result<()> {
        self.transition(request_id, RequestState::Completed, None, Some(result), usage)
            .await
    }

    /// Mark a request failed with a non-technical message.
    pub async fn fail(&self, request_id: &str, message: impl Into<String>) -> Result<()> {
        self.transition(request_id, RequestState::Failed, Some(message.into()), None, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{MatchSource, ResultStatus};
    use crate::storage::MemoryKv;
    use crate::taxonomy::ActionCode;

    fn store() -> StatusStore {
        StatusStore::new(Arc::new(MemoryKv::new()), "kestrel")
    }

    fn result() -> ClassificationResult {
        ClassificationResult::new(
            ActionCode::from("SEARCH_PRODUCT"),
            0.9,
            ResultStatus::LlmClassification,
            MatchSource::Llm,
        )
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let store = store();
        store.set(&RequestStatus::queued("r-1")).await.unwrap();

        let status = store.get("r-1").await.unwrap().unwrap();
        assert_eq!(status.state, RequestState::Queued);

        store
            .transition("r-1", RequestState::Processing, None, None, None)
            .await
            .unwrap();
        assert_eq!(
            store.get("r-1").await.unwrap().unwrap().state,
            RequestState::Processing
        );

        store.complete("r-1", result(), None).await.unwrap();
        let status = store.get("r-1").await.unwrap().unwrap();
        assert_eq!(status.state, RequestState::Completed);
        assert!(status.result.is_some());
    }

    #[tokio::test]
    async fn test_backward_transition_ignored() {
        let store = store();
        store.set(&RequestStatus::queued("r-1")).await.unwrap();
        store.complete("r-1", result(), None).await.unwrap();

        store
            .transition("r-1", RequestState::Processing, None, None, None)
            .await
            .unwrap();
        assert_eq!(
            store.get("r-1").await.unwrap().unwrap().state,
            RequestState::Completed
        );
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let store = store();
        assert!(store.get("missing").await.unwrap().is_none());
        // Transitioning a missing record is a no-op.
        store.fail("missing", "nope").await.unwrap();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = StatusStore::with_ttl(
            Arc::new(MemoryKv::new()),
            "kestrel",
            Duration::from_millis(10),
        );
        store.set(&RequestStatus::queued("r-1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.get("r-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fail_sets_message() {
        let store = store();
        store.set(&RequestStatus::queued("r-1")).await.unwrap();
        store
            .fail("r-1", "We could not process your request.")
            .await
            .unwrap();
        let status = store.get("r-1").await.unwrap().unwrap();
        assert_eq!(status.state, RequestState::Failed);
        assert_eq!(
            status.message.as_deref(),
            Some("We could not process your request.")
        );
    }
}
