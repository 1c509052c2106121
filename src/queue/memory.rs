//! In-process priority queue implementation.
//!
//! Ready messages sit in a `BTreeMap` keyed by (priority level, creation
//! time, sequence), which gives strict priority draining and FIFO within
//! a priority for free. Leases are implicit: a dequeued message carries a
//! deadline and re-enters the ready set if it is neither acknowledged
//! nor nacked in time. The mutex is never held across an await.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{KestrelError, Result};
use crate::status::{RequestStatus, StatusStore};

use super::types::{
    EscalationQueue, NackOutcome, QueueConfig, QueueMessage, QueuePayload, QueuePriority,
    QueueStats,
};

/// Poll granularity while a dequeue waits for work.
const DEQUEUE_TICK: Duration = Duration::from_millis(50);

type ReadyKey = (u8, i64, u64);

#[derive(Debug)]
struct Lease {
    message: QueueMessage,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    ready: BTreeMap<ReadyKey, QueueMessage>,
    delayed: Vec<(Instant, QueueMessage)>,
    leased: AHashMap<String, Lease>,
    dead: VecDeque<QueueMessage>,
    seq: u64,
    completed: u64,
    failed: u64,
}

/// The in-process escalation queue.
pub struct MemoryQueue {
    config: QueueConfig,
    status: Arc<StatusStore>,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl MemoryQueue {
    /// Create a queue that records request statuses in the given store.
    pub fn new(config: QueueConfig, status: Arc<StatusStore>) -> Self {
        Self {
            config,
            status,
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
        }
    }

    /// Move due delayed messages and expired leases back into the ready
    /// set. Returns expired messages that outlived their TTL, for status
    /// failure outside the lock.
    fn promote(&self, inner: &mut Inner) -> Vec<QueueMessage> {
        let now = Instant::now();

        let mut due = Vec::new();
        inner.delayed.retain_mut(|(ready_at, message)| {
            if *ready_at <= now {
                due.push(message.clone());
                false
            } else {
                true
            }
        });
        for message in due {
            Self::insert_ready(inner, message);
        }

        let expired_leases: Vec<String> = inner
            .leased
            .iter()
            .filter(|(_, lease)| lease.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired_leases {
            if let Some(lease) = inner.leased.remove(&id) {
                debug!(request_id = %id, "lease expired; re-queueing message");
                Self::insert_ready(inner, lease.message);
            }
        }

        // Drop messages that aged past their TTL before delivery.
        let ttl = chrono::Duration::from_std(self.config.message_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        let cutoff = Utc::now() - ttl;
        let expired_keys: Vec<ReadyKey> = inner
            .ready
            .iter()
            .filter(|(_, message)| message.created_at < cutoff)
            .map(|(key, _)| *key)
            .collect();
        let mut ttl_expired = Vec::new();
        for key in expired_keys {
            if let Some(mut message) = inner.ready.remove(&key) {
                message.last_error = Some("message expired before processing".to_string());
                inner.failed += 1;
                inner.dead.push_back(message.clone());
                ttl_expired.push(message);
            }
        }
        ttl_expired
    }

    fn insert_ready(inner: &mut Inner, message: QueueMessage) {
        let key = (
            message.priority.level(),
            message.created_at.timestamp_micros(),
            inner.seq,
        );
        inner.seq += 1;
        inner.ready.insert(key, message);
    }
}

#[async_trait]
impl EscalationQueue for MemoryQueue {
    async fn enqueue(&self, payload: QueuePayload, priority: QueuePriority) -> Result<String> {
        let request_id = Uuid::new_v4().to_string();
        let message = QueueMessage {
            request_id: request_id.clone(),
            created_at: Utc::now(),
            priority,
            payload,
            attempt_count: 0,
            last_error: None,
        };

        {
            let mut inner = self.inner.lock();
            Self::insert_ready(&mut inner, message);
        }
        self.status.set(&RequestStatus::queued(&request_id)).await?;
        self.notify.notify_one();

        debug!(request_id = %request_id, level = priority.level(), "escalation enqueued");
        Ok(request_id)
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueueMessage>> {
        let deadline = Instant::now() + timeout;
        loop {
            let (leased, ttl_expired) = {
                let mut inner = self.inner.lock();
                let ttl_expired = self.promote(&mut inner);

                let leased = inner.ready.keys().next().copied().map(|key| {
                    let message = inner.ready.remove(&key).expect("key just observed");
                    inner.leased.insert(
                        message.request_id.clone(),
                        Lease {
                            message: message.clone(),
                            deadline: Instant::now() + self.config.visibility_timeout,
                        },
                    );
                    message
                });
                (leased, ttl_expired)
            };

            for expired in ttl_expired {
                let _ = self
                    .status
                    .fail(&expired.request_id, "Your request expired before processing.")
                    .await;
            }

            if let Some(message) = leased {
                return Ok(Some(message));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let wait = remaining.min(DEQUEUE_TICK);
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn acknowledge(&self, message: &QueueMessage) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.leased.remove(&message.request_id).is_none() {
            return Err(KestrelError::queue(format!(
                "acknowledge for unleased message {}",
                message.request_id
            )));
        }
        inner.completed += 1;
        Ok(())
    }

    async fn nack(&self, message: &QueueMessage, error: &str) -> Result<NackOutcome> {
        let outcome = {
            let mut inner = self.inner.lock();
            if inner.leased.remove(&message.request_id).is_none() {
                return Err(KestrelError::queue(format!(
                    "nack for unleased message {}",
                    message.request_id
                )));
            }

            let mut retried = message.clone();
            retried.attempt_count += 1;
            retried.last_error = Some(error.to_string());

            if retried.attempt_count > self.config.max_retries {
                warn!(
                    request_id = %retried.request_id,
                    attempts = retried.attempt_count,
                    "retry budget spent; dead-lettering"
                );
                inner.failed += 1;
                inner.dead.push_back(retried);
                NackOutcome::DeadLettered
            } else {
                let exponent = retried.attempt_count.saturating_sub(1).min(16);
                let delay = self.config.retry_delay * 2u32.pow(exponent);
                inner.delayed.push((Instant::now() + delay, retried));
                NackOutcome::Retrying(delay)
            }
        };

        if outcome == NackOutcome::DeadLettered {
            self.status
                .fail(
                    &message.request_id,
                    "We could not process your request. Please try again.",
                )
                .await?;
        }
        self.notify.notify_one();
        Ok(outcome)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let inner = self.inner.lock();
        Ok(QueueStats {
            ready: inner.ready.len(),
            delayed: inner.delayed.len(),
            leased: inner.leased.len(),
            dead: inner.dead.len(),
            completed: inner.completed,
            failed: inner.failed,
        })
    }

    async fn dead_letters(&self) -> Result<Vec<QueueMessage>> {
        Ok(self.inner.lock().dead.iter().cloned().collect())
    }
}
