//! Queue message types and the queue abstraction.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ContextSnapshot;
use crate::error::Result;
use crate::taxonomy::ActionCode;

/// Message priority. Lower levels drain first; the wire format carries
/// the numeric level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueuePriority {
    High,
    Normal,
    Low,
}

impl QueuePriority {
    /// Numeric level: HIGH=1, NORMAL=5, LOW=10.
    pub fn level(&self) -> u8 {
        match self {
            QueuePriority::High => 1,
            QueuePriority::Normal => 5,
            QueuePriority::Low => 10,
        }
    }

    /// Parse a numeric level; unknown levels land on NORMAL.
    pub fn from_level(level: u8) -> Self {
        match level {
            0..=1 => QueuePriority::High,
            2..=5 => QueuePriority::Normal,
            _ => QueuePriority::Low,
        }
    }
}

impl Serialize for QueuePriority {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.level())
    }
}

impl<'de> Deserialize<'de> for QueuePriority {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let level = u8::deserialize(deserializer)?;
        Ok(QueuePriority::from_level(level))
    }
}

/// The rule-based result that accompanied an escalation, as a hint for
/// the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleHint {
    pub action_code: ActionCode,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_best_confidence: Option<f32>,
}

/// What a worker needs to process an escalated query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePayload {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_based_hint: Option<RuleHint>,
    #[serde(default)]
    pub context_snapshot: ContextSnapshot,
}

/// One queued escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Unique request id, also the status-store key.
    pub request_id: String,
    pub created_at: DateTime<Utc>,
    pub priority: QueuePriority,
    pub payload: QueuePayload,
    /// How many times processing has failed so far.
    pub attempt_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Queue tuning knobs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Failed processing attempts allowed before dead-lettering.
    pub max_retries: u32,
    /// Base delay before a nacked message is retried; doubles per attempt.
    pub retry_delay: Duration,
    /// How long a lease lasts before the message re-queues.
    pub visibility_timeout: Duration,
    /// Messages older than this are dead-lettered instead of delivered.
    pub message_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            visibility_timeout: Duration::from_secs(30),
            message_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Result of a negative acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// The message will be retried after the given delay.
    Retrying(Duration),
    /// The retry budget is spent; the message moved to the dead letter
    /// queue and its request was failed.
    DeadLettered,
}

/// Depth and throughput counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub ready: usize,
    pub delayed: usize,
    pub leased: usize,
    pub dead: usize,
    pub completed: u64,
    pub failed: u64,
}

/// The escalation queue abstraction.
#[async_trait]
pub trait EscalationQueue: Send + Sync {
    /// Assign a fresh request id, persist the message, create its QUEUED
    /// status record, and return the id.
    async fn enqueue(&self, payload: QueuePayload, priority: QueuePriority) -> Result<String>;

    /// Atomically lease the highest-priority oldest message, waiting up
    /// to `timeout`. Returns `None` on timeout. An unacknowledged lease
    /// re-queues after the visibility window.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueueMessage>>;

    /// Complete a leased message.
    async fn acknowledge(&self, message: &QueueMessage) -> Result<()>;

    /// Fail a leased message; retries with exponential delay until the
    /// budget is spent, then dead-letters.
    async fn nack(&self, message: &QueueMessage, error: &str) -> Result<NackOutcome>;

    /// Current depth counters.
    async fn stats(&self) -> Result<QueueStats>;

    /// Snapshot of the dead letter queue, oldest first.
    async fn dead_letters(&self) -> Result<Vec<QueueMessage>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_levels() {
        assert_eq!(QueuePriority::High.level(), 1);
        assert_eq!(QueuePriority::Normal.level(), 5);
        assert_eq!(QueuePriority::Low.level(), 10);
    }

    #[test]
    fn test_priority_serde_round_trip() {
        for priority in [QueuePriority::High, QueuePriority::Normal, QueuePriority::Low] {
            let json = serde_json::to_string(&priority).unwrap();
            let back: QueuePriority = serde_json::from_str(&json).unwrap();
            assert_eq!(back, priority);
        }
        assert_eq!(serde_json::to_string(&QueuePriority::High).unwrap(), "1");
    }

    #[test]
    fn test_message_wire_format() {
        let message = QueueMessage {
            request_id: "r-1".to_string(),
            created_at: Utc::now(),
            priority: QueuePriority::Normal,
            payload: QueuePayload {
                query: "add shoes and track my order".to_string(),
                rule_based_hint: Some(RuleHint {
                    action_code: ActionCode::from("ADD_TO_CART"),
                    confidence: 0.55,
                    next_best_confidence: Some(0.53),
                }),
                context_snapshot: ContextSnapshot::default(),
            },
            attempt_count: 0,
            last_error: None,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["priority"], 5);
        assert_eq!(json["payload"]["query"], "add shoes and track my order");

        let back: QueueMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back.request_id, "r-1");
        assert_eq!(back.priority, QueuePriority::Normal);
    }
}
