//! The asynchronous escalation queue and its worker pool.
//!
//! Ambiguous queries are enqueued with a priority and processed by a
//! small pool of stateless workers. The queue guarantees FIFO ordering
//! within a priority, strict draining across priorities, at most one
//! lease per message, bounded retries with exponential delay, and a dead
//! letter queue once the retry budget is spent.

pub mod memory;
pub mod types;
pub mod worker;

pub use memory::MemoryQueue;
pub use types::{
    EscalationQueue, NackOutcome, QueueConfig, QueueMessage, QueuePayload, QueuePriority,
    QueueStats, RuleHint,
};
pub use worker::{WorkerDeps, WorkerPool};
