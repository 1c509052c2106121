//! Cost accounting, rate limiting, and spike detection for LLM usage.

pub mod rate_limiter;
pub mod spike;
pub mod usage;

pub use rate_limiter::RateLimiter;
pub use spike::{spawn_spike_scheduler, SpikeDetector, SpikeReport};
pub use usage::{PriceTable, UsageRecord, UsageTracker};
