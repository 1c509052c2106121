//! Sliding-window rate limiter for LLM calls.
//!
//! One process-wide instance gates every contender; `allow` must return
//! true before any network call is placed.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Sliding-window limiter: at most `max_calls` within `window`.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter; defaults in deployments are 60 calls per 60 s.
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Try to take a slot. Returns false when the window is full.
    pub fn allow(&self) -> bool {
        let now = Instant::now();
        let mut calls = self.calls.lock();
        while calls
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            calls.pop_front();
        }
        if calls.len() < self.max_calls {
            calls.push_back(now);
            true
        } else {
            false
        }
    }

    /// Calls currently counted in the window.
    pub fn in_flight(&self) -> usize {
        let now = Instant::now();
        let mut calls = self.calls.lock();
        while calls
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            calls.pop_front();
        }
        calls.len()
    }
}
