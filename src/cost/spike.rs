//! Cost spike detection.
//!
//! Compares today's spend against the trailing average and raises an
//! alert when it exceeds the configured factor. A scheduler task re-runs
//! the check every six hours.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::alerts::{AlertManager, Severity};

use super::usage::{DailySummary, UsageTracker};

/// Default multiple of the trailing average that counts as a spike.
pub const DEFAULT_SPIKE_FACTOR: f64 = 2.0;

/// How often the scheduler re-runs detection.
pub const DEFAULT_SCHEDULE_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Outcome of one detection pass.
#[derive(Debug, Clone, Serialize)]
pub struct SpikeReport {
    pub spike_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub today_cost: f64,
    pub average_cost: f64,
}

/// Detects unusual daily cost or token spikes.
#[derive(Debug, Clone)]
pub struct SpikeDetector {
    factor: f64,
}

impl Default for SpikeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SPIKE_FACTOR)
    }
}

impl SpikeDetector {
    /// Create a detector with the given threshold factor.
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }

    /// Analyze daily history (oldest first, today last). Needs at least
    /// two days to have a trailing average at all.
    pub fn detect(&self, history: &[DailySummary]) -> SpikeReport {
        if history.len() < 2 {
            return SpikeReport {
                spike_detected: false,
                reason: None,
                today_cost: history.last().map(|d| d.cost).unwrap_or(0.0),
                average_cost: 0.0,
            };
        }

        let today = &history[history.len() - 1];
        let past = &history[..history.len() - 1];
        let average_cost = past.iter().map(|d| d.cost).sum::<f64>() / past.len() as f64;
        let average_tokens = past.iter().map(|d| d.tokens as f64).sum::<f64>() / past.len() as f64;

        let cost_spike = today.cost > average_cost * self.factor;
        let token_spike = today.tokens as f64 > average_tokens * self.factor;

        let reason = (cost_spike || token_spike).then(|| {
            format!(
                "today's cost ${:.4} / tokens {} exceed {}x the trailing average (${:.4} / {:.0})",
                today.cost, today.tokens, self.factor, average_cost, average_tokens
            )
        });

        SpikeReport {
            spike_detected: reason.is_some(),
            reason,
            today_cost: today.cost,
            average_cost,
        }
    }
}

/// Spawn the periodic spike check. Exits when `shutdown` flips to true.
pub fn spawn_spike_scheduler(
    detector: SpikeDetector,
    usage: Arc<UsageTracker>,
    alerts: Arc<AlertManager>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "cost spike scheduler started");
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("spike scheduler stopping");
                        return;
                    }
                    continue;
                }
            }

            let report = detector.detect(&usage.daily_history());
            if report.spike_detected {
                let reason = report.reason.clone().unwrap_or_default();
                alerts.raise(Severity::Warning, "cost_spike", &reason).await;
            } else {
                debug!(today = report.today_cost, avg = report.average_cost, "no cost spike");
            }
        }
    })
}
