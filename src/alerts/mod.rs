//! Alert sink.
//!
//! Operational failures funnel through one manager. Errors and criticals
//! always escalate; infos and warnings only escalate once their error
//! kind crosses a per-kind frequency threshold inside a one-hour sliding
//! window. Escalation logs a structured record and optionally posts to a
//! webhook.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Per-kind counts required before a warning escalates.
#[derive(Debug, Clone)]
pub struct AlertThresholds {
    thresholds: AHashMap<String, usize>,
    default: usize,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        let mut thresholds = AHashMap::new();
        thresholds.insert("rate_limit".to_string(), 10);
        thresholds.insert("timeout".to_string(), 20);
        thresholds.insert("server_error".to_string(), 5);
        thresholds.insert("auth_error".to_string(), 1);
        thresholds.insert("context_length_exceeded".to_string(), 5);
        Self {
            thresholds,
            default: 15,
        }
    }
}

impl AlertThresholds {
    fn for_kind(&self, kind: &str) -> usize {
        self.thresholds.get(kind).copied().unwrap_or(self.default)
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    severity: Severity,
    kind: &'a str,
    message: &'a str,
    timestamp: chrono::DateTime<chrono::Utc>,
}

/// The process-wide alert manager.
#[derive(Debug)]
pub struct AlertManager {
    thresholds: AlertThresholds,
    window: Duration,
    events: Mutex<AHashMap<String, VecDeque<Instant>>>,
    webhook_url: Option<String>,
    http: reqwest::Client,
    raised_count: AtomicU64,
    escalated_count: AtomicU64,
}

impl AlertManager {
    /// Create a manager with default thresholds and a one-hour window.
    pub fn new(webhook_url: Option<String>) -> Self {
        Self::with_thresholds(webhook_url, AlertThresholds::default(), Duration::from_secs(3600))
    }

    /// Create a manager with explicit thresholds and window.
    pub fn with_thresholds(
        webhook_url: Option<String>,
        thresholds: AlertThresholds,
        window: Duration,
    ) -> Self {
        Self {
            thresholds,
            window,
            events: Mutex::new(AHashMap::new()),
            webhook_url,
            http: reqwest::Client::new(),
            raised_count: AtomicU64::new(0),
            escalated_count: AtomicU64::new(0),
        }
    }

    /// Report an event. Returns whether it escalated.
    pub async fn raise(&self, severity: Severity, kind: &str, message: &str) -> bool {
        self.raised_count.fetch_add(1, Ordering::Relaxed);
        let count = self.record_event(kind);

        let escalate = match severity {
            Severity::Error | Severity::Critical => true,
            Severity::Info | Severity::Warning => count >= self.thresholds.for_kind(kind),
        };

        if !escalate {
            info!(kind, count, %message, "alert suppressed below threshold");
            return false;
        }

        self.escalated_count.fetch_add(1, Ordering::Relaxed);
        match severity {
            Severity::Critical | Severity::Error => {
                error!(kind, severity = ?severity, %message, "alert escalated")
            }
            _ => warn!(kind, severity = ?severity, %message, "alert escalated"),
        }

        if let Some(url) = &self.webhook_url {
            let payload = WebhookPayload {
                severity,
                kind,
                message,
                timestamp: chrono::Utc::now(),
            };
            if let Err(e) = self.http.post(url).json(&payload).send().await {
                warn!(error = %e, "alert webhook delivery failed");
            }
        }
        true
    }

    /// Number of escalated alerts since startup.
    pub fn escalated(&self) -> u64 {
        self.escalated_count.load(Ordering::Relaxed)
    }

    /// Number of alerts raised (escalated or suppressed) since startup.
    pub fn raised(&self) -> u64 {
        self.raised_count.load(Ordering::Relaxed)
    }

    fn record_event(&self, kind: &str) -> usize {
        let now = Instant::now();
        let mut events = self.events.lock();
        let queue = events.entry(kind.to_string()).or_default();
        while queue
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            queue.pop_front();
        }
        queue.push_back(now);
        queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AlertManager {
        AlertManager::new(None)
    }

    #[tokio::test]
    async fn test_errors_always_escalate() {
        let alerts = manager();
        assert!(alerts.raise(Severity::Error, "server_error", "boom").await);
        assert!(alerts.raise(Severity::Critical, "auth_error", "bad key").await);
        assert_eq!(alerts.escalated(), 2);
    }

    #[tokio::test]
    async fn test_warnings_suppressed_below_threshold() {
        let alerts = manager();
        // server_error threshold is 5.
        for _ in 0..4 {
            assert!(!alerts.raise(Severity::Warning, "server_error", "5xx").await);
        }
        assert!(alerts.raise(Severity::Warning, "server_error", "5xx").await);
    }

    #[tokio::test]
    async fn test_auth_warning_escalates_immediately() {
        let alerts = manager();
        assert!(alerts.raise(Severity::Warning, "auth_error", "401").await);
    }

    #[tokio::test]
    async fn test_unknown_kind_uses_default_threshold() {
        let alerts = manager();
        for _ in 0..14 {
            assert!(!alerts.raise(Severity::Warning, "surprise", "?").await);
        }
        assert!(alerts.raise(Severity::Warning, "surprise", "?").await);
    }

    #[tokio::test]
    async fn test_window_expiry_resets_counts() {
        let alerts = AlertManager::with_thresholds(
            None,
            AlertThresholds::default(),
            Duration::from_millis(20),
        );
        assert!(!alerts.raise(Severity::Warning, "timeout", "slow").await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        // The earlier event aged out, so the count restarts at one.
        assert!(!alerts.raise(Severity::Warning, "timeout", "slow").await);
    }
}
