//! Token and cost accounting.
//!
//! Every LLM call appends a record to a JSONL log and updates in-memory
//! daily/monthly aggregates. Costs come from a per-model price table.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// USD per 1000 tokens, by model. Unknown models fall back to the
/// cheapest entry.
#[derive(Debug, Clone)]
pub struct PriceTable {
    prices: BTreeMap<String, f64>,
    fallback: f64,
}

impl Default for PriceTable {
    fn default() -> Self {
        let mut prices = BTreeMap::new();
        prices.insert("gpt-4o-mini".to_string(), 0.005);
        prices.insert("gpt-4-turbo".to_string(), 0.01);
        prices.insert("gpt-3.5-turbo".to_string(), 0.0015);
        Self {
            prices,
            fallback: 0.0015,
        }
    }
}

impl PriceTable {
    /// Cost in dollars for a token count under a model.
    pub fn cost(&self, model: &str, total_tokens: u64) -> f64 {
        let per_thousand = self.prices.get(model).copied().unwrap_or(self.fallback);
        total_tokens as f64 / 1000.0 * per_thousand
    }
}

/// One appended usage record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost: f64,
    pub latency_ms: f64,
}

/// Aggregate for one day or month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageAggregate {
    pub tokens: u64,
    pub cost: f64,
    pub requests: u64,
}

/// Daily summary row used by the spike detector.
#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub date: String,
    pub tokens: u64,
    pub cost: f64,
}

#[derive(Debug, Default)]
struct Aggregates {
    daily: BTreeMap<String, UsageAggregate>,
    monthly: BTreeMap<String, UsageAggregate>,
}

/// Appends usage records and keeps rolling aggregates.
#[derive(Debug)]
pub struct UsageTracker {
    prices: PriceTable,
    log_path: Option<PathBuf>,
    aggregates: Mutex<Aggregates>,
}

impl UsageTracker {
    /// Create a tracker; `log_path` of `None` keeps accounting in memory
    /// only (tests).
    pub fn new(prices: PriceTable, log_path: Option<PathBuf>) -> Self {
        Self {
            prices,
            log_path,
            aggregates: Mutex::new(Aggregates::default()),
        }
    }

    /// Record one call; returns the computed cost.
    pub fn record(
        &self,
        model: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
        latency_ms: f64,
    ) -> f64 {
        let total = prompt_tokens as u64 + completion_tokens as u64;
        let cost = self.prices.cost(model, total);
        let now = Utc::now();

        let record = UsageRecord {
            timestamp: now,
            model: model.to_string(),
            prompt_tokens,
            completion_tokens,
            cost,
            latency_ms,
        };
        self.append_log(&record);

        let day = now.format("%Y-%m-%d").to_string();
        let month = now.format("%Y-%m").to_string();
        let mut guard = self.aggregates.lock();
        let aggregates = &mut *guard;
        for (key, map) in [
            (day, &mut aggregates.daily),
            (month, &mut aggregates.monthly),
        ] {
            let entry = map.entry(key).or_default();
            entry.tokens += total;
            entry.cost += cost;
            entry.requests += 1;
        }
        cost
    }

    /// Projected cost of a call before placing it, for the budget guard.
    pub fn projected_cost(&self, model: &str, projected_tokens: u64) -> f64 {
        self.prices.cost(model, projected_tokens)
    }

    /// Today's aggregate.
    pub fn today(&self) -> UsageAggregate {
        let day = Utc::now().format("%Y-%m-%d").to_string();
        self.aggregates
            .lock()
            .daily
            .get(&day)
            .cloned()
            .unwrap_or_default()
    }

    /// This month's aggregate.
    pub fn this_month(&self) -> UsageAggregate {
        let month = Utc::now().format("%Y-%m").to_string();
        self.aggregates
            .lock()
            .monthly
            .get(&month)
            .cloned()
            .unwrap_or_default()
    }

    /// Daily history, oldest first, for spike detection.
    pub fn daily_history(&self) -> Vec<DailySummary> {
        self.aggregates
            .lock()
            .daily
            .iter()
            .map(|(date, aggregate)| DailySummary {
                date: date.clone(),
                tokens: aggregate.tokens,
                cost: aggregate.cost,
            })
            .collect()
    }

    fn append_log(&self, record: &UsageRecord) {
        let Some(path) = &self.log_path else {
            return;
        };
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(_) => return,
        };
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(e) = written {
            warn!(error = %e, "could not append usage record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_table() {
        let prices = PriceTable::default();
        assert!((prices.cost("gpt-4-turbo", 1000) - 0.01).abs() < 1e-9);
        // Unknown model falls back to the cheapest price.
        assert!((prices.cost("mystery", 1000) - 0.0015).abs() < 1e-9);
    }

    #[test]
    fn test_record_aggregates() {
        let tracker = UsageTracker::new(PriceTable::default(), None);
        tracker.record("gpt-4o-mini", 200, 100, 120.0);
        tracker.record("gpt-4o-mini", 100, 50, 80.0);

        let today = tracker.today();
        assert_eq!(today.requests, 2);
        assert_eq!(today.tokens, 450);
        assert!(today.cost > 0.0);

        let month = tracker.this_month();
        assert_eq!(month.requests, 2);
    }

    #[test]
    fn test_log_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.jsonl");
        let tracker = UsageTracker::new(PriceTable::default(), Some(path.clone()));
        tracker.record("gpt-4o-mini", 10, 5, 42.0);
        tracker.record("gpt-4o-mini", 20, 10, 17.0);

        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let record: UsageRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(record.prompt_tokens, 10);
    }
}
