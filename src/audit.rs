//! Append-only audit log.
//!
//! Ambiguous and unclear outcomes, escalations, and worker failures each
//! leave a structured JSONL record for offline analysis. User input is
//! truncated to 200 characters before it is written.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::util::truncate_chars;

/// How many recent records stay queryable in memory.
const RECENT_CAPACITY: usize = 256;

/// Maximum characters of user input stored per record.
pub const MAX_QUERY_CHARS: usize = 200;

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    /// Record kind, e.g. `ambiguous`, `unclear`, `escalation`,
    /// `llm_failure`.
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// User input, truncated.
    pub query: String,
    /// Kind-specific structured detail.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl AuditRecord {
    /// Build a record with the input truncated.
    pub fn new(kind: impl Into<String>, query: &str, detail: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: kind.into(),
            request_id: None,
            query: truncate_chars(query, MAX_QUERY_CHARS),
            detail,
        }
    }

    /// Attach a request id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Append-only log with a small in-memory tail.
#[derive(Debug)]
pub struct AuditLog {
    path: Option<PathBuf>,
    recent: Mutex<VecDeque<AuditRecord>>,
}

impl AuditLog {
    /// Create a log; `None` keeps records in memory only (tests).
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// Append a record.
    pub fn record(&self, record: AuditRecord) {
        if let Some(path) = &self.path {
            if let Ok(line) = serde_json::to_string(&record) {
                let written = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .and_then(|mut file| writeln!(file, "{line}"));
                if let Err(e) = written {
                    warn!(error = %e, "could not append audit record");
                }
            }
        }

        let mut recent = self.recent.lock();
        if recent.len() >= RECENT_CAPACITY {
            recent.pop_front();
        }
        recent.push_back(record);
    }

    /// The most recent records, oldest first.
    pub fn recent(&self) -> Vec<AuditRecord> {
        self.recent.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_truncated() {
        let long = "x".repeat(500);
        let record = AuditRecord::new("ambiguous", &long, serde_json::Value::Null);
        assert_eq!(record.query.chars().count(), MAX_QUERY_CHARS);
    }

    #[test]
    fn test_record_and_recent() {
        let log = AuditLog::new(None);
        log.record(AuditRecord::new(
            "unclear",
            "what",
            serde_json::json!({"top_score": 0.2}),
        ));
        let recent = log.recent();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].kind, "unclear");
    }

    #[test]
    fn test_jsonl_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::new(Some(path.clone()));
        log.record(AuditRecord::new("ambiguous", "a", serde_json::Value::Null).with_request_id("r-1"));
        log.record(AuditRecord::new("escalation", "b", serde_json::Value::Null));

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 2);
        let first: AuditRecord = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(first.request_id.as_deref(), Some("r-1"));
    }
}
