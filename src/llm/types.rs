//! Types shared across the LLM path.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entities::Entities;
use crate::taxonomy::ActionCode;

/// Classified failure modes of an LLM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmErrorKind {
    Timeout,
    RateLimit,
    ServerError,
    AuthError,
    ContextLengthExceeded,
    BudgetExceeded,
    Unknown,
}

impl LlmErrorKind {
    /// Whether another attempt is worthwhile.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmErrorKind::Timeout
                | LlmErrorKind::RateLimit
                | LlmErrorKind::ServerError
                | LlmErrorKind::Unknown
        )
    }

    /// Wire suffix used in `ERROR_*` statuses.
    pub fn as_wire(&self) -> &'static str {
        match self {
            LlmErrorKind::Timeout => "TIMEOUT",
            LlmErrorKind::RateLimit => "RATE_LIMIT",
            LlmErrorKind::ServerError => "SERVER_ERROR",
            LlmErrorKind::AuthError => "AUTH_ERROR",
            LlmErrorKind::ContextLengthExceeded => "CONTEXT_LENGTH_EXCEEDED",
            LlmErrorKind::BudgetExceeded => "BUDGET_EXCEEDED",
            LlmErrorKind::Unknown => "UNKNOWN",
        }
    }

    /// Parse a wire suffix; anything unrecognized maps to `Unknown`.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "TIMEOUT" => LlmErrorKind::Timeout,
            "RATE_LIMIT" => LlmErrorKind::RateLimit,
            "SERVER_ERROR" => LlmErrorKind::ServerError,
            "AUTH_ERROR" => LlmErrorKind::AuthError,
            "CONTEXT_LENGTH_EXCEEDED" => LlmErrorKind::ContextLengthExceeded,
            "BUDGET_EXCEEDED" => LlmErrorKind::BudgetExceeded,
            _ => LlmErrorKind::Unknown,
        }
    }

    /// Alert-sink kind string.
    pub fn alert_kind(&self) -> &'static str {
        match self {
            LlmErrorKind::Timeout => "timeout",
            LlmErrorKind::RateLimit => "rate_limit",
            LlmErrorKind::ServerError => "server_error",
            LlmErrorKind::AuthError => "auth_error",
            LlmErrorKind::ContextLengthExceeded => "context_length_exceeded",
            LlmErrorKind::BudgetExceeded => "budget_exceeded",
            LlmErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.alert_kind())
    }
}

/// One chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A completion request handed to an [`crate::llm::LlmClient`].
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    /// Total characters across all messages, for cost projection.
    pub fn prompt_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }
}

/// Raw completion returned by a client.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Token and cost usage for one classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost: f64,
}

/// A parsed, validated LLM classification.
#[derive(Debug, Clone)]
pub struct LlmClassification {
    pub action_code: ActionCode,
    pub confidence: f32,
    pub entities: Option<Entities>,
    pub reasoning: Option<String>,
    pub usage: LlmUsage,
    pub latency_ms: f64,
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(LlmErrorKind::Timeout.is_retryable());
        assert!(LlmErrorKind::RateLimit.is_retryable());
        assert!(LlmErrorKind::ServerError.is_retryable());
        assert!(LlmErrorKind::Unknown.is_retryable());
        assert!(!LlmErrorKind::AuthError.is_retryable());
        assert!(!LlmErrorKind::ContextLengthExceeded.is_retryable());
        assert!(!LlmErrorKind::BudgetExceeded.is_retryable());
    }

    #[test]
    fn test_wire_round_trip() {
        for kind in [
            LlmErrorKind::Timeout,
            LlmErrorKind::RateLimit,
            LlmErrorKind::ServerError,
            LlmErrorKind::AuthError,
            LlmErrorKind::ContextLengthExceeded,
            LlmErrorKind::BudgetExceeded,
            LlmErrorKind::Unknown,
        ] {
            assert_eq!(LlmErrorKind::from_wire(kind.as_wire()), kind);
        }
        assert_eq!(LlmErrorKind::from_wire("???"), LlmErrorKind::Unknown);
    }

    #[test]
    fn test_prompt_chars() {
        let request = CompletionRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage::system("abc"), ChatMessage::user("de")],
            max_tokens: 10,
            temperature: 0.0,
        };
        assert_eq!(request.prompt_chars(), 5);
    }
}
