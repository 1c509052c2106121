//! Error types for the Kestrel library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`KestrelError`] enum. Component boundaries surface typed kinds so the
//! decision engine, HTTP adapter, and queue worker can translate failures
//! into fallback results or status transitions instead of raw errors.

use std::io;

use thiserror::Error;

use crate::llm::LlmErrorKind;

/// The main error type for Kestrel operations.
#[derive(Error, Debug)]
pub enum KestrelError {
    /// I/O errors (file operations, sockets, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Input rejected before classification (empty or oversized query).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration validation failures (bad weights, unknown variant).
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Keyword dictionary could not be loaded or parsed.
    #[error("Keyword load error: {0}")]
    KeywordLoad(String),

    /// Taxonomy definition errors (duplicate action codes, empty examples).
    #[error("Taxonomy error: {0}")]
    Taxonomy(String),

    /// The embedding encoder failed to initialize or encode.
    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    /// The key-value or vector store is unreachable.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Queue operation failures.
    #[error("Queue error: {0}")]
    Queue(String),

    /// A classified LLM failure (timeout, rate limit, auth, ...).
    #[error("LLM error ({kind}): {message}")]
    Llm {
        /// Which failure class the call ended in.
        kind: LlmErrorKind,
        /// Human-readable detail, never shown to end users.
        message: String,
    },

    /// The projected cost of a call exceeded the per-request ceiling.
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    /// Every retry attempt was exhausted.
    #[error("All retries failed: {0}")]
    AllRetriesFailed(String),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error.
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with [`KestrelError`].
pub type Result<T> = std::result::Result<T, KestrelError>;

impl KestrelError {
    /// Create a new invalid-input error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        KestrelError::InvalidInput(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        KestrelError::ConfigInvalid(msg.into())
    }

    /// Create a new keyword load error.
    pub fn keyword_load<S: Into<String>>(msg: S) -> Self {
        KestrelError::KeywordLoad(msg.into())
    }

    /// Create a new taxonomy error.
    pub fn taxonomy<S: Into<String>>(msg: S) -> Self {
        KestrelError::Taxonomy(msg.into())
    }

    /// Create a new encoder error.
    pub fn encoder<S: Into<String>>(msg: S) -> Self {
        KestrelError::EncoderUnavailable(msg.into())
    }

    /// Create a new store error.
    pub fn store<S: Into<String>>(msg: S) -> Self {
        KestrelError::StoreUnavailable(msg.into())
    }

    /// Create a new queue error.
    pub fn queue<S: Into<String>>(msg: S) -> Self {
        KestrelError::Queue(msg.into())
    }

    /// Create a new LLM error with a classified kind.
    pub fn llm<S: Into<String>>(kind: LlmErrorKind, msg: S) -> Self {
        KestrelError::Llm {
            kind,
            message: msg.into(),
        }
    }

    /// Create a new budget error.
    pub fn budget<S: Into<String>>(msg: S) -> Self {
        KestrelError::BudgetExceeded(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        KestrelError::Other(msg.into())
    }

    /// The LLM error kind, if this error originated from an LLM call.
    pub fn llm_kind(&self) -> Option<LlmErrorKind> {
        match self {
            KestrelError::Llm { kind, .. } => Some(*kind),
            KestrelError::BudgetExceeded(_) => Some(LlmErrorKind::BudgetExceeded),
            _ => None,
        }
    }

    /// Whether the operation that produced this error may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            KestrelError::Llm { kind, .. } => kind.is_retryable(),
            KestrelError::StoreUnavailable(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = KestrelError::invalid_input("empty query");
        assert_eq!(error.to_string(), "Invalid input: empty query");

        let error = KestrelError::config("weights do not sum to 1.0");
        assert_eq!(
            error.to_string(),
            "Invalid configuration: weights do not sum to 1.0"
        );

        let error = KestrelError::queue("dequeue timed out");
        assert_eq!(error.to_string(), "Queue error: dequeue timed out");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error = KestrelError::from(io_error);

        match error {
            KestrelError::Io(_) => {}
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_llm_kind_mapping() {
        let error = KestrelError::llm(LlmErrorKind::Timeout, "deadline elapsed");
        assert_eq!(error.llm_kind(), Some(LlmErrorKind::Timeout));
        assert!(error.is_retryable());

        let error = KestrelError::llm(LlmErrorKind::AuthError, "bad key");
        assert!(!error.is_retryable());

        let error = KestrelError::budget("projected cost 0.02 over ceiling 0.01");
        assert_eq!(error.llm_kind(), Some(LlmErrorKind::BudgetExceeded));
    }
}
