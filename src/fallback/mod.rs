//! User-facing fallbacks.
//!
//! Translates internal error kinds into safe responses and runs the
//! fallback ladder when the LLM path fails: first the response cache at
//! the looser similarity threshold, then an UNCLEAR result with
//! clarifying questions. Nothing produced here ever carries stack
//! traces, API identifiers, or model names.

use std::sync::Arc;

use crate::analysis::NormalizedQuery;
use crate::cache::ResponseCache;
use crate::classify::{ClassificationResult, MatchSource, ResultStatus};
use crate::llm::LlmErrorKind;
use crate::taxonomy::ActionCode;

/// Action code of generic fallbacks.
pub const GENERIC_FALLBACK_CODE: &str = "SEARCH_PRODUCT";

/// Confidence reported by generic fallbacks.
pub const GENERIC_FALLBACK_CONFIDENCE: f32 = 0.1;

/// Builds fallback responses and translates error kinds.
pub struct FallbackManager {
    cache: Arc<ResponseCache>,
}

impl FallbackManager {
    /// Create a manager over the response cache.
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache }
    }

    /// The fallback ladder after an exhausted or refused LLM call.
    pub async fn on_llm_failure(
        &self,
        query: &NormalizedQuery,
        kind: LlmErrorKind,
    ) -> ClassificationResult {
        if let Some(cached) = self.cache.get_fallback(query).await {
            return ClassificationResult {
                status: ResultStatus::LlmClassification,
                ..cached
            }
            .with_fallback_source("cache");
        }
        self.unclear_response(kind)
    }

    /// An UNCLEAR result carrying clarifying questions.
    pub fn unclear_response(&self, kind: LlmErrorKind) -> ClassificationResult {
        let mut result = ClassificationResult::new(
            ActionCode::from("UNCLEAR"),
            0.0,
            ResultStatus::Unclear,
            MatchSource::Fallback,
        );
        result.requires_clarification = true;
        result.clarifying_questions = clarifying_questions();
        result.retry_recommended = Some(retry_recommended(kind));
        result.suggestions = suggestions(kind);
        result
    }

    /// The generic catch-all used when the LLM path is disabled and no
    /// candidate clears the fallback floor.
    pub fn generic_fallback(&self) -> ClassificationResult {
        ClassificationResult::new(
            ActionCode::from(GENERIC_FALLBACK_CODE),
            GENERIC_FALLBACK_CONFIDENCE,
            ResultStatus::FallbackGeneric,
            MatchSource::Fallback,
        )
    }
}

/// Non-technical message for a failed request's status record.
pub fn user_message(kind: LlmErrorKind) -> &'static str {
    match kind {
        LlmErrorKind::Timeout => "The request is taking longer than expected. Please try again.",
        LlmErrorKind::RateLimit => {
            "We're experiencing high traffic. Please try again in a moment."
        }
        LlmErrorKind::ServerError => {
            "The service is temporarily unavailable. Our team has been notified."
        }
        LlmErrorKind::AuthError => {
            "We're experiencing technical difficulties. Our team has been notified."
        }
        LlmErrorKind::ContextLengthExceeded => {
            "Your request is too complex. Please try a simpler query."
        }
        LlmErrorKind::BudgetExceeded => {
            "We could not fully process your request. Please try rephrasing it."
        }
        LlmErrorKind::Unknown => {
            "Sorry, something went wrong while processing your request. Please try again."
        }
    }
}

/// Whether retrying is likely to help for this kind.
pub fn retry_recommended(kind: LlmErrorKind) -> bool {
    !matches!(
        kind,
        LlmErrorKind::AuthError | LlmErrorKind::BudgetExceeded
    )
}

fn suggestions(kind: LlmErrorKind) -> Vec<String> {
    match kind {
        LlmErrorKind::ContextLengthExceeded | LlmErrorKind::BudgetExceeded => vec![
            "Break your request into smaller parts".to_string(),
            "Use fewer words to describe what you need".to_string(),
        ],
        LlmErrorKind::RateLimit => vec![
            "Wait a minute before trying again".to_string(),
            "Browse the catalog while waiting".to_string(),
        ],
        _ => vec![
            "Try again in a few seconds".to_string(),
            "Provide more details, like a product name or order number".to_string(),
        ],
    }
}

fn clarifying_questions() -> Vec<String> {
    vec![
        "Are you looking for a specific product?".to_string(),
        "Would you like to check on an existing order?".to_string(),
        "Do you need help with your cart or checkout?".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::normalizer::normalize_uncached;
    use crate::cache::CacheConfig;
    use crate::embedding::{EmbeddingMatcher, HashedTfIdfEncoder};
    use crate::storage::{MemoryKv, MemoryVectorIndex};
    use crate::taxonomy::{IntentDefinition, IntentPriority, Taxonomy};

    fn manager() -> FallbackManager {
        let taxonomy = Taxonomy::from_definitions(vec![IntentDefinition {
            action_code: ActionCode::from("SEARCH_PRODUCT"),
            category: "SEARCH_DISCOVERY".to_string(),
            description: String::new(),
            example_phrases: vec!["find red shoes".to_string()],
            required_entities: vec![],
            optional_entities: vec![],
            confidence_threshold: 0.7,
            priority: IntentPriority::Medium,
        }])
        .unwrap();
        let encoder = Arc::new(HashedTfIdfEncoder::fitted(128, &["find red shoes"]));
        let embedder = Arc::new(EmbeddingMatcher::new(encoder, Arc::new(taxonomy)));
        let cache = Arc::new(ResponseCache::new(
            CacheConfig::default(),
            Arc::new(MemoryKv::new()),
            Arc::new(MemoryVectorIndex::new()),
            embedder,
        ));
        FallbackManager::new(cache)
    }

    #[tokio::test]
    async fn test_cache_fallback_preferred() {
        let manager = manager();
        let query = normalize_uncached("find red shoes");
        let cached = ClassificationResult::new(
            ActionCode::from("SEARCH_PRODUCT"),
            0.92,
            ResultStatus::LlmClassification,
            MatchSource::Llm,
        );
        manager.cache.set(&query, &cached).await;

        let result = manager
            .on_llm_failure(&query, LlmErrorKind::Timeout)
            .await;
        assert_eq!(result.action_code.as_str(), "SEARCH_PRODUCT");
        assert_eq!(result.fallback_source.as_deref(), Some("cache"));
        assert_eq!(result.status, ResultStatus::LlmClassification);
    }

    #[tokio::test]
    async fn test_unclear_when_cache_misses() {
        let manager = manager();
        let query = normalize_uncached("zzz qqq vvv");
        let result = manager
            .on_llm_failure(&query, LlmErrorKind::Timeout)
            .await;

        assert_eq!(result.status, ResultStatus::Unclear);
        assert!(result.requires_clarification);
        let questions = result.clarifying_questions.len();
        assert!((2..=4).contains(&questions));
        assert_eq!(result.retry_recommended, Some(true));
    }

    #[test]
    fn test_retry_recommendations() {
        assert!(retry_recommended(LlmErrorKind::Timeout));
        assert!(retry_recommended(LlmErrorKind::RateLimit));
        assert!(!retry_recommended(LlmErrorKind::AuthError));
        assert!(!retry_recommended(LlmErrorKind::BudgetExceeded));
    }

    #[test]
    fn test_messages_are_sanitized() {
        for kind in [
            LlmErrorKind::Timeout,
            LlmErrorKind::RateLimit,
            LlmErrorKind::ServerError,
            LlmErrorKind::AuthError,
            LlmErrorKind::ContextLengthExceeded,
            LlmErrorKind::BudgetExceeded,
            LlmErrorKind::Unknown,
        ] {
            let message = user_message(kind);
            assert!(!message.to_lowercase().contains("gpt"));
            assert!(!message.to_lowercase().contains("api"));
            assert!(!message.contains("key"));
        }
    }

    #[test]
    fn test_generic_fallback_shape() {
        let result = manager().generic_fallback();
        assert_eq!(result.action_code.as_str(), GENERIC_FALLBACK_CODE);
        assert!((result.confidence - 0.1).abs() < 1e-6);
        assert_eq!(result.status, ResultStatus::FallbackGeneric);
    }
}
