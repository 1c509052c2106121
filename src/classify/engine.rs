//! The decision engine.
//!
//! Orchestrates the request path: normalize, keyword match, priority
//! short-circuit, embedding match, blend, confidence gate, then either
//! emit a result, serve from cache, or enqueue an escalation. The active
//! configuration variant is read exactly once per request.

use std::sync::Arc;

use tracing::debug;

use crate::analysis::{NormalizedQuery, Normalizer};
use crate::audit::{AuditLog, AuditRecord};
use crate::cache::ResponseCache;
use crate::config::ConfigManager;
use crate::context::SessionWindow;
use crate::embedding::EmbeddingMatcher;
use crate::error::{KestrelError, Result};
use crate::fallback::FallbackManager;
use crate::keyword::KeywordMatcher;
use crate::queue::{EscalationQueue, QueuePayload, QueuePriority, RuleHint};
use crate::taxonomy::{IntentPriority, Taxonomy};

use super::blender::Blender;
use super::confidence::{evaluate_confidence, ConfidenceVerdict};
use super::types::{
    Candidate, ClassificationResult, MatchSource, ResultStatus,
};

/// Maximum accepted query length in characters.
pub const MAX_QUERY_CHARS: usize = 500;

/// Candidates retained from each matcher.
const TOP_N: usize = 10;

/// A classification request as seen by the engine.
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub text: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

impl ClassifyRequest {
    /// A request with no session context.
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: None,
            user_id: None,
        }
    }
}

/// What the engine decided for one request.
#[derive(Debug, Clone)]
pub enum ClassifyOutcome {
    /// A synchronous answer.
    Resolved(ClassificationResult),
    /// The query was escalated; poll the status store with this id.
    Queued { request_id: String },
}

/// The request-path orchestrator.
pub struct DecisionEngine {
    normalizer: Arc<Normalizer>,
    keywords: Arc<KeywordMatcher>,
    embeddings: Arc<EmbeddingMatcher>,
    taxonomy: Arc<Taxonomy>,
    config: Arc<ConfigManager>,
    cache: Arc<ResponseCache>,
    queue: Arc<dyn EscalationQueue>,
    sessions: Arc<SessionWindow>,
    audit: Arc<AuditLog>,
    fallback: Arc<FallbackManager>,
}

impl DecisionEngine {
    #[allow(clippy::too_many_arguments)]
    /// Wire up the engine. All collaborators are shared, immutable or
    /// internally synchronized.
    pub fn new(
        normalizer: Arc<Normalizer>,
        keywords: Arc<KeywordMatcher>,
        embeddings: Arc<EmbeddingMatcher>,
        taxonomy: Arc<Taxonomy>,
        config: Arc<ConfigManager>,
        cache: Arc<ResponseCache>,
        queue: Arc<dyn EscalationQueue>,
        sessions: Arc<SessionWindow>,
        audit: Arc<AuditLog>,
        fallback: Arc<FallbackManager>,
    ) -> Self {
        Self {
            normalizer,
            keywords,
            embeddings,
            taxonomy,
            config,
            cache,
            queue,
            sessions,
            audit,
            fallback,
        }
    }

    /// Classify one utterance.
    pub async fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyOutcome> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(KestrelError::invalid_input("query is empty"));
        }
        if text.chars().count() > MAX_QUERY_CHARS {
            return Err(KestrelError::invalid_input(format!(
                "query exceeds {MAX_QUERY_CHARS} characters"
            )));
        }

        // One config snapshot for the whole request.
        let variant = self.config.active();
        let normalized = self.normalizer.normalize(text);

        if let Some(session_id) = &request.session_id {
            self.sessions.record(session_id, text);
        }

        // Keyword stage and the priority short-circuit: a strong keyword
        // hit skips all embedding work.
        let kw_candidates = self.keywords.search(&normalized, TOP_N);
        if let Some(top) = kw_candidates.first() {
            if top.score >= variant.priority_threshold {
                debug!(action_code = %top.action_code, score = top.score, "priority short-circuit");
                let result = ClassificationResult::new(
                    top.action_code.clone(),
                    top.score,
                    ResultStatus::ConfidentKeyword,
                    MatchSource::Keyword,
                )
                .with_matched_keywords(matched_keywords(&kw_candidates, &top.action_code))
                .with_variant(variant.name.clone());
                return Ok(ClassifyOutcome::Resolved(result));
            }
        }

        // Embedding stage, unless disabled or unhealthy.
        let embedding_active = variant.use_embedding && self.embeddings.is_healthy();
        let emb_candidates = if embedding_active {
            self.embeddings.search(&normalized, TOP_N).await
        } else {
            Vec::new()
        };

        // When the embedding side is out, the keyword weight renormalizes
        // to 1 for this request only.
        let blender = if emb_candidates.is_empty() {
            Blender::new(1.0, 0.0)
        } else {
            Blender::new(variant.kw_weight, variant.emb_weight)
        };
        let blended = blender.blend(kw_candidates, emb_candidates);

        let verdict = evaluate_confidence(
            &blended,
            variant.confidence_threshold,
            variant.gap_threshold,
        );

        if verdict == ConfidenceVerdict::Confident {
            let top = blended.first().expect("confident verdict implies a top");
            let result = ClassificationResult::new(
                top.action_code.clone(),
                top.score,
                ResultStatus::ConfidentBlended,
                MatchSource::Blended,
            )
            .with_matched_keywords(matched_keywords(&blended, &top.action_code))
            .with_variant(variant.name.clone());
            return Ok(ClassifyOutcome::Resolved(result));
        }

        self.audit.record(AuditRecord::new(
            match verdict {
                ConfidenceVerdict::Ambiguous => "ambiguous",
                _ => "unclear",
            },
            text,
            serde_json::json!({
                "top": blended.first().map(|c| (c.action_code.as_str().to_string(), c.score)),
                "second": blended.get(1).map(|c| (c.action_code.as_str().to_string(), c.score)),
                "variant": variant.name,
            }),
        ));

        // Cache before any LLM work: exact tier first, then semantic.
        if let Some(cached) = self.cache.get(&normalized).await {
            debug!("ambiguous query served from response cache");
            let result = ClassificationResult {
                status: ResultStatus::LlmClassification,
                ..cached
            }
            .with_variant(variant.name.clone());
            return Ok(ClassifyOutcome::Resolved(result));
        }

        // LLM disabled by config: the engine answers with the generic
        // search fallback, unconditionally.
        if !variant.use_llm {
            return Ok(ClassifyOutcome::Resolved(
                self.fallback
                    .generic_fallback()
                    .with_variant(variant.name.clone()),
            ));
        }

        // Escalate.
        let hint = blended.first().map(|top| RuleHint {
            action_code: top.action_code.clone(),
            confidence: top.score,
            next_best_confidence: blended.get(1).map(|c| c.score),
        });
        let priority = self.queue_priority(blended.first());
        let payload = QueuePayload {
            query: text.to_string(),
            rule_based_hint: hint,
            context_snapshot: self
                .sessions
                .snapshot(request.session_id.as_deref(), request.user_id.as_deref()),
        };
        let request_id = self.queue.enqueue(payload, priority).await?;
        debug!(request_id = %request_id, "query escalated to llm queue");
        Ok(ClassifyOutcome::Queued { request_id })
    }

    /// Look a cached answer up with the normal threshold, for adapters.
    pub async fn cached(&self, text: &str) -> Option<ClassificationResult> {
        let normalized = self.normalizer.normalize(text);
        self.cache.get(&normalized).await
    }

    /// Normalize helper exposed for adapters and tests.
    pub fn normalize(&self, text: &str) -> Arc<NormalizedQuery> {
        self.normalizer.normalize(text)
    }

    fn queue_priority(&self, top: Option<&Candidate>) -> QueuePriority {
        let Some(candidate) = top else {
            return QueuePriority::Normal;
        };
        match self
            .taxonomy
            .get(&candidate.action_code)
            .map(|definition| definition.priority)
        {
            Some(IntentPriority::Critical) | Some(IntentPriority::High) => QueuePriority::High,
            Some(IntentPriority::Low) | Some(IntentPriority::Fallback) => QueuePriority::Low,
            _ => QueuePriority::Normal,
        }
    }
}

/// Matched keywords of the winning candidate (its matched text, when the
/// keyword side produced one).
fn matched_keywords(candidates: &[Candidate], code: &crate::taxonomy::ActionCode) -> Vec<String> {
    candidates
        .iter()
        .filter(|candidate| &candidate.action_code == code)
        .filter_map(|candidate| candidate.matched_text.clone())
        .collect()
}
