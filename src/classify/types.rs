//! Result types for the classification pipeline.
//!
//! These replace the loosely-typed result dictionaries the matchers used
//! to exchange: candidates, component scores, and the final classification
//! result are all explicit tagged types.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::entities::Entities;
use crate::llm::LlmErrorKind;
use crate::taxonomy::ActionCode;

/// Which stage produced a candidate or result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    Keyword,
    Embedding,
    Blended,
    Fallback,
    Llm,
    Cache,
}

/// How a keyword pattern matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Regex,
    Partial,
}

impl MatchType {
    /// Rank for tie-breaking: exact beats regex beats partial.
    pub fn rank(&self) -> u8 {
        match self {
            MatchType::Exact => 3,
            MatchType::Regex => 2,
            MatchType::Partial => 1,
        }
    }
}

/// The per-matcher components behind a blended score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    /// Keyword matcher contribution (0 when the matcher had no candidate).
    pub keyword: f32,
    /// Embedding matcher contribution (0 when unavailable).
    pub embedding: f32,
}

impl ComponentScores {
    /// The larger individual component.
    pub fn max_individual(&self) -> f32 {
        self.keyword.max(self.embedding)
    }
}

/// An intermediate scoring record produced by a matcher or the blender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// The candidate action code.
    pub action_code: ActionCode,
    /// Score in [0, 1].
    pub score: f32,
    /// Producing stage.
    pub source: MatchSource,
    /// Keyword match type, when `source` is keyword.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,
    /// The text that produced the best score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_text: Option<String>,
    /// Individual matcher components, when blended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_scores: Option<ComponentScores>,
}

impl Candidate {
    /// Create a bare candidate.
    pub fn new(action_code: ActionCode, score: f32, source: MatchSource) -> Self {
        Self {
            action_code,
            score,
            source,
            match_type: None,
            matched_text: None,
            component_scores: None,
        }
    }

    /// Attach a keyword match type.
    pub fn with_match_type(mut self, match_type: MatchType) -> Self {
        self.match_type = Some(match_type);
        self
    }

    /// Attach the matched text.
    pub fn with_matched_text(mut self, text: impl Into<String>) -> Self {
        self.matched_text = Some(text.into());
        self
    }

    /// Attach component scores.
    pub fn with_components(mut self, keyword: f32, embedding: f32) -> Self {
        self.component_scores = Some(ComponentScores { keyword, embedding });
        self
    }

    /// The best individual component, falling back to the overall score.
    pub fn max_individual(&self) -> f32 {
        self.component_scores
            .map(|c| c.max_individual())
            .unwrap_or(self.score)
    }
}

/// Total order used everywhere candidates are ranked: score descending,
/// then best individual component descending, then match-type rank
/// descending, then action code ascending. Never depends on map iteration
/// order.
pub fn rank_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.max_individual()
                .partial_cmp(&a.max_individual())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| {
            let rank_a = a.match_type.map(|m| m.rank()).unwrap_or(0);
            let rank_b = b.match_type.map(|m| m.rank()).unwrap_or(0);
            rank_b.cmp(&rank_a)
        })
        .then_with(|| a.action_code.cmp(&b.action_code))
}

/// Final status of a classification response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    ConfidentKeyword,
    ConfidentBlended,
    QueuedForLlm,
    LlmClassification,
    FallbackEmbedding,
    FallbackKeyword,
    FallbackGeneric,
    Unclear,
    Error(LlmErrorKind),
}

impl ResultStatus {
    /// Wire representation, e.g. `CONFIDENT_KEYWORD` or `ERROR_TIMEOUT`.
    pub fn as_wire(&self) -> String {
        match self {
            ResultStatus::ConfidentKeyword => "CONFIDENT_KEYWORD".to_string(),
            ResultStatus::ConfidentBlended => "CONFIDENT_BLENDED".to_string(),
            ResultStatus::QueuedForLlm => "QUEUED_FOR_LLM".to_string(),
            ResultStatus::LlmClassification => "LLM_CLASSIFICATION".to_string(),
            ResultStatus::FallbackEmbedding => "FALLBACK_EMBEDDING".to_string(),
            ResultStatus::FallbackKeyword => "FALLBACK_KEYWORD".to_string(),
            ResultStatus::FallbackGeneric => "FALLBACK_GENERIC".to_string(),
            ResultStatus::Unclear => "UNCLEAR".to_string(),
            ResultStatus::Error(kind) => format!("ERROR_{}", kind.as_wire()),
        }
    }
}

impl Serialize for ResultStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_wire())
    }
}

impl<'de> Deserialize<'de> for ResultStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let status = match raw.as_str() {
            "CONFIDENT_KEYWORD" => ResultStatus::ConfidentKeyword,
            "CONFIDENT_BLENDED" => ResultStatus::ConfidentBlended,
            "QUEUED_FOR_LLM" => ResultStatus::QueuedForLlm,
            "LLM_CLASSIFICATION" => ResultStatus::LlmClassification,
            "FALLBACK_EMBEDDING" => ResultStatus::FallbackEmbedding,
            "FALLBACK_KEYWORD" => ResultStatus::FallbackKeyword,
            "FALLBACK_GENERIC" => ResultStatus::FallbackGeneric,
            "UNCLEAR" => ResultStatus::Unclear,
            other => match other.strip_prefix("ERROR_") {
                Some(kind) => ResultStatus::Error(LlmErrorKind::from_wire(kind)),
                None => {
                    return Err(serde::de::Error::custom(format!(
                        "unknown result status {other}"
                    )))
                }
            },
        };
        Ok(status)
    }
}

/// The final output of classification for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Winning action code.
    pub action_code: ActionCode,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Outcome status.
    pub status: ResultStatus,
    /// Keywords that contributed to the decision.
    #[serde(default)]
    pub matched_keywords: Vec<String>,
    /// Extracted entities, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Entities>,
    /// Producing stage.
    pub source: MatchSource,
    /// Request id, present for asynchronous escalations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Set when the response asks the user to clarify.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_clarification: bool,
    /// Clarifying questions for UNCLEAR responses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clarifying_questions: Vec<String>,
    /// Whether retrying the request is likely to help.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_recommended: Option<bool>,
    /// Actionable suggestions accompanying a fallback.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// Where a fallback result came from (e.g. `cache`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_source: Option<String>,
    /// The configuration variant that served this request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_variant: Option<String>,
}

impl ClassificationResult {
    /// Create a result with the required fields.
    pub fn new(
        action_code: ActionCode,
        confidence: f32,
        status: ResultStatus,
        source: MatchSource,
    ) -> Self {
        Self {
            action_code,
            confidence,
            status,
            matched_keywords: Vec::new(),
            entities: None,
            source,
            request_id: None,
            requires_clarification: false,
            clarifying_questions: Vec::new(),
            retry_recommended: None,
            suggestions: Vec::new(),
            fallback_source: None,
            config_variant: None,
        }
    }

    /// Attach matched keywords.
    pub fn with_matched_keywords(mut self, keywords: Vec<String>) -> Self {
        self.matched_keywords = keywords;
        self
    }

    /// Attach entities.
    pub fn with_entities(mut self, entities: Option<Entities>) -> Self {
        self.entities = entities;
        self
    }

    /// Attach a request id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attach the serving config variant.
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.config_variant = Some(variant.into());
        self
    }

    /// Record where a fallback result came from.
    pub fn with_fallback_source(mut self, source: impl Into<String>) -> Self {
        self.fallback_source = Some(source.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(code: &str, score: f32) -> Candidate {
        Candidate::new(ActionCode::from(code), score, MatchSource::Keyword)
    }

    #[test]
    fn test_rank_by_score_then_code() {
        let mut candidates = vec![
            candidate("B_CODE", 0.5),
            candidate("A_CODE", 0.5),
            candidate("C_CODE", 0.9),
        ];
        candidates.sort_by(rank_candidates);

        let codes: Vec<_> = candidates.iter().map(|c| c.action_code.as_str()).collect();
        assert_eq!(codes, vec!["C_CODE", "A_CODE", "B_CODE"]);
    }

    #[test]
    fn test_rank_prefers_higher_match_type() {
        let exact = candidate("B_CODE", 0.5).with_match_type(MatchType::Exact);
        let partial = candidate("A_CODE", 0.5).with_match_type(MatchType::Partial);

        let mut candidates = vec![partial, exact];
        candidates.sort_by(rank_candidates);
        assert_eq!(candidates[0].action_code.as_str(), "B_CODE");
    }

    #[test]
    fn test_rank_prefers_higher_individual_component() {
        let a = Candidate::new(ActionCode::from("A_CODE"), 0.6, MatchSource::Blended)
            .with_components(0.4, 0.9);
        let b = Candidate::new(ActionCode::from("B_CODE"), 0.6, MatchSource::Blended)
            .with_components(0.5, 0.7);

        let mut candidates = vec![b, a];
        candidates.sort_by(rank_candidates);
        assert_eq!(candidates[0].action_code.as_str(), "A_CODE");
    }

    #[test]
    fn test_status_wire_round_trip() {
        let statuses = [
            ResultStatus::ConfidentKeyword,
            ResultStatus::QueuedForLlm,
            ResultStatus::FallbackEmbedding,
            ResultStatus::FallbackKeyword,
            ResultStatus::FallbackGeneric,
            ResultStatus::Unclear,
            ResultStatus::Error(LlmErrorKind::Timeout),
        ];
        for status in statuses {
            let json = serde_json::to_string(&status).unwrap();
            let back: ResultStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }
        assert_eq!(
            serde_json::to_string(&ResultStatus::Error(LlmErrorKind::RateLimit)).unwrap(),
            "\"ERROR_RATE_LIMIT\""
        );
    }

    #[test]
    fn test_result_serialization_skips_empty_fields() {
        let result = ClassificationResult::new(
            ActionCode::from("ADD_TO_CART"),
            0.97,
            ResultStatus::ConfidentKeyword,
            MatchSource::Keyword,
        );
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("request_id").is_none());
        assert!(json.get("entities").is_none());
        assert!(json.get("requires_clarification").is_none());
        assert_eq!(json["status"], "CONFIDENT_KEYWORD");
        assert_eq!(json["source"], "keyword");
    }
}
