//! Parsing and validation of LLM responses.

use serde::Deserialize;

use crate::entities::Entities;
use crate::error::{KestrelError, Result};
use crate::taxonomy::{ActionCode, Taxonomy};

use super::types::LlmErrorKind;

/// The sentinel code returned when the model cannot classify, or returns
/// a code outside the taxonomy.
pub const UNCLEAR_CODE: &str = "UNCLEAR";

/// A parsed response, before calibration.
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub action_code: ActionCode,
    pub confidence: f32,
    pub entities: Option<Entities>,
    pub reasoning: Option<String>,
    /// False when the raw code was outside the taxonomy and was mapped
    /// to UNCLEAR.
    pub recognized: bool,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    action_code: String,
    confidence: f64,
    #[serde(default)]
    entities: Option<Entities>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Parse the model output as strict JSON with `{action_code, confidence,
/// entities, reasoning}`. Confidence is clamped to [0, 1]; action codes
/// outside the taxonomy map to `UNCLEAR`.
pub fn parse_llm_response(content: &str, taxonomy: &Taxonomy) -> Result<ParsedResponse> {
    let json = extract_json(content).ok_or_else(|| {
        KestrelError::llm(
            LlmErrorKind::Unknown,
            "model response contained no JSON object",
        )
    })?;

    let raw: RawResponse = serde_json::from_str(json)
        .map_err(|e| KestrelError::llm(LlmErrorKind::Unknown, format!("malformed response: {e}")))?;

    let confidence = (raw.confidence as f32).clamp(0.0, 1.0);
    let code = ActionCode::new(raw.action_code.trim());

    let (action_code, recognized) =
        if code.as_str() == UNCLEAR_CODE || taxonomy.contains(&code) {
            let recognized = code.as_str() != UNCLEAR_CODE;
            (code, recognized)
        } else {
            (ActionCode::from(UNCLEAR_CODE), false)
        };

    Ok(ParsedResponse {
        action_code,
        confidence,
        entities: raw.entities,
        reasoning: raw.reasoning,
        recognized,
    })
}

/// Pull the outermost JSON object out of possibly-fenced model output.
fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}
