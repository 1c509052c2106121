//! Configuration variant types and validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{KestrelError, Result};

/// Tolerance for the weight-sum invariant.
pub const WEIGHT_EPSILON: f32 = 1e-6;

/// One named rule set driving the classification pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigVariant {
    /// Variant name; filled from the rule-set key when omitted in files.
    #[serde(default)]
    pub name: String,
    /// Keyword weight in the blender.
    pub kw_weight: f32,
    /// Embedding weight in the blender. Must satisfy
    /// `kw_weight + emb_weight == 1.0` within [`WEIGHT_EPSILON`].
    pub emb_weight: f32,
    /// Keyword score at which the embedding stage is skipped entirely.
    #[serde(default = "default_priority_threshold")]
    pub priority_threshold: f32,
    /// Absolute confidence floor for the gate.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// Minimum top-1/top-2 gap for the gate.
    #[serde(default = "default_gap_threshold")]
    pub gap_threshold: f32,
    /// Whether the embedding matcher runs at all.
    #[serde(default = "default_true")]
    pub use_embedding: bool,
    /// Whether ambiguous queries may escalate to the LLM.
    #[serde(default = "default_true")]
    pub use_llm: bool,
    /// Model identifier used for escalations under this variant.
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
}

fn default_priority_threshold() -> f32 {
    0.80
}

fn default_confidence_threshold() -> f32 {
    0.60
}

fn default_gap_threshold() -> f32 {
    0.05
}

fn default_true() -> bool {
    true
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for ConfigVariant {
    fn default() -> Self {
        Self {
            name: "A".to_string(),
            kw_weight: 0.6,
            emb_weight: 0.4,
            priority_threshold: default_priority_threshold(),
            confidence_threshold: default_confidence_threshold(),
            gap_threshold: default_gap_threshold(),
            use_embedding: true,
            use_llm: true,
            llm_model: default_llm_model(),
        }
    }
}

impl ConfigVariant {
    /// Validate the variant invariants; a failing variant is rejected and
    /// the previous configuration stays active.
    pub fn validate(&self) -> Result<()> {
        let sum = self.kw_weight + self.emb_weight;
        if (sum - 1.0).abs() > WEIGHT_EPSILON {
            return Err(KestrelError::config(format!(
                "variant {}: kw_weight + emb_weight = {sum}, expected 1.0",
                self.name
            )));
        }
        for (label, value) in [
            ("kw_weight", self.kw_weight),
            ("emb_weight", self.emb_weight),
            ("priority_threshold", self.priority_threshold),
            ("confidence_threshold", self.confidence_threshold),
            ("gap_threshold", self.gap_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(KestrelError::config(format!(
                    "variant {}: {label} = {value} outside [0, 1]",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// On-disk configuration shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesFile {
    /// Which variant is active.
    pub active_variant: String,
    /// The rule sets.
    pub rules: RuleSets,
}

/// Wrapper matching the nested file layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSets {
    /// Variant name to definition.
    pub rule_sets: BTreeMap<String, ConfigVariant>,
}

impl RulesFile {
    /// Parse and validate a configuration document. Variant names are
    /// backfilled from their keys.
    pub fn parse(content: &str) -> Result<Self> {
        let mut file: RulesFile = serde_json::from_str(content)
            .map_err(|e| KestrelError::config(format!("invalid config JSON: {e}")))?;

        for (name, variant) in file.rules.rule_sets.iter_mut() {
            if variant.name.is_empty() {
                variant.name = name.clone();
            }
            variant.validate()?;
        }

        if !file.rules.rule_sets.contains_key(&file.active_variant) {
            return Err(KestrelError::config(format!(
                "active variant {} not among rule sets",
                file.active_variant
            )));
        }
        Ok(file)
    }
}
