//! Core taxonomy types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KestrelError, Result};

/// An identifier from the closed action-code enumeration, e.g. `ADD_TO_CART`.
///
/// Codes are loaded from definition files at startup; the registry enforces
/// uniqueness. Ordering is lexicographic, which the matchers rely on for
/// deterministic tie-breaking.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionCode(String);

impl ActionCode {
    /// Create an action code from a raw identifier.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

/// Priority bucket of an intent definition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntentPriority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
    Fallback,
}

/// Kinds of entities an intent may require or accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    ProductType,
    Category,
    Brand,
    Color,
    Size,
    PriceRange,
}

/// One intent definition: an action code plus the metadata used to match it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentDefinition {
    /// The unique action code.
    pub action_code: ActionCode,
    /// Category tag, e.g. `CART_WISHLIST`.
    pub category: String,
    /// Human description.
    pub description: String,
    /// Ordered example phrases; at least five are recommended.
    pub example_phrases: Vec<String>,
    /// Entities that must be present for downstream execution.
    #[serde(default)]
    pub required_entities: Vec<EntityKind>,
    /// Entities that enrich but are not required.
    #[serde(default)]
    pub optional_entities: Vec<EntityKind>,
    /// Per-intent confidence threshold in [0, 1].
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// Priority bucket.
    #[serde(default)]
    pub priority: IntentPriority,
}

fn default_confidence_threshold() -> f32 {
    0.7
}

impl IntentDefinition {
    fn validate(&self) -> Result<()> {
        if self.example_phrases.is_empty() {
            return Err(KestrelError::taxonomy(format!(
                "intent {} has no example phrases",
                self.action_code
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(KestrelError::taxonomy(format!(
                "intent {} has confidence threshold {} outside [0, 1]",
                self.action_code, self.confidence_threshold
            )));
        }
        Ok(())
    }
}

/// The loaded, immutable intent registry.
///
/// A `BTreeMap` keeps iteration in action-code order so every derived
/// structure (reference embeddings, prompt examples) is deterministic.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    definitions: BTreeMap<ActionCode, IntentDefinition>,
}

impl Taxonomy {
    /// Build a taxonomy, rejecting duplicate action codes and invalid
    /// definitions.
    pub fn from_definitions(definitions: Vec<IntentDefinition>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for definition in definitions {
            definition.validate()?;
            let code = definition.action_code.clone();
            if map.insert(code.clone(), definition).is_some() {
                return Err(KestrelError::taxonomy(format!(
                    "duplicate action code {code}"
                )));
            }
        }
        Ok(Self { definitions: map })
    }

    /// Look up a definition by action code.
    pub fn get(&self, code: &ActionCode) -> Option<&IntentDefinition> {
        self.definitions.get(code)
    }

    /// Whether the code belongs to the closed enumeration.
    pub fn contains(&self, code: &ActionCode) -> bool {
        self.definitions.contains_key(code)
    }

    /// All definitions in action-code order.
    pub fn definitions(&self) -> impl Iterator<Item = &IntentDefinition> {
        self.definitions.values()
    }

    /// All action codes in order.
    pub fn codes(&self) -> impl Iterator<Item = &ActionCode> {
        self.definitions.keys()
    }

    /// Number of intents.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the taxonomy is empty.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
