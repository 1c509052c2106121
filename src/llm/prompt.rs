//! Versioned system prompts and few-shot examples.
//!
//! The default prompt set ships embedded so the worker runs without any
//! prompt files; deployments can override individual versions from disk.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::context::ContextSnapshot;
use crate::error::{KestrelError, Result};
use crate::queue::RuleHint;

use super::types::ChatMessage;

/// The active prompt version.
pub const DEFAULT_PROMPT_VERSION: &str = "v1";

const SYSTEM_PROMPT_V1: &str = "You classify e-commerce shopping utterances into exactly one \
action code from the provided taxonomy and extract structured entities.\n\
Respond with a single JSON object and nothing else:\n\
{\"action_code\": \"<CODE>\", \"confidence\": <0.0-1.0>, \"entities\": {\"product_type\": null, \
\"category\": null, \"brand\": null, \"color\": null, \"size\": null, \"price_range\": null}, \
\"reasoning\": \"<one short sentence>\"}\n\
Use UNCLEAR as the action code when the utterance does not fit any code.";

/// One few-shot exchange: user text and the assistant's JSON reply.
#[derive(Debug, Clone, Deserialize)]
pub struct FewShotExample {
    pub user: String,
    pub assistant: String,
}

fn default_few_shot() -> Vec<FewShotExample> {
    vec![
        FewShotExample {
            user: "add these red sneakers to my basket".to_string(),
            assistant: r#"{"action_code": "ADD_TO_CART", "confidence": 0.95, "entities": {"product_type": "sneakers", "color": "red"}, "reasoning": "Explicit request to add an item to the cart."}"#.to_string(),
        },
        FewShotExample {
            user: "where's my package".to_string(),
            assistant: r#"{"action_code": "TRACK_ORDER", "confidence": 0.9, "entities": {}, "reasoning": "Asking about delivery status of an order."}"#.to_string(),
        },
        FewShotExample {
            user: "hmm maybe later".to_string(),
            assistant: r#"{"action_code": "UNCLEAR", "confidence": 0.3, "entities": {}, "reasoning": "No actionable shopping intent."}"#.to_string(),
        },
    ]
}

/// A versioned prompt set.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    version: String,
    system_prompt: String,
    few_shot: Vec<FewShotExample>,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self {
            version: DEFAULT_PROMPT_VERSION.to_string(),
            system_prompt: SYSTEM_PROMPT_V1.to_string(),
            few_shot: default_few_shot(),
        }
    }
}

impl PromptLibrary {
    /// Load a prompt version from a directory containing
    /// `system_prompt_<version>.txt` and `few_shot_examples_<version>.json`.
    pub fn from_dir(dir: &Path, version: &str) -> Result<Self> {
        let system_path = dir.join(format!("system_prompt_{version}.txt"));
        let system_prompt = fs::read_to_string(&system_path).map_err(|e| {
            KestrelError::config(format!("cannot read {}: {e}", system_path.display()))
        })?;
        if system_prompt.trim().is_empty() {
            return Err(KestrelError::config(format!(
                "system prompt {} is empty",
                system_path.display()
            )));
        }

        let examples_path = dir.join(format!("few_shot_examples_{version}.json"));
        let few_shot: Vec<FewShotExample> = serde_json::from_str(
            &fs::read_to_string(&examples_path).map_err(|e| {
                KestrelError::config(format!("cannot read {}: {e}", examples_path.display()))
            })?,
        )
        .map_err(|e| KestrelError::config(format!("invalid few-shot file: {e}")))?;
        if few_shot.is_empty() {
            return Err(KestrelError::config("few-shot example file is empty"));
        }

        Ok(Self {
            version: version.to_string(),
            system_prompt: system_prompt.trim().to_string(),
            few_shot,
        })
    }

    /// The prompt version identifier.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Assemble the chat messages for one escalated query.
    pub fn build(
        &self,
        query: &str,
        hint: Option<&RuleHint>,
        context: &ContextSnapshot,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.few_shot.len() * 2 + 2);
        messages.push(ChatMessage::system(&self.system_prompt));

        for example in &self.few_shot {
            messages.push(ChatMessage::user(&example.user));
            messages.push(ChatMessage::assistant(&example.assistant));
        }

        let mut user = String::new();
        if !context.recent_turns.is_empty() {
            user.push_str("Recent conversation:\n");
            for turn in &context.recent_turns {
                user.push_str("- ");
                user.push_str(turn);
                user.push('\n');
            }
            user.push('\n');
        }
        if let Some(hint) = hint {
            user.push_str(&format!(
                "Rule-based guess: {} (confidence {:.2}).\n\n",
                hint.action_code, hint.confidence
            ));
        }
        user.push_str("Utterance: ");
        user.push_str(query);
        messages.push(ChatMessage::user(user));

        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::ActionCode;

    #[test]
    fn test_default_build() {
        let library = PromptLibrary::default();
        assert_eq!(library.version(), "v1");

        let messages = library.build("red shoes please", None, &ContextSnapshot::default());
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("action code"));
        // 3 few-shot pairs + system + user.
        assert_eq!(messages.len(), 8);
        assert!(messages.last().unwrap().content.contains("red shoes please"));
    }

    #[test]
    fn test_hint_and_context_included() {
        let library = PromptLibrary::default();
        let hint = RuleHint {
            action_code: ActionCode::from("SEARCH_PRODUCT"),
            confidence: 0.45,
            next_best_confidence: Some(0.40),
        };
        let context = ContextSnapshot {
            session_id: Some("s".to_string()),
            user_id: None,
            recent_turns: vec!["show me sneakers".to_string()],
        };
        let messages = library.build("the red ones", Some(&hint), &context);
        let last = &messages.last().unwrap().content;
        assert!(last.contains("SEARCH_PRODUCT"));
        assert!(last.contains("show me sneakers"));
        assert!(last.contains("the red ones"));
    }

    #[test]
    fn test_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("system_prompt_v2.txt"), "classify things").unwrap();
        fs::write(
            dir.path().join("few_shot_examples_v2.json"),
            r#"[{"user": "hi", "assistant": "{}"}]"#,
        )
        .unwrap();

        let library = PromptLibrary::from_dir(dir.path(), "v2").unwrap();
        assert_eq!(library.version(), "v2");
        let messages = library.build("x", None, &ContextSnapshot::default());
        assert_eq!(messages.len(), 4);
    }

    #[test]
    fn test_from_dir_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PromptLibrary::from_dir(dir.path(), "v9").is_err());
    }
}
