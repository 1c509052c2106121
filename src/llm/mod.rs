//! LLM escalation path: prompt assembly, the resilient client, response
//! parsing, and confidence calibration.

pub mod calibration;
pub mod circuit;
pub mod client;
pub mod parser;
pub mod prompt;
pub mod types;

pub use calibration::ConfidenceCalibrator;
pub use circuit::CircuitBreaker;
pub use client::{EscalationRequest, HttpLlmClient, LlmClient, ResilientLlmClient, RetryPolicy};
pub use parser::parse_llm_response;
pub use prompt::PromptLibrary;
pub use types::{ChatMessage, Completion, CompletionRequest, LlmClassification, LlmErrorKind, LlmUsage};
