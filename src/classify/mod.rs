//! The hybrid classification pipeline.
//!
//! Candidates flow keyword matcher → (priority short-circuit) → embedding
//! matcher → blender → confidence gate, orchestrated by the
//! [`engine::DecisionEngine`]. Everything here is synchronous and
//! allocation-light; suspension only happens past the gate (cache lookup,
//! queue enqueue).

pub mod blender;
pub mod confidence;
pub mod engine;
pub mod types;

pub use blender::Blender;
pub use confidence::{evaluate_confidence, ConfidenceVerdict};
pub use engine::{ClassifyOutcome, DecisionEngine};
pub use types::{
    Candidate, ClassificationResult, ComponentScores, MatchSource, MatchType, ResultStatus,
};
