//! Intent taxonomy: the closed set of action codes and their definitions.
//!
//! The taxonomy is data, loaded once at startup from JSON definition files
//! and immutable for the lifetime of a configuration variant. Everything
//! downstream (keyword index, reference embeddings, LLM prompt examples)
//! is derived from it.

pub mod loader;
pub mod types;

pub use loader::load_taxonomy_dir;
pub use types::{ActionCode, EntityKind, IntentDefinition, IntentPriority, Taxonomy};
