//! Text analysis pipeline.
//!
//! All matchers consume the output of [`Normalizer::normalize`]: a
//! canonical lowercase string, its word tokens, and the conjunction- and
//! punctuation-delimited segments of the utterance.

pub mod normalizer;

pub use normalizer::{NormalizedQuery, Normalizer};
