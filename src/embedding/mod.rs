//! Embedding encoders and the semantic matching stage.
//!
//! The matcher compares query embeddings against per-action-code reference
//! vectors (mean of example-phrase encodings, unit-normalized). Encoders
//! are pluggable behind [`TextEncoder`]; the default is a deterministic
//! hashed TF-IDF encoder, with a Candle BERT encoder available behind the
//! `embeddings-candle` feature.

#[cfg(feature = "embeddings-candle")]
pub mod candle_encoder;
pub mod encoder;
pub mod matcher;
pub mod tfidf;

pub use encoder::TextEncoder;
pub use matcher::EmbeddingMatcher;
pub use tfidf::HashedTfIdfEncoder;
