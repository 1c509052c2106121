//! Keyword dictionaries and the keyword matching stage.
//!
//! Dictionaries are JSON files of `{ ACTION_CODE: { "priority": 1..9,
//! "keywords": [...] } }`. Patterns are classified at load time as literal
//! phrases or regular expressions; the matcher scores normalized query
//! segments against both.

pub mod loader;
pub mod matcher;

pub use loader::{load_keyword_dir, load_keyword_file, KeywordEntry, KeywordPattern};
pub use matcher::KeywordMatcher;
