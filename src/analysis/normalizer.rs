//! Query normalization.
//!
//! Normalization is pure: the same input always yields bitwise-identical
//! output, and `normalize(normalize(x)) == normalize(x)`. Results are
//! memoized in a bounded LRU because the request path normalizes every
//! utterance before any matching work.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::util::LruCache;

/// Punctuation that both gets stripped and marks a segment boundary.
const SEGMENT_PUNCTUATION: &[char] = &['!', '?', '.', ',', ';', ':'];

/// Default capacity of the normalization memo.
pub const DEFAULT_MEMO_CAPACITY: usize = 512;

/// The canonical form of an utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    /// Whitespace-collapsed, lowercased, symbol-expanded text.
    pub text: String,
    /// Maximal alphanumeric runs of `text`, in order.
    pub tokens: Vec<String>,
    /// Sub-utterances split on the word "and" and on original punctuation.
    pub segments: Vec<String>,
}

impl NormalizedQuery {
    /// Number of word tokens.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Whether normalization produced no usable text.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Normalizer with a bounded memo of prior results.
pub struct Normalizer {
    memo: Mutex<LruCache<String, Arc<NormalizedQuery>>>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MEMO_CAPACITY)
    }
}

impl Normalizer {
    /// Create a normalizer with the given memo capacity (minimum 128).
    pub fn new(memo_capacity: usize) -> Self {
        Self {
            memo: Mutex::new(LruCache::new(memo_capacity.max(128))),
        }
    }

    /// Normalize an utterance, reusing a memoized result when available.
    pub fn normalize(&self, text: &str) -> Arc<NormalizedQuery> {
        {
            let mut memo = self.memo.lock();
            if let Some(hit) = memo.get(&text.to_string()) {
                return Arc::clone(hit);
            }
        }

        let result = Arc::new(normalize_uncached(text));
        self.memo.lock().insert(text.to_string(), Arc::clone(&result));
        result
    }

    /// Number of memoized entries (for metrics).
    pub fn memo_len(&self) -> usize {
        self.memo.lock().len()
    }
}

/// Normalize without touching the memo.
pub fn normalize_uncached(text: &str) -> NormalizedQuery {
    let lower = text.to_lowercase();

    // One pass over the characters builds the raw normalized text while
    // recording segment boundaries where punctuation was stripped.
    // '\u{1}' never survives normalization, so it is safe as a marker.
    let mut raw = String::with_capacity(lower.len() + 8);
    for ch in lower.chars() {
        match ch {
            '&' => raw.push_str(" and "),
            '+' => raw.push_str(" plus "),
            '@' => raw.push_str(" at "),
            '#' => raw.push_str(" hash "),
            '$' => raw.push_str(" dollar "),
            '%' => raw.push_str(" percent "),
            '\'' | '"' => {}
            '-' | '_' => raw.push(' '),
            c if SEGMENT_PUNCTUATION.contains(&c) => raw.push('\u{1}'),
            c if c.is_whitespace() => raw.push(' '),
            c => raw.push(c),
        }
    }

    let normalized = collapse_whitespace(&raw.replace('\u{1}', " "));
    let tokens = tokenize(&normalized);

    let mut segments = Vec::new();
    for piece in raw.split('\u{1}') {
        let mut current: Vec<&str> = Vec::new();
        for word in piece.split_whitespace() {
            if word == "and" {
                push_segment(&mut segments, &current);
                current.clear();
            } else {
                current.push(word);
            }
        }
        push_segment(&mut segments, &current);
    }

    NormalizedQuery {
        text: normalized,
        tokens,
        segments,
    }
}

fn push_segment(segments: &mut Vec<String>, words: &[&str]) {
    if !words.is_empty() {
        segments.push(words.join(" "));
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split normalized text into maximal alphanumeric runs.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            current.push(ch);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
