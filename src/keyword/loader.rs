//! Keyword dictionary loading and pattern classification.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ahash::AHashSet;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use tracing::warn;

use crate::analysis::normalizer::normalize_uncached;
use crate::error::{KestrelError, Result};
use crate::taxonomy::ActionCode;

/// Raw shape of one dictionary file entry.
#[derive(Debug, Deserialize)]
struct RawEntry {
    priority: i64,
    keywords: Vec<String>,
}

/// A compiled keyword pattern.
#[derive(Debug, Clone)]
pub enum KeywordPattern {
    /// Case-insensitive, whitespace-normalized phrase, pre-tokenized for
    /// partial matching.
    Literal {
        normalized: String,
        tokens: Vec<String>,
    },
    /// Compiled case-insensitive regular expression.
    Regex {
        regex: Regex,
        /// Character length of the source pattern, for score scaling.
        pattern_len: usize,
        /// Word tokens of the source pattern, for the token-overlap
        /// partial rule when the expression itself does not match.
        tokens: Vec<String>,
    },
}

/// All patterns for one action code from one dictionary file.
#[derive(Debug, Clone)]
pub struct KeywordEntry {
    /// Target action code.
    pub action_code: ActionCode,
    /// File-local priority, 1 (highest) through 9 (lowest).
    pub priority: u8,
    /// Compiled patterns.
    pub patterns: Vec<KeywordPattern>,
}

/// Whether a raw pattern should be treated as a regular expression.
///
/// Detection follows the dictionary convention: `\b`, `.*`, or any other
/// regex metacharacter marks a pattern as a regex.
pub fn is_regex_pattern(pattern: &str) -> bool {
    pattern.contains("\\b")
        || pattern.contains(".*")
        || pattern
            .chars()
            .any(|c| matches!(c, '[' | ']' | '(' | ')' | '|' | '^' | '$' | '*' | '+' | '?' | '{' | '}' | '\\'))
}

/// Load one dictionary file into compiled entries.
///
/// A malformed file is an error; the directory loader downgrades that to a
/// warning so the service can start without it.
pub fn load_keyword_file(path: &Path) -> Result<Vec<KeywordEntry>> {
    let content = fs::read_to_string(path)
        .map_err(|e| KestrelError::keyword_load(format!("cannot read {}: {e}", path.display())))?;
    let raw: BTreeMap<String, RawEntry> = serde_json::from_str(&content).map_err(|e| {
        KestrelError::keyword_load(format!("invalid keyword file {}: {e}", path.display()))
    })?;

    let mut entries = Vec::new();
    for (code, entry) in raw {
        if !(1..=9).contains(&entry.priority) {
            return Err(KestrelError::keyword_load(format!(
                "{}: priority {} for {code} outside 1..=9",
                path.display(),
                entry.priority
            )));
        }

        let mut seen = AHashSet::new();
        let mut patterns = Vec::new();
        for keyword in &entry.keywords {
            let trimmed = keyword.trim();
            if trimmed.is_empty() {
                return Err(KestrelError::keyword_load(format!(
                    "{}: empty pattern under {code}",
                    path.display()
                )));
            }
            // De-duplicate case-insensitively within the file.
            if !seen.insert(trimmed.to_lowercase()) {
                continue;
            }
            if let Some(pattern) = compile_pattern(trimmed) {
                patterns.push(pattern);
            }
        }

        if !patterns.is_empty() {
            entries.push(KeywordEntry {
                action_code: ActionCode::new(code),
                priority: entry.priority as u8,
                patterns,
            });
        }
    }
    Ok(entries)
}

/// Load every `*.json` dictionary under `dir`.
///
/// Files that fail to parse are skipped with a warning so one bad
/// dictionary cannot take the whole matcher down.
pub fn load_keyword_dir(dir: &Path) -> Result<Vec<KeywordEntry>> {
    let mut paths: Vec<_> = fs::read_dir(dir)
        .map_err(|e| KestrelError::keyword_load(format!("cannot read {}: {e}", dir.display())))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut entries = Vec::new();
    for path in paths {
        match load_keyword_file(&path) {
            Ok(mut loaded) => entries.append(&mut loaded),
            Err(e) => warn!(file = %path.display(), error = %e, "skipping keyword file"),
        }
    }
    Ok(entries)
}

fn compile_pattern(raw: &str) -> Option<KeywordPattern> {
    if is_regex_pattern(raw) {
        match RegexBuilder::new(raw).case_insensitive(true).build() {
            Ok(regex) => Some(KeywordPattern::Regex {
                regex,
                pattern_len: raw.chars().count(),
                tokens: regex_pattern_tokens(raw),
            }),
            Err(e) => {
                warn!(pattern = raw, error = %e, "dropping uncompilable keyword regex");
                None
            }
        }
    } else {
        let normalized = normalize_uncached(raw);
        if normalized.text.is_empty() {
            return None;
        }
        Some(KeywordPattern::Literal {
            normalized: normalized.text.clone(),
            tokens: normalized.tokens,
        })
    }
}

/// Word tokens of a regex source, tokenized the same way literal
/// patterns are. Escape sequences and metacharacters are blanked first,
/// so `\badd to (cart|basket)\b` yields `[add, to, cart, basket]`.
fn regex_pattern_tokens(raw: &str) -> Vec<String> {
    let mut cleaned = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            // Drop the escape and whatever it escapes.
            chars.next();
            cleaned.push(' ');
        } else if ch.is_alphanumeric() || ch.is_whitespace() {
            cleaned.push(ch);
        } else {
            cleaned.push(' ');
        }
    }
    normalize_uncached(&cleaned).tokens
}
