//! Keyword matching stage.
//!
//! Scores every (segment, pattern) pair, keeps the best score per action
//! code, and returns the top candidates in deterministic order. The whole
//! stage is synchronous and lock-free over the immutable compiled index.

use ahash::{AHashMap, AHashSet};

use crate::analysis::NormalizedQuery;
use crate::classify::types::{rank_candidates, Candidate, MatchSource, MatchType};
use crate::taxonomy::ActionCode;

use super::loader::{KeywordEntry, KeywordPattern};

/// The best match found so far for one action code.
struct BestMatch {
    score: f32,
    match_type: MatchType,
    matched_text: String,
}

/// Immutable keyword matcher over compiled dictionary entries.
pub struct KeywordMatcher {
    entries: Vec<KeywordEntry>,
}

impl KeywordMatcher {
    /// Build a matcher from compiled entries.
    pub fn new(entries: Vec<KeywordEntry>) -> Self {
        Self { entries }
    }

    /// Number of loaded entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Total number of compiled patterns.
    pub fn pattern_count(&self) -> usize {
        self.entries.iter().map(|e| e.patterns.len()).sum()
    }

    /// Match a normalized query, returning up to `top_n` candidates with
    /// `source = keyword`, sorted descending.
    pub fn search(&self, query: &NormalizedQuery, top_n: usize) -> Vec<Candidate> {
        if query.is_empty() || top_n == 0 {
            return Vec::new();
        }

        let segments: Vec<SegmentView> = query
            .segments
            .iter()
            .map(|s| SegmentView::new(s))
            .collect();

        let mut best: AHashMap<ActionCode, BestMatch> = AHashMap::new();

        for entry in &self.entries {
            let priority = entry.priority as f32;
            for pattern in &entry.patterns {
                for segment in &segments {
                    if let Some((score, match_type, text)) =
                        score_pair(pattern, segment, priority)
                    {
                        record(&mut best, &entry.action_code, score, match_type, text);
                    }
                }
            }
        }

        let mut candidates: Vec<Candidate> = best
            .into_iter()
            .map(|(code, m)| {
                Candidate::new(code, m.score, MatchSource::Keyword)
                    .with_match_type(m.match_type)
                    .with_matched_text(m.matched_text)
            })
            .collect();
        candidates.sort_by(rank_candidates);
        candidates.truncate(top_n);
        candidates
    }
}

/// Per-segment view with a token set for overlap checks.
struct SegmentView<'a> {
    text: &'a str,
    token_set: AHashSet<&'a str>,
}

impl<'a> SegmentView<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            token_set: text.split_whitespace().collect(),
        }
    }
}

/// Score one (pattern, segment) pair. Returns the best applicable rule:
/// exact, then regex, then token-overlap partial.
fn score_pair(
    pattern: &KeywordPattern,
    segment: &SegmentView<'_>,
    priority: f32,
) -> Option<(f32, MatchType, String)> {
    match pattern {
        KeywordPattern::Literal { normalized, tokens } => {
            if segment.text == normalized {
                return Some((1.0 / priority, MatchType::Exact, normalized.clone()));
            }
            let overlap = tokens
                .iter()
                .filter(|t| segment.token_set.contains(t.as_str()))
                .count();
            if overlap > 0 {
                let score = (overlap as f32 / tokens.len() as f32) / priority;
                return Some((score, MatchType::Partial, normalized.clone()));
            }
            None
        }
        KeywordPattern::Regex {
            regex,
            pattern_len,
            tokens,
        } => {
            if let Some(found) = regex.find(segment.text) {
                let match_len = found.as_str().chars().count();
                let score = (match_len as f32 / *pattern_len as f32).min(1.0) / priority;
                return Some((score, MatchType::Regex, found.as_str().to_string()));
            }
            let overlap = tokens
                .iter()
                .filter(|t| segment.token_set.contains(t.as_str()))
                .count();
            if overlap > 0 {
                let score = (overlap as f32 / tokens.len() as f32) / priority;
                return Some((score, MatchType::Partial, tokens.join(" ")));
            }
            None
        }
    }
}

fn record(
    best: &mut AHashMap<ActionCode, BestMatch>,
    code: &ActionCode,
    score: f32,
    match_type: MatchType,
    matched_text: String,
) {
    match best.get_mut(code) {
        Some(current) => {
            let better = score > current.score
                || (score == current.score && match_type.rank() > current.match_type.rank());
            if better {
                *current = BestMatch {
                    score,
                    match_type,
                    matched_text,
                };
            }
        }
        None => {
            best.insert(
                code.clone(),
                BestMatch {
                    score,
                    match_type,
                    matched_text,
                },
            );
        }
    }
}
