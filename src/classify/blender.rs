//! Hybrid score blending.
//!
//! Merges keyword and embedding candidates by action code into a single
//! weighted ranking. Whichever side scored higher contributes the match
//! metadata (matched text, match type) of the blended candidate.

use std::collections::BTreeMap;

use crate::taxonomy::ActionCode;

use super::types::{rank_candidates, Candidate, MatchSource};

/// Bonus applied when both matchers agree on a candidate.
pub const CONSENSUS_BONUS: f32 = 0.05;

/// Bonus applied when either component is individually very strong.
pub const CONFIDENCE_BONUS: f32 = 0.03;

/// Component score above which the confidence bonus applies.
pub const CONFIDENCE_BONUS_FLOOR: f32 = 0.90;

struct Merged {
    keyword: Option<Candidate>,
    embedding: Option<Candidate>,
}

/// Weighted blender over keyword and embedding candidates.
#[derive(Debug, Clone, Copy)]
pub struct Blender {
    kw_weight: f32,
    emb_weight: f32,
}

impl Blender {
    /// Create a blender with the given weights. Callers validate that
    /// weights sum to 1; the blender applies them as given.
    pub fn new(kw_weight: f32, emb_weight: f32) -> Self {
        Self {
            kw_weight,
            emb_weight,
        }
    }

    /// Blend two candidate lists into one ranking with `source = blended`.
    pub fn blend(
        &self,
        kw_candidates: Vec<Candidate>,
        emb_candidates: Vec<Candidate>,
    ) -> Vec<Candidate> {
        if kw_candidates.is_empty() && emb_candidates.is_empty() {
            return Vec::new();
        }

        // BTreeMap keeps the merge independent of input ordering.
        let mut merged: BTreeMap<ActionCode, Merged> = BTreeMap::new();
        for candidate in kw_candidates {
            let code = candidate.action_code.clone();
            merged
                .entry(code)
                .or_insert(Merged {
                    keyword: None,
                    embedding: None,
                })
                .keyword = Some(candidate);
        }
        for candidate in emb_candidates {
            let code = candidate.action_code.clone();
            merged
                .entry(code)
                .or_insert(Merged {
                    keyword: None,
                    embedding: None,
                })
                .embedding = Some(candidate);
        }

        let mut blended: Vec<Candidate> = merged
            .into_iter()
            .map(|(code, sides)| self.blend_one(code, sides))
            .collect();
        blended.sort_by(rank_candidates);
        blended
    }

    fn blend_one(&self, code: ActionCode, sides: Merged) -> Candidate {
        let k = sides.keyword.as_ref().map(|c| c.score).unwrap_or(0.0);
        let e = sides.embedding.as_ref().map(|c| c.score).unwrap_or(0.0);

        let mut score = self.kw_weight * k + self.emb_weight * e;
        if k > 0.0 && e > 0.0 {
            score += CONSENSUS_BONUS;
        }
        if k.max(e) >= CONFIDENCE_BONUS_FLOOR {
            score += CONFIDENCE_BONUS;
        }
        score = score.clamp(0.0, 1.0);

        // Metadata comes from the stronger side.
        let base = if k >= e {
            sides.keyword.or(sides.embedding)
        } else {
            sides.embedding.or(sides.keyword)
        };

        let mut candidate = Candidate::new(code, score, MatchSource::Blended).with_components(k, e);
        if let Some(base) = base {
            candidate.match_type = base.match_type;
            candidate.matched_text = base.matched_text;
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::types::MatchType;

    fn kw(code: &str, score: f32) -> Candidate {
        Candidate::new(ActionCode::from(code), score, MatchSource::Keyword)
            .with_match_type(MatchType::Exact)
            .with_matched_text(code.to_lowercase())
    }

    fn emb(code: &str, score: f32) -> Candidate {
        Candidate::new(ActionCode::from(code), score, MatchSource::Embedding)
    }

    #[test]
    fn test_weighted_sum_with_consensus() {
        // 0.6*0.55 + 0.4*0.80 + 0.05 = 0.88
        let blender = Blender::new(0.6, 0.4);
        let blended = blender.blend(vec![kw("VIEW_CART", 0.55)], vec![emb("VIEW_CART", 0.80)]);

        assert_eq!(blended.len(), 1);
        assert!((blended[0].score - 0.88).abs() < 1e-6);
        assert_eq!(blended[0].source, MatchSource::Blended);
        let components = blended[0].component_scores.unwrap();
        assert!((components.keyword - 0.55).abs() < 1e-6);
        assert!((components.embedding - 0.80).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_bonus() {
        // 0.6*0.95 + 0.4*0.0 = 0.57, +0.03 strong-component bonus = 0.60.
        let blender = Blender::new(0.6, 0.4);
        let blended = blender.blend(vec![kw("ADD_TO_CART", 0.95)], vec![]);
        assert!((blended[0].score - 0.60).abs() < 1e-6);
    }

    #[test]
    fn test_clamped_to_one() {
        let blender = Blender::new(0.6, 0.4);
        let blended = blender.blend(vec![kw("A", 1.0)], vec![emb("A", 1.0)]);
        assert!((blended[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_sided_pass_through() {
        let blender = Blender::new(0.6, 0.4);

        let blended = blender.blend(vec![], vec![emb("TRACK_ORDER", 0.7)]);
        assert_eq!(blended.len(), 1);
        assert_eq!(blended[0].source, MatchSource::Blended);
        let components = blended[0].component_scores.unwrap();
        assert_eq!(components.keyword, 0.0);
        assert!((components.embedding - 0.7).abs() < 1e-6);

        assert!(blender.blend(vec![], vec![]).is_empty());
    }

    #[test]
    fn test_metadata_from_stronger_side() {
        let blender = Blender::new(0.5, 0.5);
        let blended = blender.blend(vec![kw("VIEW_CART", 0.9)], vec![emb("VIEW_CART", 0.3)]);
        assert_eq!(blended[0].match_type, Some(MatchType::Exact));
        assert_eq!(blended[0].matched_text.as_deref(), Some("view_cart"));
    }

    #[test]
    fn test_sorted_descending_with_deterministic_ties() {
        let blender = Blender::new(0.5, 0.5);
        let blended = blender.blend(
            vec![kw("B_CODE", 0.6), kw("A_CODE", 0.6)],
            vec![emb("C_CODE", 0.9)],
        );

        let codes: Vec<_> = blended.iter().map(|c| c.action_code.as_str()).collect();
        // C blends lower than the kw pair? C: 0.5*0.9=0.45; A/B: 0.5*0.6=0.30.
        assert_eq!(codes[0], "C_CODE");
        assert_eq!(codes[1], "A_CODE");
        assert_eq!(codes[2], "B_CODE");
    }
}
