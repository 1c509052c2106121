//! The confidence gate.
//!
//! Two-value gate over the blended ranking: an absolute threshold on the
//! top score plus a minimum gap between the top two. Both values come from
//! the active configuration variant.

use super::types::Candidate;

/// Outcome of the confidence evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceVerdict {
    /// Top candidate clears the threshold with a sufficient gap.
    Confident,
    /// Strong top candidate but the runner-up is too close, or two
    /// candidates both clear the threshold.
    Ambiguous,
    /// Nothing clears the threshold.
    Unclear,
}

/// Evaluate a ranking (sorted descending) against the gate values.
pub fn evaluate_confidence(
    candidates: &[Candidate],
    confidence_threshold: f32,
    gap_threshold: f32,
) -> ConfidenceVerdict {
    let Some(top) = candidates.first() else {
        return ConfidenceVerdict::Unclear;
    };

    if top.score < confidence_threshold {
        return ConfidenceVerdict::Unclear;
    }

    match candidates.get(1) {
        None => ConfidenceVerdict::Confident,
        Some(second) => {
            let gap = top.score - second.score;
            if gap < gap_threshold || second.score >= confidence_threshold {
                ConfidenceVerdict::Ambiguous
            } else {
                ConfidenceVerdict::Confident
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::types::MatchSource;
    use crate::taxonomy::ActionCode;

    fn candidates(scores: &[f32]) -> Vec<Candidate> {
        scores
            .iter()
            .enumerate()
            .map(|(i, score)| {
                Candidate::new(
                    ActionCode::new(format!("CODE_{i}")),
                    *score,
                    MatchSource::Blended,
                )
            })
            .collect()
    }

    #[test]
    fn test_empty_is_unclear() {
        assert_eq!(
            evaluate_confidence(&[], 0.6, 0.05),
            ConfidenceVerdict::Unclear
        );
    }

    #[test]
    fn test_below_threshold_is_unclear() {
        assert_eq!(
            evaluate_confidence(&candidates(&[0.5, 0.2]), 0.6, 0.05),
            ConfidenceVerdict::Unclear
        );
    }

    #[test]
    fn test_single_strong_result_is_confident() {
        assert_eq!(
            evaluate_confidence(&candidates(&[0.8]), 0.6, 0.05),
            ConfidenceVerdict::Confident
        );
    }

    #[test]
    fn test_clear_gap_is_confident() {
        assert_eq!(
            evaluate_confidence(&candidates(&[0.8, 0.4]), 0.6, 0.05),
            ConfidenceVerdict::Confident
        );
    }

    #[test]
    fn test_small_gap_is_ambiguous() {
        assert_eq!(
            evaluate_confidence(&candidates(&[0.70, 0.68]), 0.6, 0.05),
            ConfidenceVerdict::Ambiguous
        );
    }

    #[test]
    fn test_two_above_threshold_is_ambiguous() {
        // Gap is large enough, but both clear the absolute threshold.
        assert_eq!(
            evaluate_confidence(&candidates(&[0.95, 0.70]), 0.6, 0.05),
            ConfidenceVerdict::Ambiguous
        );
    }

    #[test]
    fn test_gap_exactly_at_threshold_is_confident() {
        assert_eq!(
            evaluate_confidence(&candidates(&[0.70, 0.55]), 0.6, 0.15),
            ConfidenceVerdict::Confident
        );
    }
}
