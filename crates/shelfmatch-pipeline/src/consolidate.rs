//! Consolidation of tiered classifications into at most one final match.
//!
//! Decision table over the tier counts for one item:
//!
//! | identical | almost_same | outcome                                        |
//! |-----------|-------------|------------------------------------------------|
//! | ≥ 1       | any         | highest-confidence identical; almost_same ignored |
//! | 0         | 1           | the single almost_same is promoted              |
//! | 0         | ≥ 2         | ambiguous — no selection                        |
//! | 0         | 0           | no selection                                    |
//!
//! A single close variant is very likely the correct product when no exact
//! match exists; two or more close variants are genuinely ambiguous and are
//! never auto-resolved — silently picking the wrong size or flavor is worse
//! than deferring to manual review.

use shelfmatch_core::{ClassifiedCandidate, MatchTier, SelectedMatch, SelectionMethod};

/// Applies the consolidation decision table to one item's classified
/// candidates. Ties between equal-confidence identical candidates resolve
/// to the first in classification order, keeping re-runs deterministic.
#[must_use]
pub fn consolidate(classified: &[ClassifiedCandidate]) -> Option<SelectedMatch> {
    let best_identical = classified
        .iter()
        .filter(|c| c.tier == MatchTier::Identical)
        .fold(None::<&ClassifiedCandidate>, |best, candidate| match best {
            Some(current) if current.confidence >= candidate.confidence => Some(current),
            _ => Some(candidate),
        });

    if let Some(winner) = best_identical {
        return Some(to_selection(winner));
    }

    let almost_same: Vec<&ClassifiedCandidate> = classified
        .iter()
        .filter(|c| c.tier == MatchTier::AlmostSame)
        .collect();

    match almost_same.as_slice() {
        [only] => Some(to_selection(only)),
        [] => None,
        several => {
            tracing::debug!(
                count = several.len(),
                "multiple almost_same candidates — deferring to manual resolution"
            );
            None
        }
    }
}

fn to_selection(candidate: &ClassifiedCandidate) -> SelectedMatch {
    SelectedMatch {
        catalog_key: candidate.product.catalog_key.clone(),
        tier: candidate.tier,
        confidence: candidate.confidence,
        visual_similarity: candidate.visual_similarity,
        reasoning: candidate.reasoning.clone(),
        method: SelectionMethod::Consolidation,
    }
}
