//! Joint multi-candidate selection: interpreting the vision service's
//! single-call verdict under the two-step policy.
//!
//! The service is instructed to score every candidate's visual similarity
//! and pick one; the same policy is re-applied here over the reported
//! similarity list, so a verdict that contradicts its own scores cannot
//! smuggle in an ineligible pick. Visual similarity is the primary identity
//! signal; extracted metadata only ever tie-breaks between candidates that
//! already look right.

use shelfmatch_core::{
    ItemMetadata, MatchTier, ScoredCandidate, SelectedMatch, SelectionMethod,
};
use shelfmatch_vision::SelectionVerdict;

use crate::fuzzy;

/// Candidates below this visual similarity are never selectable.
pub const VISUAL_ELIGIBILITY_THRESHOLD: f64 = 0.70;

/// Resolves a joint-selection verdict into at most one final match.
///
/// - No candidate at or above the threshold → no selection.
/// - Exactly one eligible candidate → selected regardless of minor metadata
///   mismatches.
/// - Several eligible → the service's pick is honored when it is itself
///   eligible; otherwise the fuzzy metadata tie-break decides locally.
#[must_use]
pub fn resolve_selection(
    metadata: &ItemMetadata,
    candidates: &[ScoredCandidate],
    verdict: &SelectionVerdict,
) -> Option<SelectedMatch> {
    let eligible: Vec<usize> = verdict
        .candidate_similarities
        .iter()
        .enumerate()
        .filter(|(_, similarity)| **similarity >= VISUAL_ELIGIBILITY_THRESHOLD)
        .map(|(index, _)| index)
        .collect();

    let picked = match eligible.as_slice() {
        [] => None,
        [only] => Some(*only),
        several => match verdict.selected_index {
            Some(index) if several.contains(&index) => Some(index),
            _ => {
                if verdict.selected_index.is_some() {
                    tracing::warn!(
                        selected_index = ?verdict.selected_index,
                        "service pick is not in the eligible set — tie-breaking locally"
                    );
                }
                tie_break(metadata, candidates, several, &verdict.candidate_similarities)
            }
        },
    }?;

    let candidate = &candidates[picked].product;
    let service_pick = verdict.selected_index == Some(picked);

    let (tier, confidence, reasoning) = if service_pick {
        let tier = if verdict.brand_match && verdict.size_match && verdict.flavor_match {
            MatchTier::Identical
        } else {
            MatchTier::AlmostSame
        };
        (tier, verdict.confidence, verdict.reasoning.clone())
    } else {
        // Local pick: derive agreement from metadata and use the reported
        // similarity as the confidence stand-in.
        let tier = if local_agreement(metadata, &candidates[picked]) {
            MatchTier::Identical
        } else {
            MatchTier::AlmostSame
        };
        let similarity = verdict.candidate_similarities[picked];
        (
            tier,
            similarity,
            format!(
                "selected by metadata tie-break among {} visually eligible candidates",
                eligible_count(&verdict.candidate_similarities)
            ),
        )
    };

    Some(SelectedMatch {
        catalog_key: candidate.catalog_key.clone(),
        tier,
        confidence,
        visual_similarity: verdict.candidate_similarities[picked],
        reasoning,
        method: SelectionMethod::DirectSelection,
    })
}

fn eligible_count(similarities: &[f64]) -> usize {
    similarities
        .iter()
        .filter(|s| **s >= VISUAL_ELIGIBILITY_THRESHOLD)
        .count()
}

/// Fuzzy metadata tie-break over the eligible set. Each criterion only
/// narrows when it leaves at least one survivor, so noisy extraction can
/// never empty the field; remaining ties resolve to the highest visual
/// similarity, first index winning exact ties.
fn tie_break(
    metadata: &ItemMetadata,
    candidates: &[ScoredCandidate],
    eligible: &[usize],
    similarities: &[f64],
) -> Option<usize> {
    let mut survivors: Vec<usize> = eligible.to_vec();

    if let Some(brand) = metadata.brand_value() {
        narrow(&mut survivors, |index| {
            let product = &candidates[index].product;
            product
                .brand
                .as_deref()
                .is_some_and(|candidate_brand| fuzzy::brands_match(brand, candidate_brand))
                || fuzzy::brands_match(brand, &product.title)
        });
    }

    let size = metadata.size_value();
    narrow(&mut survivors, |index| {
        fuzzy::sizes_compatible(size, candidates[index].product.size_text.as_deref())
    });

    if let Some(flavor) = metadata.flavor_value() {
        narrow(&mut survivors, |index| {
            title_mentions_flavor(&candidates[index].product.title, flavor)
        });
    }

    survivors
        .into_iter()
        .fold(None::<usize>, |best, index| match best {
            Some(current) if similarities[current] >= similarities[index] => Some(current),
            _ => Some(index),
        })
}

/// Applies a narrowing criterion, keeping the previous set when the
/// criterion would eliminate everyone.
fn narrow(survivors: &mut Vec<usize>, keep: impl Fn(usize) -> bool) {
    let narrowed: Vec<usize> = survivors.iter().copied().filter(|i| keep(*i)).collect();
    if !narrowed.is_empty() {
        *survivors = narrowed;
    }
}

fn title_mentions_flavor(title: &str, flavor: &str) -> bool {
    fuzzy::tokens(title)
        .iter()
        .any(|token| fuzzy::flavors_match(token, flavor))
        || fuzzy::flavors_match(title, flavor)
}

fn local_agreement(metadata: &ItemMetadata, candidate: &ScoredCandidate) -> bool {
    let brand_agrees = match (metadata.brand_value(), candidate.product.brand.as_deref()) {
        (Some(a), Some(b)) => fuzzy::brands_match(a, b),
        _ => false,
    };
    let size_agrees = fuzzy::sizes_compatible(
        metadata.size_value(),
        candidate.product.size_text.as_deref(),
    );
    let flavor_agrees = match metadata.flavor_value() {
        Some(flavor) => title_mentions_flavor(&candidate.product.title, flavor),
        None => true,
    };
    brand_agrees && size_agrees && flavor_agrees
}
