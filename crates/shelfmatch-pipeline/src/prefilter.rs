//! Text-similarity pre-filter: narrows the raw candidate list before any
//! vision call is spent.
//!
//! Scoring uses two signals — brand (weight 0.70) and retailer tag (weight
//! 0.30) — normalized by the weight of whichever signals were actually
//! available, then thresholded at 0.85. Size and flavor are deliberately
//! excluded: size text extracted from small shelf-tag fonts is unreliable
//! and inconsistently formatted, and strict size matching discarded valid
//! candidates. The downstream visual comparison handles size variants more
//! robustly than text ever did.

use std::collections::HashSet;

use shelfmatch_core::{CandidateProduct, ItemMetadata, ScoredCandidate};

use crate::fuzzy::{normalize, tokens};

/// Candidates scoring below this normalized threshold are dropped.
pub const SIMILARITY_THRESHOLD: f64 = 0.85;

const BRAND_WEIGHT: f64 = 0.70;
const RETAILER_WEIGHT: f64 = 0.30;
const SUBSTRING_SCORE: f64 = 0.8;

/// Scores each candidate against the extracted metadata and returns the
/// subset at or above [`SIMILARITY_THRESHOLD`], preserving the catalog's
/// ranking order.
///
/// `known_retailer` is the canonical retailer tag of the source image when
/// the store is known. A candidate that lists retailer tags disjoint from it
/// is excluded outright, not merely penalized. An empty candidate list
/// yields an empty result.
#[must_use]
pub fn filter_candidates(
    metadata: &ItemMetadata,
    known_retailer: Option<&str>,
    candidates: Vec<CandidateProduct>,
) -> Vec<ScoredCandidate> {
    candidates
        .into_iter()
        .filter_map(|candidate| score_candidate(metadata, known_retailer, candidate))
        .filter(|scored| scored.similarity_score >= SIMILARITY_THRESHOLD)
        .collect()
}

fn score_candidate(
    metadata: &ItemMetadata,
    known_retailer: Option<&str>,
    candidate: CandidateProduct,
) -> Option<ScoredCandidate> {
    let mut score = 0.0_f64;
    let mut achievable = 0.0_f64;
    let mut reasons: Vec<String> = Vec::new();

    let extracted_brand = metadata.brand_value().map(str::trim).filter(|b| !b.is_empty());
    if let Some(brand) = extracted_brand {
        achievable += BRAND_WEIGHT;
        let (similarity, reason) = brand_similarity(brand, &candidate);
        score += BRAND_WEIGHT * similarity;
        if let Some(reason) = reason {
            reasons.push(reason);
        }
    }

    if let Some(retailer) = known_retailer {
        if !candidate.retailers.is_empty() {
            let retailer_norm = normalize(retailer);
            let listed = candidate
                .retailers
                .iter()
                .any(|tag| normalize(tag) == retailer_norm);
            if listed {
                achievable += RETAILER_WEIGHT;
                score += RETAILER_WEIGHT;
                reasons.push(format!("candidate is listed at retailer \"{retailer}\""));
            } else {
                // Known store, candidate carries tags, none match: this
                // product is not sold where the photo was taken.
                return None;
            }
        }
        // No tags on the candidate: the retailer signal is unavailable for
        // it and contributes to neither score nor achievable weight.
    }

    if achievable <= 0.0 {
        return None;
    }

    let normalized = score / achievable;
    Some(ScoredCandidate {
        product: candidate,
        similarity_score: normalized,
        match_reasons: reasons,
    })
}

/// Brand similarity against the candidate's brand and title fields: the
/// maximum of exact match (1.0), substring containment (0.8), and token
/// overlap, case- and punctuation-insensitive.
fn brand_similarity(extracted: &str, candidate: &CandidateProduct) -> (f64, Option<String>) {
    let extracted_norm = normalize(extracted);
    if extracted_norm.is_empty() {
        return (0.0, None);
    }

    let mut best = 0.0_f64;
    let mut best_reason: Option<String> = None;

    let fields = [
        ("brand", candidate.brand.as_deref()),
        ("title", Some(candidate.title.as_str())),
    ];

    for (field_name, field) in fields {
        let Some(field) = field else { continue };
        let field_norm = normalize(field);
        if field_norm.is_empty() {
            continue;
        }

        let (similarity, reason) = if extracted_norm == field_norm {
            (1.0, format!("brand \"{extracted}\" exactly matches candidate {field_name}"))
        } else if field_norm.contains(&extracted_norm) || extracted_norm.contains(&field_norm) {
            (
                SUBSTRING_SCORE,
                format!("brand \"{extracted}\" is contained in candidate {field_name}"),
            )
        } else {
            let overlap = token_overlap(&extracted_norm, &field_norm);
            (
                overlap,
                format!("brand \"{extracted}\" shares tokens with candidate {field_name}"),
            )
        };

        if similarity > best {
            best = similarity;
            best_reason = (similarity > 0.0).then_some(reason);
        }
    }

    (best, best_reason)
}

/// Jaccard overlap between the token sets of two pre-normalized strings.
fn token_overlap(a: &str, b: &str) -> f64 {
    let a_tokens: HashSet<String> = tokens(a).into_iter().collect();
    let b_tokens: HashSet<String> = tokens(b).into_iter().collect();
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return 0.0;
    }
    let intersection = a_tokens.intersection(&b_tokens).count();
    let union = a_tokens.union(&b_tokens).count();
    #[allow(clippy::cast_precision_loss)]
    let overlap = intersection as f64 / union as f64;
    overlap
}
