//! Tiered classification driver: one vision call per surviving candidate.

use shelfmatch_core::{ClassifiedCandidate, ItemMetadata, ScoredCandidate};
use shelfmatch_vision::{VisionClient, VisionError};

use crate::error::PipelineError;

/// Classifies each surviving candidate against the item crop.
///
/// Candidates are classified sequentially; cross-item parallelism is the
/// batch orchestrator's job and the vision service's rate limit is budgeted
/// at that level.
///
/// A malformed or unparsable verdict fails only that candidate: it is
/// skipped with a warning and the remaining candidates are still
/// considered. An empty result is the caller's "no match", not an error.
///
/// # Errors
///
/// Returns [`PipelineError::RateLimited`] or
/// [`PipelineError::Classification`] when the service throttles us or
/// transport fails after retries — those fail the whole item.
pub async fn classify_candidates(
    vision: &VisionClient,
    crop_url: &str,
    metadata: &ItemMetadata,
    scored: &[ScoredCandidate],
) -> Result<Vec<ClassifiedCandidate>, PipelineError> {
    let mut classified = Vec::with_capacity(scored.len());

    for candidate in scored {
        match vision.classify_pair(crop_url, metadata, &candidate.product).await {
            Ok(verdict) => {
                classified.push(ClassifiedCandidate {
                    product: candidate.product.clone(),
                    tier: verdict.tier,
                    confidence: verdict.confidence,
                    visual_similarity: verdict.visual_similarity,
                    reasoning: verdict.reasoning,
                });
            }
            Err(err @ VisionError::MalformedResponse { .. }) => {
                tracing::warn!(
                    catalog_key = %candidate.product.catalog_key,
                    error = %err,
                    "unusable classification verdict — skipping candidate"
                );
            }
            Err(other) => return Err(other.into()),
        }
    }

    Ok(classified)
}
