//! Wire types for vision requests and validated response types.

use serde::{Deserialize, Serialize};
use shelfmatch_core::{CandidateProduct, ItemMetadata, MatchTier};

use crate::error::VisionError;

// ---------------------------------------------------------------------------
// Request shapes
// ---------------------------------------------------------------------------

/// Metadata subset forwarded to the vision service. Price and category are
/// omitted — they play no role in visual comparison.
#[derive(Debug, Serialize)]
pub(crate) struct WireMetadata<'a> {
    pub brand: Option<&'a str>,
    pub product_name: Option<&'a str>,
    pub size: Option<&'a str>,
    pub flavor: Option<&'a str>,
}

impl<'a> WireMetadata<'a> {
    pub(crate) fn from_metadata(metadata: &'a ItemMetadata) -> Self {
        Self {
            brand: metadata.brand_value(),
            product_name: metadata.product_name_value(),
            size: metadata.size_value(),
            flavor: metadata.flavor_value(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WireCandidate<'a> {
    pub catalog_key: &'a str,
    pub title: &'a str,
    pub brand: Option<&'a str>,
    pub size_text: Option<&'a str>,
    pub image_url: Option<&'a str>,
}

impl<'a> WireCandidate<'a> {
    pub(crate) fn from_product(product: &'a CandidateProduct) -> Self {
        Self {
            catalog_key: &product.catalog_key,
            title: &product.title,
            brand: product.brand.as_deref(),
            size_text: product.size_text.as_deref(),
            image_url: product.primary_image(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CompareRequest<'a> {
    pub item_image_url: &'a str,
    pub candidate_image_url: &'a str,
    pub item_metadata: WireMetadata<'a>,
    pub candidate: WireCandidate<'a>,
    pub instructions: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct SelectRequest<'a> {
    pub item_image_url: &'a str,
    pub item_metadata: WireMetadata<'a>,
    pub candidates: Vec<WireCandidate<'a>>,
    pub instructions: &'static str,
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct RawTierVerdict {
    pub match_tier: String,
    pub confidence: f64,
    pub visual_similarity: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// A validated pairwise classification verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct TierVerdict {
    pub tier: MatchTier,
    pub confidence: f64,
    pub visual_similarity: f64,
    pub reasoning: String,
}

impl TierVerdict {
    pub(crate) fn from_raw(raw: RawTierVerdict, context: &str) -> Result<Self, VisionError> {
        let tier: MatchTier =
            raw.match_tier
                .parse()
                .map_err(|_| VisionError::MalformedResponse {
                    context: context.to_owned(),
                    reason: format!("unknown match_tier \"{}\"", raw.match_tier),
                })?;
        if !raw.confidence.is_finite() || !raw.visual_similarity.is_finite() {
            return Err(VisionError::MalformedResponse {
                context: context.to_owned(),
                reason: "non-finite confidence or visual_similarity".to_owned(),
            });
        }
        Ok(Self {
            tier,
            confidence: raw.confidence.clamp(0.0, 1.0),
            visual_similarity: raw.visual_similarity.clamp(0.0, 1.0),
            reasoning: raw.reasoning,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSelectionVerdict {
    pub selected_index: Option<usize>,
    pub confidence: f64,
    pub visual_similarity: f64,
    #[serde(default)]
    pub brand_match: bool,
    #[serde(default)]
    pub size_match: bool,
    #[serde(default)]
    pub flavor_match: bool,
    #[serde(default)]
    pub reasoning: String,
    pub candidate_similarities: Vec<f64>,
}

/// A validated joint selection verdict.
///
/// `candidate_similarities` carries one entry per submitted candidate in
/// submission order; the selection policy is re-applied client-side over
/// this list, so its length is validated strictly.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionVerdict {
    pub selected_index: Option<usize>,
    pub confidence: f64,
    pub visual_similarity: f64,
    pub brand_match: bool,
    pub size_match: bool,
    pub flavor_match: bool,
    pub reasoning: String,
    pub candidate_similarities: Vec<f64>,
}

impl SelectionVerdict {
    pub(crate) fn from_raw(
        raw: RawSelectionVerdict,
        candidate_count: usize,
        context: &str,
    ) -> Result<Self, VisionError> {
        if raw.candidate_similarities.len() != candidate_count {
            return Err(VisionError::MalformedResponse {
                context: context.to_owned(),
                reason: format!(
                    "{} candidate_similarities for {} candidates",
                    raw.candidate_similarities.len(),
                    candidate_count
                ),
            });
        }
        if let Some(index) = raw.selected_index {
            if index >= candidate_count {
                return Err(VisionError::MalformedResponse {
                    context: context.to_owned(),
                    reason: format!(
                        "selected_index {index} out of bounds for {candidate_count} candidates"
                    ),
                });
            }
        }
        if !raw.confidence.is_finite() || !raw.visual_similarity.is_finite() {
            return Err(VisionError::MalformedResponse {
                context: context.to_owned(),
                reason: "non-finite confidence or visual_similarity".to_owned(),
            });
        }
        Ok(Self {
            selected_index: raw.selected_index,
            confidence: raw.confidence.clamp(0.0, 1.0),
            visual_similarity: raw.visual_similarity.clamp(0.0, 1.0),
            brand_match: raw.brand_match,
            size_match: raw.size_match,
            flavor_match: raw.flavor_match,
            reasoning: raw.reasoning,
            candidate_similarities: raw
                .candidate_similarities
                .into_iter()
                .map(|s| if s.is_finite() { s.clamp(0.0, 1.0) } else { 0.0 })
                .collect(),
        })
    }
}
