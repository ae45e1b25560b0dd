use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Three-way visual match classification for a single candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Same brand, product, variant, size, and packaging.
    Identical,
    /// Same brand and product line, differing in exactly one dimension
    /// (size, flavor, or a minor packaging revision).
    AlmostSame,
    /// Different brand or different product type.
    NotMatch,
}

impl MatchTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MatchTier::Identical => "identical",
            MatchTier::AlmostSame => "almost_same",
            MatchTier::NotMatch => "not_match",
        }
    }
}

impl std::fmt::Display for MatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchTier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identical" => Ok(MatchTier::Identical),
            "almost_same" => Ok(MatchTier::AlmostSame),
            "not_match" => Ok(MatchTier::NotMatch),
            other => Err(CoreError::InvalidTier(other.to_string())),
        }
    }
}

/// How a final match was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    /// Per-candidate tiered classification resolved by the consolidation
    /// decision table.
    Consolidation,
    /// Single joint multi-candidate selection call.
    DirectSelection,
}

impl SelectionMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionMethod::Consolidation => "consolidation",
            SelectionMethod::DirectSelection => "direct_selection",
        }
    }
}

impl std::fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SelectionMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consolidation" => Ok(SelectionMethod::Consolidation),
            "direct_selection" => Ok(SelectionMethod::DirectSelection),
            other => Err(CoreError::InvalidMethod(other.to_string())),
        }
    }
}

/// Pipeline stage names keying the per-stage audit rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    Search,
    PreFilter,
    AiFilter,
    VisualMatch,
}

impl MatchStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStage::Search => "search",
            MatchStage::PreFilter => "pre_filter",
            MatchStage::AiFilter => "ai_filter",
            MatchStage::VisualMatch => "visual_match",
        }
    }
}

impl std::fmt::Display for MatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchStage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(MatchStage::Search),
            "pre_filter" => Ok(MatchStage::PreFilter),
            "ai_filter" => Ok(MatchStage::AiFilter),
            "visual_match" => Ok(MatchStage::VisualMatch),
            other => Err(CoreError::InvalidStage(other.to_string())),
        }
    }
}

/// Which classification arm resolves the surviving candidates.
///
/// Tiered costs one vision call per candidate plus consolidation; Joint
/// costs a single call for the whole candidate set. Which one a deployment
/// uses is a cost/accuracy policy choice, not a correctness one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Tiered,
    Joint,
}

impl MatchStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStrategy::Tiered => "tiered",
            MatchStrategy::Joint => "joint",
        }
    }
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tiered" => Ok(MatchStrategy::Tiered),
            "joint" => Ok(MatchStrategy::Joint),
            other => Err(CoreError::InvalidStrategy(other.to_string())),
        }
    }
}

/// A reference product returned by the catalog search service.
///
/// Immutable snapshot — downstream stages annotate it (score, tier) but
/// never mutate its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProduct {
    /// Stable catalog key, e.g. a GTIN.
    pub catalog_key: String,
    pub title: String,
    pub brand: Option<String>,
    /// Free-text size descriptor, e.g. `"12 oz"` or `"4 x 330ml"`.
    pub size_text: Option<String>,
    pub image_urls: Vec<String>,
    /// Retailer tags the catalog lists this product under.
    pub retailers: Vec<String>,
    pub price: Option<Decimal>,
}

impl CandidateProduct {
    /// First image reference, used for visual comparison.
    #[must_use]
    pub fn primary_image(&self) -> Option<&str> {
        self.image_urls.first().map(String::as_str)
    }
}

/// A candidate that survived the text pre-filter, with its normalized
/// similarity score and the signals that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub product: CandidateProduct,
    /// Normalized to `[0, 1]` over the signals that were actually available.
    pub similarity_score: f64,
    pub match_reasons: Vec<String>,
}

/// A candidate after tiered visual classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedCandidate {
    pub product: CandidateProduct,
    pub tier: MatchTier,
    pub confidence: f64,
    pub visual_similarity: f64,
    pub reasoning: String,
}

/// The authoritative match outcome for one item. At most one exists per
/// item; a re-run may overwrite it but never produces two simultaneously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedMatch {
    pub catalog_key: String,
    pub tier: MatchTier,
    pub confidence: f64,
    pub visual_similarity: f64,
    pub reasoning: String,
    pub method: SelectionMethod,
}
