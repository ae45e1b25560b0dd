//! The per-item pipeline: search → pre-filter → classification arm →
//! resolution → persistence.

use std::collections::HashSet;
use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use shelfmatch_catalog::CatalogClient;
use shelfmatch_core::{
    DetectedItem, MatchStage, MatchStrategy, ScoredCandidate, SelectedMatch,
};
use shelfmatch_db::StageCandidate;
use shelfmatch_vision::VisionClient;

use crate::classify::classify_candidates;
use crate::consolidate::consolidate;
use crate::error::PipelineError;
use crate::prefilter::filter_candidates;
use crate::select::resolve_selection;

/// Everything one item pipeline needs. Shared across all concurrent item
/// executions; nothing here is mutated per item. The clients sit behind
/// `Arc` so a per-run deps value (e.g. with a different strategy) is cheap
/// to assemble.
pub struct MatchDeps {
    pub pool: PgPool,
    pub catalog: Arc<CatalogClient>,
    pub vision: Arc<VisionClient>,
    pub strategy: MatchStrategy,
    pub search_limit: u32,
}

/// Terminal outcome of one item's pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Matched(SelectedMatch),
    NoMatch,
    Failed(String),
}

impl ItemOutcome {
    /// Storage/reporting label: `matched`, `no_match`, or `error`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOutcome::Matched(_) => "matched",
            ItemOutcome::NoMatch => "no_match",
            ItemOutcome::Failed(_) => "error",
        }
    }

    /// Human-readable detail for reporting: the matched product for
    /// successes, the originating message for failures.
    #[must_use]
    pub fn detail(&self) -> Option<String> {
        match self {
            ItemOutcome::Matched(selected) => Some(format!(
                "{} ({}, confidence {:.2})",
                selected.catalog_key, selected.tier, selected.confidence
            )),
            ItemOutcome::NoMatch => None,
            ItemOutcome::Failed(message) => Some(message.clone()),
        }
    }
}

/// Runs the full pipeline for one item, catching every [`PipelineError`] at
/// this boundary so a failure never escapes to sibling items.
pub async fn run_item(deps: &MatchDeps, item: &DetectedItem) -> ItemOutcome {
    match run_item_inner(deps, item).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(item_id = %item.id, error = %err, "item pipeline failed");
            ItemOutcome::Failed(err.to_string())
        }
    }
}

async fn run_item_inner(
    deps: &MatchDeps,
    item: &DetectedItem,
) -> Result<ItemOutcome, PipelineError> {
    let Some(query) = item.metadata.search_query() else {
        tracing::debug!(item_id = %item.id, "no searchable metadata extracted");
        return Ok(ItemOutcome::NoMatch);
    };

    let candidates = deps.catalog.search(&query, deps.search_limit).await?;
    record_stage(
        &deps.pool,
        item.id,
        MatchStage::Search,
        candidates.iter().map(StageCandidate::from_product),
    )
    .await?;

    if candidates.is_empty() {
        tracing::debug!(item_id = %item.id, query, "catalog returned no candidates");
        return Ok(ItemOutcome::NoMatch);
    }

    let scored = filter_candidates(&item.metadata, item.retailer.as_deref(), candidates);
    record_stage(
        &deps.pool,
        item.id,
        MatchStage::PreFilter,
        scored.iter().map(StageCandidate::from_scored),
    )
    .await?;

    if scored.is_empty() {
        tracing::debug!(item_id = %item.id, "no candidate survived the text pre-filter");
        return Ok(ItemOutcome::NoMatch);
    }

    let selection = match deps.strategy {
        MatchStrategy::Tiered => {
            let classified =
                classify_candidates(&deps.vision, &item.crop_url, &item.metadata, &scored).await?;
            record_stage(
                &deps.pool,
                item.id,
                MatchStage::AiFilter,
                classified.iter().map(StageCandidate::from_classified),
            )
            .await?;
            consolidate(&classified)
        }
        MatchStrategy::Joint => {
            let products: Vec<_> = scored.iter().map(|s| s.product.clone()).collect();
            let verdict = deps
                .vision
                .select_best(&item.crop_url, &item.metadata, &products)
                .await?;
            let selection = resolve_selection(&item.metadata, &scored, &verdict);
            record_stage(
                &deps.pool,
                item.id,
                MatchStage::VisualMatch,
                visual_match_rows(&scored, &verdict.candidate_similarities, selection.as_ref()),
            )
            .await?;
            selection
        }
    };

    match selection {
        Some(selected) => {
            shelfmatch_db::set_selected_match(&deps.pool, item.id, &selected).await?;
            tracing::info!(
                item_id = %item.id,
                catalog_key = %selected.catalog_key,
                tier = %selected.tier,
                method = %selected.method,
                "item matched"
            );
            Ok(ItemOutcome::Matched(selected))
        }
        None => Ok(ItemOutcome::NoMatch),
    }
}

/// Clears and re-records one stage's rows, dropping in-code duplicates by
/// catalog key (first occurrence wins). The DB's unique constraint on
/// `(item, stage, catalog_key)` backstops this check.
async fn record_stage(
    pool: &PgPool,
    item_id: Uuid,
    stage: MatchStage,
    candidates: impl Iterator<Item = StageCandidate>,
) -> Result<(), PipelineError> {
    let mut seen: HashSet<String> = HashSet::new();
    let deduped: Vec<StageCandidate> = candidates
        .filter(|c| seen.insert(c.catalog_key.clone()))
        .collect();

    // Re-runs replace the stage's audit rows rather than accreting onto them.
    shelfmatch_db::clear_stage_results(pool, item_id, stage).await?;
    shelfmatch_db::record_stage_candidates(pool, item_id, stage, &deduped).await?;
    Ok(())
}

fn visual_match_rows<'a>(
    scored: &'a [ScoredCandidate],
    similarities: &'a [f64],
    selection: Option<&'a SelectedMatch>,
) -> impl Iterator<Item = StageCandidate> + 'a {
    scored.iter().enumerate().map(move |(index, candidate)| {
        let mut row = StageCandidate::from_product(&candidate.product);
        row.visual_similarity = similarities.get(index).copied();
        if let Some(selected) = selection {
            if selected.catalog_key == candidate.product.catalog_key {
                row.match_tier = Some(selected.tier.as_str().to_owned());
                row.confidence = Some(selected.confidence);
                row.reasoning = Some(selected.reasoning.clone());
            }
        }
        row
    })
}
