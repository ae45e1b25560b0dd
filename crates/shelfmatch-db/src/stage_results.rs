//! Database operations for `match_stage_results` — the per-stage audit trail.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use shelfmatch_core::{CandidateProduct, ClassifiedCandidate, MatchStage, ScoredCandidate};

use crate::DbError;

/// A candidate annotated for one pipeline stage, ready for persistence.
///
/// Stage-specific fields are optional: search rows carry only the product
/// snapshot, pre-filter rows add the similarity score and reasons, and the
/// classification stages add tier/confidence/similarity/reasoning.
#[derive(Debug, Clone)]
pub struct StageCandidate {
    pub catalog_key: String,
    pub title: String,
    pub brand: Option<String>,
    pub size_text: Option<String>,
    pub image_url: Option<String>,
    pub retailers: Vec<String>,
    pub similarity_score: Option<f64>,
    pub match_reasons: Option<Vec<String>>,
    pub match_tier: Option<String>,
    pub confidence: Option<f64>,
    pub visual_similarity: Option<f64>,
    pub reasoning: Option<String>,
}

impl StageCandidate {
    #[must_use]
    pub fn from_product(product: &CandidateProduct) -> Self {
        Self {
            catalog_key: product.catalog_key.clone(),
            title: product.title.clone(),
            brand: product.brand.clone(),
            size_text: product.size_text.clone(),
            image_url: product.primary_image().map(ToOwned::to_owned),
            retailers: product.retailers.clone(),
            similarity_score: None,
            match_reasons: None,
            match_tier: None,
            confidence: None,
            visual_similarity: None,
            reasoning: None,
        }
    }

    #[must_use]
    pub fn from_scored(scored: &ScoredCandidate) -> Self {
        let mut candidate = Self::from_product(&scored.product);
        candidate.similarity_score = Some(scored.similarity_score);
        candidate.match_reasons = Some(scored.match_reasons.clone());
        candidate
    }

    #[must_use]
    pub fn from_classified(classified: &ClassifiedCandidate) -> Self {
        let mut candidate = Self::from_product(&classified.product);
        candidate.match_tier = Some(classified.tier.as_str().to_owned());
        candidate.confidence = Some(classified.confidence);
        candidate.visual_similarity = Some(classified.visual_similarity);
        candidate.reasoning = Some(classified.reasoning.clone());
        candidate
    }
}

/// A row from the `match_stage_results` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StageResultRow {
    pub id: i64,
    pub item_id: Uuid,
    pub stage: String,
    pub catalog_key: String,
    pub title: String,
    pub brand: Option<String>,
    pub size_text: Option<String>,
    pub image_url: Option<String>,
    pub retailers: Vec<String>,
    pub similarity_score: Option<f64>,
    pub match_reasons: Option<Vec<String>>,
    pub match_tier: Option<String>,
    pub confidence: Option<f64>,
    pub visual_similarity: Option<f64>,
    pub reasoning: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Records the candidates that reached one stage for one item.
///
/// `ON CONFLICT DO NOTHING` on `(item_id, stage, catalog_key)` is the
/// storage-level backstop for the caller's in-code uniqueness check — a
/// catalog key can appear at most once per stage per item, while the same
/// key across stages forms the audit trail.
///
/// Returns the number of rows actually inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if an insert fails.
pub async fn record_stage_candidates(
    pool: &PgPool,
    item_id: Uuid,
    stage: MatchStage,
    candidates: &[StageCandidate],
) -> Result<u64, DbError> {
    let mut inserted = 0u64;

    for candidate in candidates {
        let result = sqlx::query(
            "INSERT INTO match_stage_results \
                 (item_id, stage, catalog_key, title, brand, size_text, image_url, retailers, \
                  similarity_score, match_reasons, match_tier, confidence, visual_similarity, \
                  reasoning) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (item_id, stage, catalog_key) DO NOTHING",
        )
        .bind(item_id)
        .bind(stage.as_str())
        .bind(&candidate.catalog_key)
        .bind(&candidate.title)
        .bind(&candidate.brand)
        .bind(&candidate.size_text)
        .bind(&candidate.image_url)
        .bind(&candidate.retailers)
        .bind(candidate.similarity_score)
        .bind(&candidate.match_reasons)
        .bind(&candidate.match_tier)
        .bind(candidate.confidence)
        .bind(candidate.visual_similarity)
        .bind(&candidate.reasoning)
        .execute(pool)
        .await?;

        inserted += result.rows_affected();
    }

    Ok(inserted)
}

/// Deletes one stage's rows for an item so a re-run can re-record them.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn clear_stage_results(
    pool: &PgPool,
    item_id: Uuid,
    stage: MatchStage,
) -> Result<(), DbError> {
    sqlx::query("DELETE FROM match_stage_results WHERE item_id = $1 AND stage = $2")
        .bind(item_id)
        .bind(stage.as_str())
        .execute(pool)
        .await?;

    Ok(())
}

/// Returns all stage rows for an item, ordered by stage then insertion.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_stage_results(
    pool: &PgPool,
    item_id: Uuid,
) -> Result<Vec<StageResultRow>, DbError> {
    let rows = sqlx::query_as::<_, StageResultRow>(
        "SELECT id, item_id, stage, catalog_key, title, brand, size_text, image_url, retailers, \
                similarity_score, match_reasons, match_tier, confidence, visual_similarity, \
                reasoning, created_at \
         FROM match_stage_results \
         WHERE item_id = $1 \
         ORDER BY stage ASC, id ASC",
    )
    .bind(item_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
