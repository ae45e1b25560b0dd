//! Item listing and per-item audit trail endpoints.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shelfmatch_db::{ItemFilter, ItemRow, StageResultRow};

use crate::api::{map_db_error, normalize_limit, ApiResponse, AppState, ResponseMeta};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
pub(super) struct ListItemsQuery {
    image_id: Option<Uuid>,
    /// When true, only items still lacking a selected match are returned.
    #[serde(default)]
    unmatched_only: bool,
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ItemSummary {
    pub id: Uuid,
    pub image_id: Uuid,
    pub crop_url: String,
    pub retailer: Option<String>,
    pub brand: Option<String>,
    pub product_name: Option<String>,
    pub size: Option<String>,
    pub flavor: Option<String>,
    pub selected_catalog_key: Option<String>,
    pub selected_tier: Option<String>,
    pub selected_confidence: Option<f64>,
    pub selected_method: Option<String>,
    pub matched_at: Option<DateTime<Utc>>,
}

impl From<&ItemRow> for ItemSummary {
    fn from(row: &ItemRow) -> Self {
        Self {
            id: row.id,
            image_id: row.image_id,
            crop_url: row.crop_url.clone(),
            retailer: row.retailer.clone(),
            brand: row.brand.clone(),
            product_name: row.product_name.clone(),
            size: row.size.clone(),
            flavor: row.flavor.clone(),
            selected_catalog_key: row.selected_catalog_key.clone(),
            selected_tier: row.selected_tier.clone(),
            selected_confidence: row.selected_confidence,
            selected_method: row.selected_method.clone(),
            matched_at: row.matched_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct StageResult {
    pub stage: String,
    pub catalog_key: String,
    pub title: String,
    pub brand: Option<String>,
    pub size_text: Option<String>,
    pub similarity_score: Option<f64>,
    pub match_reasons: Option<Vec<String>>,
    pub match_tier: Option<String>,
    pub confidence: Option<f64>,
    pub visual_similarity: Option<f64>,
    pub reasoning: Option<String>,
}

impl From<&StageResultRow> for StageResult {
    fn from(row: &StageResultRow) -> Self {
        Self {
            stage: row.stage.clone(),
            catalog_key: row.catalog_key.clone(),
            title: row.title.clone(),
            brand: row.brand.clone(),
            size_text: row.size_text.clone(),
            similarity_score: row.similarity_score,
            match_reasons: row.match_reasons.clone(),
            match_tier: row.match_tier.clone(),
            confidence: row.confidence,
            visual_similarity: row.visual_similarity,
            reasoning: row.reasoning.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ItemDetail {
    #[serde(flatten)]
    pub item: ItemSummary,
    pub stages: Vec<StageResult>,
}

pub(super) async fn list_items(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ListItemsQuery>,
) -> impl IntoResponse {
    let filter = ItemFilter {
        image_id: query.image_id,
        include_matched: !query.unmatched_only,
    };

    match shelfmatch_db::list_items(&state.pool, filter, normalize_limit(query.limit)).await {
        Ok(rows) => {
            let data: Vec<ItemSummary> = rows.iter().map(Into::into).collect();
            Ok(Json(ApiResponse {
                data,
                meta: ResponseMeta::new(req_id.0),
            }))
        }
        Err(e) => Err(map_db_error(req_id.0, &e)),
    }
}

pub(super) async fn get_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(item_id): Path<Uuid>,
) -> impl IntoResponse {
    let row = match shelfmatch_db::get_item(&state.pool, item_id).await {
        Ok(row) => row,
        Err(e) => return Err(map_db_error(req_id.0, &e)),
    };

    let stages = match shelfmatch_db::list_stage_results(&state.pool, item_id).await {
        Ok(rows) => rows.iter().map(Into::into).collect(),
        Err(e) => return Err(map_db_error(req_id.0, &e)),
    };

    Ok(Json(ApiResponse {
        data: ItemDetail {
            item: (&row).into(),
            stages,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
