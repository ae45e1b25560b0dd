//! Database operations for `detected_items`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use shelfmatch_core::{
    BoundingBox, DetectedItem, ExtractedField, ItemMetadata, SelectedMatch,
};

use crate::DbError;

/// A row from the `detected_items` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemRow {
    pub id: Uuid,
    pub image_id: Uuid,
    pub crop_url: String,
    pub bbox_x: i32,
    pub bbox_y: i32,
    pub bbox_width: i32,
    pub bbox_height: i32,
    pub retailer: Option<String>,
    pub brand: Option<String>,
    pub brand_confidence: Option<f64>,
    pub product_name: Option<String>,
    pub product_name_confidence: Option<f64>,
    pub size: Option<String>,
    pub size_confidence: Option<f64>,
    pub flavor: Option<String>,
    pub flavor_confidence: Option<f64>,
    pub category: Option<String>,
    pub category_confidence: Option<f64>,
    pub price: Option<Decimal>,
    pub selected_catalog_key: Option<String>,
    pub selected_tier: Option<String>,
    pub selected_confidence: Option<f64>,
    pub selected_visual_similarity: Option<f64>,
    pub selected_reasoning: Option<String>,
    pub selected_method: Option<String>,
    pub matched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const ITEM_COLUMNS: &str = "id, image_id, crop_url, bbox_x, bbox_y, bbox_width, bbox_height, \
     retailer, brand, brand_confidence, product_name, product_name_confidence, \
     size, size_confidence, flavor, flavor_confidence, category, category_confidence, \
     price, selected_catalog_key, selected_tier, selected_confidence, \
     selected_visual_similarity, selected_reasoning, selected_method, matched_at, \
     created_at, updated_at";

impl ItemRow {
    /// Converts the row into the pipeline's domain item.
    #[must_use]
    pub fn to_detected_item(&self) -> DetectedItem {
        let field = |value: &Option<String>, confidence: Option<f64>| {
            value.as_ref().map(|v| ExtractedField {
                value: v.clone(),
                confidence,
            })
        };

        DetectedItem {
            id: self.id,
            image_id: self.image_id,
            crop_url: self.crop_url.clone(),
            bounding_box: BoundingBox {
                x: self.bbox_x,
                y: self.bbox_y,
                width: self.bbox_width,
                height: self.bbox_height,
            },
            retailer: self.retailer.clone(),
            metadata: ItemMetadata {
                brand: field(&self.brand, self.brand_confidence),
                product_name: field(&self.product_name, self.product_name_confidence),
                size: field(&self.size, self.size_confidence),
                flavor: field(&self.flavor, self.flavor_confidence),
                category: field(&self.category, self.category_confidence),
                price: self.price.map(|p| ExtractedField::new(p.to_string())),
            },
        }
    }
}

/// Filter for [`list_items`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemFilter {
    /// Restrict to one source image.
    pub image_id: Option<Uuid>,
    /// When `false`, only items without a selected match are returned
    /// (the normal batch input); when `true`, matched items are included
    /// too (re-match runs).
    pub include_matched: bool,
}

/// Inserts a detected item produced by the upstream extraction step.
///
/// Primarily used by ingestion tooling and tests; the matching pipeline
/// itself only reads items and writes their selected match.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_detected_item(pool: &PgPool, item: &DetectedItem) -> Result<(), DbError> {
    let field_value = |f: &Option<ExtractedField>| f.as_ref().map(|f| f.value.clone());
    let field_confidence = |f: &Option<ExtractedField>| f.as_ref().and_then(|f| f.confidence);
    let price = item
        .metadata
        .price
        .as_ref()
        .and_then(|f| Decimal::from_str(&f.value).ok());

    sqlx::query(
        "INSERT INTO detected_items \
             (id, image_id, crop_url, bbox_x, bbox_y, bbox_width, bbox_height, retailer, \
              brand, brand_confidence, product_name, product_name_confidence, \
              size, size_confidence, flavor, flavor_confidence, \
              category, category_confidence, price) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, \
                 $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
    )
    .bind(item.id)
    .bind(item.image_id)
    .bind(&item.crop_url)
    .bind(item.bounding_box.x)
    .bind(item.bounding_box.y)
    .bind(item.bounding_box.width)
    .bind(item.bounding_box.height)
    .bind(&item.retailer)
    .bind(field_value(&item.metadata.brand))
    .bind(field_confidence(&item.metadata.brand))
    .bind(field_value(&item.metadata.product_name))
    .bind(field_confidence(&item.metadata.product_name))
    .bind(field_value(&item.metadata.size))
    .bind(field_confidence(&item.metadata.size))
    .bind(field_value(&item.metadata.flavor))
    .bind(field_confidence(&item.metadata.flavor))
    .bind(field_value(&item.metadata.category))
    .bind(field_confidence(&item.metadata.category))
    .bind(price)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetches a single item by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_item(pool: &PgPool, id: Uuid) -> Result<ItemRow, DbError> {
    let query = format!("SELECT {ITEM_COLUMNS} FROM detected_items WHERE id = $1");
    let row = sqlx::query_as::<_, ItemRow>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Lists items for a batch, oldest first so progress indices are stable
/// across runs over the same data.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_items(
    pool: &PgPool,
    filter: ItemFilter,
    limit: i64,
) -> Result<Vec<ItemRow>, DbError> {
    let query = format!(
        "SELECT {ITEM_COLUMNS} FROM detected_items \
         WHERE ($1::uuid IS NULL OR image_id = $1) \
           AND ($2 OR selected_catalog_key IS NULL) \
         ORDER BY created_at ASC, id ASC \
         LIMIT $3"
    );
    let rows = sqlx::query_as::<_, ItemRow>(&query)
        .bind(filter.image_id)
        .bind(filter.include_matched)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Writes the item's selected match, overwriting any previous selection.
///
/// Re-running the pipeline replaces the selection; the single column group
/// guarantees an item never holds two selections at once.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the item does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_selected_match(
    pool: &PgPool,
    item_id: Uuid,
    selected: &SelectedMatch,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE detected_items SET \
             selected_catalog_key = $1, \
             selected_tier = $2, \
             selected_confidence = $3, \
             selected_visual_similarity = $4, \
             selected_reasoning = $5, \
             selected_method = $6, \
             matched_at = NOW(), \
             updated_at = NOW() \
         WHERE id = $7",
    )
    .bind(&selected.catalog_key)
    .bind(selected.tier.as_str())
    .bind(selected.confidence)
    .bind(selected.visual_similarity)
    .bind(&selected.reasoning)
    .bind(selected.method.as_str())
    .bind(item_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
