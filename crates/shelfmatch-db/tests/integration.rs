//! Integration tests for the shelfmatch persistence layer.
//!
//! These run against a live Postgres via `#[sqlx::test]`, which provisions
//! an isolated database per test and applies the workspace migrations.

use shelfmatch_db::{ItemFilter, StageCandidate};

use shelfmatch_core::{
    BoundingBox, CandidateProduct, DetectedItem, ExtractedField, ItemMetadata, MatchStage,
    MatchTier, SelectedMatch, SelectionMethod,
};
use uuid::Uuid;

fn make_item(brand: &str) -> DetectedItem {
    DetectedItem {
        id: Uuid::new_v4(),
        image_id: Uuid::new_v4(),
        crop_url: format!("https://crops.example.com/{brand}.jpg"),
        bounding_box: BoundingBox {
            x: 10,
            y: 20,
            width: 120,
            height: 240,
        },
        retailer: Some("kroger".to_string()),
        metadata: ItemMetadata {
            brand: Some(ExtractedField::with_confidence(brand, 0.9)),
            product_name: Some(ExtractedField::new("Sparkling Water")),
            size: Some(ExtractedField::new("12 oz")),
            flavor: None,
            category: None,
            price: Some(ExtractedField::new("4.99")),
        },
    }
}

fn make_candidate(key: &str) -> CandidateProduct {
    CandidateProduct {
        catalog_key: key.to_string(),
        title: "LaCroix Sparkling Water Lime 12oz".to_string(),
        brand: Some("LaCroix".to_string()),
        size_text: Some("12 oz".to_string()),
        image_urls: vec!["https://img.example.com/lacroix.jpg".to_string()],
        retailers: vec!["kroger".to_string()],
        price: None,
    }
}

fn make_selection(key: &str) -> SelectedMatch {
    SelectedMatch {
        catalog_key: key.to_string(),
        tier: MatchTier::Identical,
        confidence: 0.95,
        visual_similarity: 0.97,
        reasoning: "Same can artwork and size.".to_string(),
        method: SelectionMethod::Consolidation,
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn insert_and_fetch_item_roundtrips_metadata(pool: sqlx::PgPool) {
    let item = make_item("LaCroix");
    shelfmatch_db::insert_detected_item(&pool, &item)
        .await
        .expect("insert item");

    let row = shelfmatch_db::get_item(&pool, item.id).await.expect("fetch item");
    let fetched = row.to_detected_item();

    assert_eq!(fetched.id, item.id);
    assert_eq!(fetched.metadata.brand_value(), Some("LaCroix"));
    assert_eq!(fetched.bounding_box, item.bounding_box);
    assert_eq!(fetched.retailer.as_deref(), Some("kroger"));
    assert!(row.selected_catalog_key.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn set_selected_match_overwrites_previous_selection(pool: sqlx::PgPool) {
    let item = make_item("LaCroix");
    shelfmatch_db::insert_detected_item(&pool, &item)
        .await
        .expect("insert item");

    shelfmatch_db::set_selected_match(&pool, item.id, &make_selection("0012993201012"))
        .await
        .expect("first selection");
    shelfmatch_db::set_selected_match(&pool, item.id, &make_selection("0012993201029"))
        .await
        .expect("second selection overwrites");

    let row = shelfmatch_db::get_item(&pool, item.id).await.expect("fetch item");
    assert_eq!(row.selected_catalog_key.as_deref(), Some("0012993201029"));
    assert_eq!(row.selected_tier.as_deref(), Some("identical"));
    assert!(row.matched_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn set_selected_match_on_missing_item_is_not_found(pool: sqlx::PgPool) {
    let err = shelfmatch_db::set_selected_match(&pool, Uuid::new_v4(), &make_selection("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, shelfmatch_db::DbError::NotFound));
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_items_excludes_matched_by_default(pool: sqlx::PgPool) {
    let unmatched = make_item("LaCroix");
    let matched = make_item("Spindrift");
    shelfmatch_db::insert_detected_item(&pool, &unmatched)
        .await
        .expect("insert unmatched");
    shelfmatch_db::insert_detected_item(&pool, &matched)
        .await
        .expect("insert matched");
    shelfmatch_db::set_selected_match(&pool, matched.id, &make_selection("0012993201012"))
        .await
        .expect("select match");

    let rows = shelfmatch_db::list_items(&pool, ItemFilter::default(), 50)
        .await
        .expect("list unmatched");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, unmatched.id);

    let all = shelfmatch_db::list_items(
        &pool,
        ItemFilter {
            include_matched: true,
            ..ItemFilter::default()
        },
        50,
    )
    .await
    .expect("list all");
    assert_eq!(all.len(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn stage_rows_are_unique_per_item_stage_and_key(pool: sqlx::PgPool) {
    let item = make_item("LaCroix");
    shelfmatch_db::insert_detected_item(&pool, &item)
        .await
        .expect("insert item");

    let candidate = StageCandidate::from_product(&make_candidate("0012993201012"));
    let first = shelfmatch_db::record_stage_candidates(
        &pool,
        item.id,
        MatchStage::Search,
        &[candidate.clone(), candidate.clone()],
    )
    .await
    .expect("record search rows");
    // Duplicate within the same stage is silently dropped by the constraint.
    assert_eq!(first, 1);

    // The same key in a different stage is the audit trail, not a duplicate.
    let prefilter = shelfmatch_db::record_stage_candidates(
        &pool,
        item.id,
        MatchStage::PreFilter,
        &[candidate],
    )
    .await
    .expect("record pre_filter row");
    assert_eq!(prefilter, 1);

    let rows = shelfmatch_db::list_stage_results(&pool, item.id)
        .await
        .expect("list stage rows");
    assert_eq!(rows.len(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn clear_stage_results_enables_rerecording(pool: sqlx::PgPool) {
    let item = make_item("LaCroix");
    shelfmatch_db::insert_detected_item(&pool, &item)
        .await
        .expect("insert item");

    let candidate = StageCandidate::from_product(&make_candidate("0012993201012"));
    shelfmatch_db::record_stage_candidates(&pool, item.id, MatchStage::Search, &[candidate.clone()])
        .await
        .expect("record");
    shelfmatch_db::clear_stage_results(&pool, item.id, MatchStage::Search)
        .await
        .expect("clear");
    let inserted =
        shelfmatch_db::record_stage_candidates(&pool, item.id, MatchStage::Search, &[candidate])
            .await
            .expect("re-record");
    assert_eq!(inserted, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn match_run_lifecycle_transitions_are_guarded(pool: sqlx::PgPool) {
    let run = shelfmatch_db::create_match_run(&pool, "tiered", "cli", 7)
        .await
        .expect("create run");
    assert_eq!(run.status, "queued");
    assert_eq!(run.total_items, 7);

    shelfmatch_db::start_match_run(&pool, run.id)
        .await
        .expect("start run");

    // Starting an already-running run is an invalid transition.
    let err = shelfmatch_db::start_match_run(&pool, run.id).await.unwrap_err();
    assert!(matches!(
        err,
        shelfmatch_db::DbError::InvalidMatchRunTransition { .. }
    ));

    shelfmatch_db::complete_match_run(&pool, run.id, 4, 2, 1)
        .await
        .expect("complete run");

    let fetched = shelfmatch_db::get_match_run(&pool, run.id)
        .await
        .expect("fetch run");
    assert_eq!(fetched.status, "succeeded");
    assert_eq!(fetched.succeeded, 4);
    assert_eq!(fetched.no_match, 2);
    assert_eq!(fetched.errors, 1);

    // Completing twice is also invalid.
    let err = shelfmatch_db::complete_match_run(&pool, run.id, 4, 2, 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        shelfmatch_db::DbError::InvalidMatchRunTransition { .. }
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn match_run_item_upsert_is_idempotent(pool: sqlx::PgPool) {
    let item = make_item("LaCroix");
    shelfmatch_db::insert_detected_item(&pool, &item)
        .await
        .expect("insert item");
    let run = shelfmatch_db::create_match_run(&pool, "joint", "api", 1)
        .await
        .expect("create run");

    shelfmatch_db::upsert_match_run_item(&pool, run.id, item.id, "error", Some("search timeout"))
        .await
        .expect("first upsert");
    shelfmatch_db::upsert_match_run_item(&pool, run.id, item.id, "matched", None)
        .await
        .expect("second upsert updates");

    let rows = shelfmatch_db::list_match_run_items(&pool, run.id)
        .await
        .expect("list run items");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].outcome, "matched");
    assert!(rows[0].detail.is_none());
}
