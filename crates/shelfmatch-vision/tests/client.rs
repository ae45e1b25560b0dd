//! Integration tests for `VisionClient` using wiremock HTTP mocks.

use shelfmatch_core::{CandidateProduct, ExtractedField, ItemMetadata, MatchTier};
use shelfmatch_vision::{VisionClient, VisionError};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> VisionClient {
    VisionClient::new(base_url, Some("test-key"), 30, 0, 0)
        .expect("client construction should not fail")
}

fn metadata() -> ItemMetadata {
    ItemMetadata {
        brand: Some(ExtractedField::with_confidence("Oatly", 0.95)),
        product_name: Some(ExtractedField::new("Oat Milk Barista Edition")),
        size: Some(ExtractedField::new("32 oz")),
        flavor: None,
        category: Some(ExtractedField::new("dairy-alternative")),
        price: None,
    }
}

fn candidate(key: &str, image: Option<&str>) -> CandidateProduct {
    CandidateProduct {
        catalog_key: key.to_string(),
        title: "Oatly Oat Milk Barista Edition 32oz".to_string(),
        brand: Some("Oatly".to_string()),
        size_text: Some("32 oz".to_string()),
        image_urls: image.map(|i| vec![i.to_string()]).unwrap_or_default(),
        retailers: vec!["target".to_string()],
        price: None,
    }
}

#[tokio::test]
async fn classify_pair_returns_parsed_verdict() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/compare"))
        .and(body_partial_json(serde_json::json!({
            "item_image_url": "https://crops.example.com/item-1.jpg",
            "candidate": { "catalog_key": "0190646641016" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "match_tier": "identical",
            "confidence": 0.93,
            "visual_similarity": 0.96,
            "reasoning": "Same carton design, same size callout."
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let verdict = client
        .classify_pair(
            "https://crops.example.com/item-1.jpg",
            &metadata(),
            &candidate("0190646641016", Some("https://img.example.com/oatly.jpg")),
        )
        .await
        .expect("should parse verdict");

    assert_eq!(verdict.tier, MatchTier::Identical);
    assert!((verdict.confidence - 0.93).abs() < 1e-9);
    assert!((verdict.visual_similarity - 0.96).abs() < 1e-9);
}

#[tokio::test]
async fn classify_pair_without_candidate_image_is_malformed() {
    let server = MockServer::start().await;
    let client = test_client(&server.uri());

    let err = client
        .classify_pair(
            "https://crops.example.com/item-1.jpg",
            &metadata(),
            &candidate("0190646641016", None),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, VisionError::MalformedResponse { .. }));
}

#[tokio::test]
async fn classify_pair_maps_unknown_tier_to_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/compare"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "match_tier": "pretty_close",
            "confidence": 0.8,
            "visual_similarity": 0.8,
            "reasoning": ""
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client
        .classify_pair(
            "https://crops.example.com/item-1.jpg",
            &metadata(),
            &candidate("0190646641016", Some("https://img.example.com/oatly.jpg")),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, VisionError::MalformedResponse { .. }));
}

#[tokio::test]
async fn classify_pair_maps_429_to_rate_limited() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/compare"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "11"))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client
        .classify_pair(
            "https://crops.example.com/item-1.jpg",
            &metadata(),
            &candidate("0190646641016", Some("https://img.example.com/oatly.jpg")),
        )
        .await
        .unwrap_err();

    match err {
        VisionError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 11),
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn select_best_returns_validated_verdict() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/select"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "selected_index": 1,
            "confidence": 0.88,
            "visual_similarity": 0.95,
            "brand_match": true,
            "size_match": true,
            "flavor_match": false,
            "reasoning": "Second candidate matches the carton; flavor text differs.",
            "candidate_similarities": [0.92, 0.95, 0.40]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let candidates = vec![
        candidate("0190646641016", Some("https://img.example.com/a.jpg")),
        candidate("0190646641023", Some("https://img.example.com/b.jpg")),
        candidate("0190646641030", Some("https://img.example.com/c.jpg")),
    ];
    let verdict = client
        .select_best("https://crops.example.com/item-1.jpg", &metadata(), &candidates)
        .await
        .expect("should parse selection verdict");

    assert_eq!(verdict.selected_index, Some(1));
    assert_eq!(verdict.candidate_similarities.len(), 3);
    assert!(!verdict.flavor_match);
}

#[tokio::test]
async fn select_best_rejects_similarity_count_mismatch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/select"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "selected_index": 0,
            "confidence": 0.9,
            "visual_similarity": 0.9,
            "candidate_similarities": [0.9]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let candidates = vec![
        candidate("0190646641016", Some("https://img.example.com/a.jpg")),
        candidate("0190646641023", Some("https://img.example.com/b.jpg")),
    ];
    let err = client
        .select_best("https://crops.example.com/item-1.jpg", &metadata(), &candidates)
        .await
        .unwrap_err();

    assert!(matches!(err, VisionError::MalformedResponse { .. }));
}

#[tokio::test]
async fn select_best_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/select"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/select"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "selected_index": null,
            "confidence": 0.2,
            "visual_similarity": 0.3,
            "reasoning": "No candidate resembles the item.",
            "candidate_similarities": [0.3]
        })))
        .mount(&server)
        .await;

    let client = VisionClient::new(&server.uri(), None, 30, 2, 0)
        .expect("client construction should not fail");
    let candidates = vec![candidate("0190646641016", Some("https://img.example.com/a.jpg"))];
    let verdict = client
        .select_best("https://crops.example.com/item-1.jpg", &metadata(), &candidates)
        .await
        .expect("should succeed after retry");

    assert!(verdict.selected_index.is_none());
}
