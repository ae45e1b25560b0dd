mod items;
mod runs;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::{broadcast, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use shelfmatch_core::RetailerRegistry;
use shelfmatch_pipeline::{MatchDeps, ProgressEvent};

use crate::middleware::{enforce_rate_limit, request_id, RateLimitState, RequestId};

/// Live progress channels for in-flight runs, keyed by internal run id.
/// Entries are removed when a run reaches its terminal event.
pub type RunChannels = Arc<Mutex<HashMap<i64, broadcast::Sender<ProgressEvent>>>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub deps: Arc<MatchDeps>,
    pub registry: Arc<RetailerRegistry>,
    pub run_channels: RunChannels,
    pub default_concurrency: usize,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 500)
}

pub(super) fn map_db_error(request_id: String, error: &shelfmatch_db::DbError) -> ApiError {
    if matches!(error, shelfmatch_db::DbError::NotFound) {
        return ApiError::new(request_id, "not_found", "record not found");
    }
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
}

fn api_router(rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/items", get(items::list_items))
        .route("/api/v1/items/{item_id}", get(items::get_item))
        .route(
            "/api/v1/match-runs",
            get(runs::list_runs).post(runs::create_run),
        )
        .route("/api/v1/match-runs/{public_id}", get(runs::get_run))
        .route(
            "/api/v1/match-runs/{public_id}/events",
            get(runs::run_events),
        )
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn_with_state(
            rate_limit,
            enforce_rate_limit,
        )))
}

pub fn build_app(state: AppState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(api_router(rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match shelfmatch_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::items::ItemSummary;
    use super::*;

    #[test]
    fn normalize_limit_applies_defaults_and_bounds() {
        assert_eq!(normalize_limit(None), 50);
        assert_eq!(normalize_limit(Some(0)), 1);
        assert_eq!(normalize_limit(Some(10_000)), 500);
        assert_eq!(normalize_limit(Some(25)), 25);
    }

    #[test]
    fn api_error_validation_error_maps_to_bad_request() {
        let response = ApiError::new("req-1", "validation_error", "invalid input").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn api_error_not_found_maps_to_404() {
        let response = ApiError::new("req-1", "not_found", "missing").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    fn test_state(pool: PgPool) -> AppState {
        let catalog = Arc::new(
            shelfmatch_catalog::CatalogClient::new("http://127.0.0.1:1", None, 5, 0, 0)
                .expect("catalog client"),
        );
        let vision = Arc::new(
            shelfmatch_vision::VisionClient::new("http://127.0.0.1:1", None, 5, 0, 0)
                .expect("vision client"),
        );
        let deps = Arc::new(MatchDeps {
            pool: pool.clone(),
            catalog,
            vision,
            strategy: shelfmatch_core::MatchStrategy::Tiered,
            search_limit: 25,
        });
        let registry = Arc::new(RetailerRegistry::from_file(
            &shelfmatch_core::RetailersFile { retailers: vec![] },
        ));
        AppState {
            pool,
            deps,
            registry,
            run_channels: Arc::new(Mutex::new(HashMap::new())),
            default_concurrency: 3,
        }
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn list_items_returns_seeded_item(pool: sqlx::PgPool) {
        use axum::body::{to_bytes, Body};
        use axum::http::Request;
        use tower::ServiceExt;

        let item = shelfmatch_core::DetectedItem {
            id: uuid::Uuid::new_v4(),
            image_id: uuid::Uuid::new_v4(),
            crop_url: "https://crops.example.com/list-test.jpg".to_string(),
            bounding_box: shelfmatch_core::BoundingBox {
                x: 0,
                y: 0,
                width: 50,
                height: 80,
            },
            retailer: None,
            metadata: shelfmatch_core::ItemMetadata {
                brand: Some(shelfmatch_core::ExtractedField::new("LaCroix")),
                ..shelfmatch_core::ItemMetadata::default()
            },
        };
        shelfmatch_db::insert_detected_item(&pool, &item)
            .await
            .expect("seed item");

        let app = build_app(test_state(pool), default_rate_limit_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/items")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json parse");
        let data = json["data"].as_array().expect("data array");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["brand"].as_str(), Some("LaCroix"));
        assert!(data[0]["selected_catalog_key"].is_null());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn get_run_returns_404_for_unknown_public_id(pool: sqlx::PgPool) {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let app = build_app(test_state(pool), default_rate_limit_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/match-runs/{}", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn create_run_with_no_items_is_a_validation_error(pool: sqlx::PgPool) {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let app = build_app(test_state(pool), default_rate_limit_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/match-runs")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn item_summary_is_serializable() {
        let item = ItemSummary {
            id: uuid::Uuid::new_v4(),
            image_id: uuid::Uuid::new_v4(),
            crop_url: "https://crops.example.com/1.jpg".to_string(),
            retailer: Some("kroger".to_string()),
            brand: Some("LaCroix".to_string()),
            product_name: Some("Sparkling Water".to_string()),
            size: Some("12 oz".to_string()),
            flavor: None,
            selected_catalog_key: Some("0012993201012".to_string()),
            selected_tier: Some("identical".to_string()),
            selected_confidence: Some(0.95),
            selected_method: Some("consolidation".to_string()),
            matched_at: Some(Utc::now()),
        };
        let json = serde_json::to_string(&item).expect("serialize");
        assert!(json.contains("\"selected_tier\":\"identical\""));
    }
}
