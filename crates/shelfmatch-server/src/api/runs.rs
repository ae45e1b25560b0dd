//! Match-run endpoints: launch, history, and the live SSE progress stream.

use std::convert::Infallible;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use shelfmatch_core::{DetectedItem, MatchStrategy};
use shelfmatch_db::{ItemFilter, MatchRunRow};
use shelfmatch_pipeline::{execute_match_run, MatchDeps, ProgressEvent};

use crate::api::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};
use crate::middleware::RequestId;

/// Broadcast capacity per run; a slow SSE consumer lags rather than
/// backpressuring the orchestrator.
const RUN_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
pub(super) struct CreateRunRequest {
    pub strategy: Option<String>,
    pub concurrency: Option<usize>,
    pub image_id: Option<Uuid>,
    pub limit: Option<i64>,
    /// Re-run items that already hold a selected match.
    #[serde(default)]
    pub rematch: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct RunSummary {
    pub public_id: Uuid,
    pub strategy: String,
    pub trigger_source: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_items: i32,
    pub succeeded: i32,
    pub no_match: i32,
    pub errors: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&MatchRunRow> for RunSummary {
    fn from(row: &MatchRunRow) -> Self {
        Self {
            public_id: row.public_id,
            strategy: row.strategy.clone(),
            trigger_source: row.trigger_source.clone(),
            status: row.status.clone(),
            started_at: row.started_at,
            completed_at: row.completed_at,
            total_items: row.total_items,
            succeeded: row.succeeded,
            no_match: row.no_match,
            errors: row.errors,
            error_message: row.error_message.clone(),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct RunItemOutcome {
    pub item_id: Uuid,
    pub outcome: String,
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct RunDetail {
    #[serde(flatten)]
    pub run: RunSummary,
    pub items: Vec<RunItemOutcome>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ListRunsQuery {
    limit: Option<i64>,
}

pub(super) async fn create_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(request): Json<CreateRunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let strategy = match request.strategy.as_deref() {
        None => state.deps.strategy,
        Some(raw) => MatchStrategy::from_str(raw).map_err(|e| {
            ApiError::new(req_id.0.clone(), "validation_error", e.to_string())
        })?,
    };
    let concurrency = shelfmatch_pipeline::clamp_concurrency(
        request.concurrency.unwrap_or(state.default_concurrency),
    );

    let filter = ItemFilter {
        image_id: request.image_id,
        include_matched: request.rematch,
    };
    let rows = shelfmatch_db::list_items(&state.pool, filter, normalize_limit(request.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    if rows.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "no items to match for the given filter",
        ));
    }

    // Canonicalize retailer spellings so the pre-filter compares catalog
    // tags against a stable slug.
    let items: Vec<DetectedItem> = rows
        .iter()
        .map(|row| {
            let mut item = row.to_detected_item();
            item.retailer = item.retailer.map(|r| state.registry.canonicalize(&r));
            item
        })
        .collect();

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let run = shelfmatch_db::create_match_run(&state.pool, strategy.as_str(), "api", items.len() as i32)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let run_deps = Arc::new(MatchDeps {
        pool: state.pool.clone(),
        catalog: Arc::clone(&state.deps.catalog),
        vision: Arc::clone(&state.deps.vision),
        strategy,
        search_limit: state.deps.search_limit,
    });

    let (events_tx, events_rx) = mpsc::channel::<ProgressEvent>(64);
    let (broadcast_tx, _) = broadcast::channel(RUN_CHANNEL_CAPACITY);
    state
        .run_channels
        .lock()
        .await
        .insert(run.id, broadcast_tx.clone());

    let run_id = run.id;
    let run_channels = Arc::clone(&state.run_channels);
    tokio::spawn(async move {
        let executor = tokio::spawn(execute_match_run(
            run_deps,
            items,
            run_id,
            concurrency,
            events_tx,
        ));

        forward_events(events_rx, &broadcast_tx).await;
        run_channels.lock().await.remove(&run_id);

        match executor.await {
            Ok(Ok(summary)) => {
                tracing::info!(
                    run_id,
                    succeeded = summary.counters.succeeded,
                    no_match = summary.counters.no_match,
                    errors = summary.counters.errors,
                    "match run finished"
                );
            }
            Ok(Err(err)) => tracing::error!(run_id, error = %err, "match run failed"),
            Err(err) => tracing::error!(run_id, error = %err, "match run task aborted"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            data: RunSummary::from(&run),
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

async fn forward_events(
    mut events_rx: mpsc::Receiver<ProgressEvent>,
    broadcast_tx: &broadcast::Sender<ProgressEvent>,
) {
    while let Some(event) = events_rx.recv().await {
        // A send error just means no SSE client is currently subscribed.
        let _ = broadcast_tx.send(event);
    }
}

pub(super) async fn list_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ListRunsQuery>,
) -> impl IntoResponse {
    match shelfmatch_db::list_match_runs(&state.pool, normalize_limit(query.limit)).await {
        Ok(rows) => {
            let data: Vec<RunSummary> = rows.iter().map(Into::into).collect();
            Ok(Json(ApiResponse {
                data,
                meta: ResponseMeta::new(req_id.0),
            }))
        }
        Err(e) => Err(map_db_error(req_id.0, &e)),
    }
}

pub(super) async fn get_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(public_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let run = shelfmatch_db::get_match_run_by_public_id(&state.pool, public_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let items = shelfmatch_db::list_match_run_items(&state.pool, run.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .iter()
        .map(|row| RunItemOutcome {
            item_id: row.item_id,
            outcome: row.outcome.clone(),
            detail: row.detail.clone(),
        })
        .collect();

    Ok(Json(ApiResponse {
        data: RunDetail {
            run: RunSummary::from(&run),
            items,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// SSE stream of a run's progress events.
///
/// While the run is in flight, events are relayed live from the
/// orchestrator's channel and the stream ends after the terminal event. For
/// an already-finished run, a single terminal event built from the stored
/// run row is replayed so late subscribers still observe an ordered,
/// terminated stream.
pub(super) async fn run_events(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(public_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let run = shelfmatch_db::get_match_run_by_public_id(&state.pool, public_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let live = state.run_channels.lock().await.get(&run.id).map(broadcast::Sender::subscribe);

    let stream: EventStream = if let Some(mut receiver) = live {
        Box::pin(async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let terminal = matches!(
                            event,
                            ProgressEvent::Complete { .. } | ProgressEvent::Error { .. }
                        );
                        if let Ok(sse_event) = Event::default().event(event.name()).json_data(&event) {
                            yield Ok(sse_event);
                        }
                        if terminal {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "SSE subscriber lagged behind run progress");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    } else {
        match run.status.as_str() {
            "succeeded" | "failed" => {
                let name = if run.status == "succeeded" { "complete" } else { "error" };
                let summary = RunSummary::from(&run);
                Box::pin(async_stream::stream! {
                    if let Ok(sse_event) = Event::default().event(name).json_data(&summary) {
                        yield Ok(sse_event);
                    }
                })
            }
            _ => {
                return Err(ApiError::new(
                    req_id.0,
                    "conflict",
                    "run is not active on this instance and has not finished",
                ));
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}
