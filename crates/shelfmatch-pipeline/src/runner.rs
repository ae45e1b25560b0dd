//! Shared production wrapper around [`run_batch`]: run-row lifecycle plus
//! per-item outcome persistence, used by both the CLI and the server.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::mpsc;

use shelfmatch_core::DetectedItem;

use crate::batch::{run_batch, BatchSummary, ProgressEvent};
use crate::item::{run_item, MatchDeps};

/// Executes a match run end to end: marks the run row `running`, processes
/// every item under the concurrency limit while streaming progress, records
/// each item's outcome on the run, and finalizes the run row with the
/// counters.
///
/// Per-item outcome rows are written best-effort — losing one is a logging
/// problem, not a reason to fail the item, and the run row still carries
/// the authoritative totals.
///
/// # Errors
///
/// Returns [`shelfmatch_db::DbError`] when the run-row lifecycle updates
/// fail; the run is marked `failed` best-effort before returning.
pub async fn execute_match_run(
    deps: Arc<MatchDeps>,
    items: Vec<DetectedItem>,
    run_id: i64,
    concurrency: usize,
    progress: mpsc::Sender<ProgressEvent>,
) -> Result<BatchSummary, shelfmatch_db::DbError> {
    if let Err(err) = shelfmatch_db::start_match_run(&deps.pool, run_id).await {
        let _ = progress
            .send(ProgressEvent::Error {
                message: err.to_string(),
            })
            .await;
        fail_run_best_effort(&deps.pool, run_id, &err.to_string()).await;
        return Err(err);
    }

    let process_deps = Arc::clone(&deps);
    let summary = run_batch(items, concurrency, progress.clone(), move |item| {
        let deps = Arc::clone(&process_deps);
        async move {
            let outcome = run_item(&deps, &item).await;
            if let Err(err) = shelfmatch_db::upsert_match_run_item(
                &deps.pool,
                run_id,
                item.id,
                outcome.as_str(),
                outcome.detail().as_deref(),
            )
            .await
            {
                tracing::warn!(
                    item_id = %item.id,
                    error = %err,
                    "failed to record run item outcome"
                );
            }
            outcome
        }
    })
    .await;

    #[allow(clippy::cast_possible_wrap)]
    let result = shelfmatch_db::complete_match_run(
        &deps.pool,
        run_id,
        summary.counters.succeeded as i32,
        summary.counters.no_match as i32,
        summary.counters.errors as i32,
    )
    .await;

    if let Err(err) = result {
        let _ = progress
            .send(ProgressEvent::Error {
                message: err.to_string(),
            })
            .await;
        fail_run_best_effort(&deps.pool, run_id, &err.to_string()).await;
        return Err(err);
    }

    Ok(summary)
}

/// Marks the run `failed`, logging rather than propagating a second
/// failure — the original error is the one worth surfacing.
async fn fail_run_best_effort(pool: &PgPool, run_id: i64, message: &str) {
    if let Err(err) = shelfmatch_db::fail_match_run(pool, run_id, message).await {
        tracing::error!(run_id, error = %err, "failed to mark match run as failed");
    }
}
