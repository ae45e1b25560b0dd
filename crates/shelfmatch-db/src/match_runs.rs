//! Database operations for `match_runs` and `match_run_items`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `match_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MatchRunRow {
    pub id: i64,
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

/// A row from the `match_run_items` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MatchRunItemRow {
    pub id: i64,
    pub match_run_id: i64,
    pub item_id: Uuid,
    pub outcome: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

const RUN_COLUMNS: &str = "id, public_id, strategy, trigger_source, status, started_at, \
     completed_at, total_items, succeeded, no_match, errors, error_message, created_at";

/// Creates a new match run in `queued` status.
///
/// Generates a UUID in Rust and binds it to `public_id`. Returns the full
/// newly-created row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_match_run(
    pool: &PgPool,
    strategy: &str,
    trigger_source: &str,
    total_items: i32,
) -> Result<MatchRunRow, DbError> {
    let public_id = Uuid::new_v4();

    let query = format!(
        "INSERT INTO match_runs (public_id, strategy, trigger_source, status, total_items) \
         VALUES ($1, $2, $3, 'queued', $4) \
         RETURNING {RUN_COLUMNS}"
    );
    let row = sqlx::query_as::<_, MatchRunRow>(&query)
        .bind(public_id)
        .bind(strategy)
        .bind(trigger_source)
        .bind(total_items)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Marks a run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidMatchRunTransition`] if the run is not
/// currently `queued`, or [`DbError::Sqlx`] if the update fails.
pub async fn start_match_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE match_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidMatchRunTransition {
            id,
            expected_status: "queued",
        });
    }

    Ok(())
}

/// Marks a run as `succeeded` and records the final counters.
///
/// # Errors
///
/// Returns [`DbError::InvalidMatchRunTransition`] if the run is not
/// currently `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_match_run(
    pool: &PgPool,
    id: i64,
    succeeded: i32,
    no_match: i32,
    errors: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE match_runs \
         SET status = 'succeeded', completed_at = NOW(), \
             succeeded = $1, no_match = $2, errors = $3 \
         WHERE id = $4 AND status = 'running'",
    )
    .bind(succeeded)
    .bind(no_match)
    .bind(errors)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidMatchRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `failed`, sets `completed_at = NOW()` and `error_message`.
///
/// # Errors
///
/// Returns [`DbError::InvalidMatchRunTransition`] if the run is not
/// currently `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_match_run(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE match_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $1 \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidMatchRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_match_run(pool: &PgPool, id: i64) -> Result<MatchRunRow, DbError> {
    let query = format!("SELECT {RUN_COLUMNS} FROM match_runs WHERE id = $1");
    let row = sqlx::query_as::<_, MatchRunRow>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Fetches a single run by its public UUID.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_match_run_by_public_id(
    pool: &PgPool,
    public_id: Uuid,
) -> Result<MatchRunRow, DbError> {
    let query = format!("SELECT {RUN_COLUMNS} FROM match_runs WHERE public_id = $1");
    let row = sqlx::query_as::<_, MatchRunRow>(&query)
        .bind(public_id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Returns the most recent `limit` runs, ordered by `created_at DESC`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_match_runs(pool: &PgPool, limit: i64) -> Result<Vec<MatchRunRow>, DbError> {
    let query = format!(
        "SELECT {RUN_COLUMNS} FROM match_runs \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1"
    );
    let rows = sqlx::query_as::<_, MatchRunRow>(&query)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Inserts or updates the per-item outcome row for a match run.
///
/// Conflicts on `(match_run_id, item_id)` update `outcome` and `detail` in
/// place, so re-delivered progress events stay idempotent.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_match_run_item(
    pool: &PgPool,
    run_id: i64,
    item_id: Uuid,
    outcome: &str,
    detail: Option<&str>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO match_run_items (match_run_id, item_id, outcome, detail) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (match_run_id, item_id) DO UPDATE SET \
             outcome = EXCLUDED.outcome, \
             detail  = EXCLUDED.detail",
    )
    .bind(run_id)
    .bind(item_id)
    .bind(outcome)
    .bind(detail)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns all item-level outcome rows for a given run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_match_run_items(
    pool: &PgPool,
    run_id: i64,
) -> Result<Vec<MatchRunItemRow>, DbError> {
    let rows = sqlx::query_as::<_, MatchRunItemRow>(
        "SELECT id, match_run_id, item_id, outcome, detail, created_at \
         FROM match_run_items \
         WHERE match_run_id = $1 \
         ORDER BY id ASC",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
