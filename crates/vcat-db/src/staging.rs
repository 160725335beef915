//! Database operations for the `staging_items` table.
//!
//! Staging is the append-only per-item extraction ledger. Identity is
//! `(job_id, url)`: re-reporting a URL within a job overwrites the previous
//! attempt instead of inserting a duplicate.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `staging_items` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StagingItemRow {
    pub id: i64,
    pub job_id: i64,
    pub url: String,
    pub status: String,
    pub error_detail: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Inserts or overwrites the extraction result for one target URL.
///
/// Conflicts on `(job_id, url)` replace `status`, `error_detail`, `payload`,
/// and `created_at`, so the newest attempt always wins.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_staging_item(
    pool: &PgPool,
    job_id: i64,
    url: &str,
    status: &str,
    error_detail: Option<&str>,
    payload: Option<&serde_json::Value>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO staging_items (job_id, url, status, error_detail, payload) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (job_id, url) DO UPDATE SET \
             status       = EXCLUDED.status, \
             error_detail = EXCLUDED.error_detail, \
             payload      = EXCLUDED.payload, \
             created_at   = NOW()",
    )
    .bind(job_id)
    .bind(url)
    .bind(status)
    .bind(error_detail)
    .bind(payload)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns all staging rows for a job, oldest first.
///
/// The stable ordering matters to the committer: when two staged items map
/// to the same catalog key, the later row wins.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_staging_items(pool: &PgPool, job_id: i64) -> Result<Vec<StagingItemRow>, DbError> {
    let rows = sqlx::query_as::<_, StagingItemRow>(
        "SELECT id, job_id, url, status, error_detail, payload, created_at \
         FROM staging_items \
         WHERE job_id = $1 \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns the URLs already staged as `ok` for a job — the resume skip-set.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_ok_staging_urls(pool: &PgPool, job_id: i64) -> Result<Vec<String>, DbError> {
    let urls = sqlx::query_scalar::<_, String>(
        "SELECT url FROM staging_items WHERE job_id = $1 AND status = 'ok'",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    Ok(urls)
}

/// Deletes all staging rows for a job. Returns the number of rows removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_staging_for_job(pool: &PgPool, job_id: i64) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM staging_items WHERE job_id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
