//! Database operations for the `jobs` table.
//!
//! Status transitions are guarded in SQL (`WHERE status = ...`) so a stale
//! caller can never move a job backwards along the state machine; a guard
//! miss surfaces as [`DbError::InvalidJobTransition`].

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: i64,
    pub public_id: Uuid,
    pub profile_id: i64,
    pub job_type: String,
    pub status: String,
    pub params: serde_json::Value,
    pub total_targets: i32,
    pub processed: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub error_message: Option<String>,
    pub summary: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Creates a new job in `pending` status and returns the full row.
///
/// Generates a UUID in Rust and binds it to `public_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_job(
    pool: &PgPool,
    profile_id: i64,
    job_type: &str,
    params: &serde_json::Value,
) -> Result<JobRow, DbError> {
    let public_id = Uuid::new_v4();

    let row = sqlx::query_as::<_, JobRow>(
        "INSERT INTO jobs (public_id, profile_id, job_type, status, params) \
         VALUES ($1, $2, $3, 'pending', $4) \
         RETURNING id, public_id, profile_id, job_type, status, params, \
                   total_targets, processed, succeeded, failed, error_message, summary, \
                   created_at, updated_at, completed_at",
    )
    .bind(public_id)
    .bind(profile_id)
    .bind(job_type)
    .bind(params)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetches a single job by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_job(pool: &PgPool, id: i64) -> Result<JobRow, DbError> {
    sqlx::query_as::<_, JobRow>(
        "SELECT id, public_id, profile_id, job_type, status, params, \
                total_targets, processed, succeeded, failed, error_message, summary, \
                created_at, updated_at, completed_at \
         FROM jobs \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Fetches a single job by its external UUID.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_job_by_public_id(pool: &PgPool, public_id: Uuid) -> Result<JobRow, DbError> {
    sqlx::query_as::<_, JobRow>(
        "SELECT id, public_id, profile_id, job_type, status, params, \
                total_targets, processed, succeeded, failed, error_message, summary, \
                created_at, updated_at, completed_at \
         FROM jobs \
         WHERE public_id = $1",
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns all non-terminal jobs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_jobs(pool: &PgPool) -> Result<Vec<JobRow>, DbError> {
    let rows = sqlx::query_as::<_, JobRow>(
        "SELECT id, public_id, profile_id, job_type, status, params, \
                total_targets, processed, succeeded, failed, error_message, summary, \
                created_at, updated_at, completed_at \
         FROM jobs \
         WHERE status IN ('pending', 'running', 'waiting_commit') \
         ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Marks a job as `running`.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not `pending`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn start_job(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE jobs SET status = 'running', updated_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "pending",
        });
    }

    Ok(())
}

/// Seeds target accounting for a (re-)started run.
///
/// `total` is the number of planned targets including ones already staged as
/// `ok`; `already_ok` of them count as processed and succeeded up front, so a
/// resumed job never re-reports or double-counts the targets it skips.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not `running`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn reset_job_progress(
    pool: &PgPool,
    id: i64,
    total: i32,
    already_ok: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE jobs \
         SET total_targets = $1, processed = $2, succeeded = $2, failed = 0, updated_at = NOW() \
         WHERE id = $3 AND status = 'running'",
    )
    .bind(total)
    .bind(already_ok)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Records one finished target in a single atomic increment.
///
/// Bumps `processed` and exactly one of `succeeded`/`failed`, so the
/// invariant `processed = succeeded + failed` can never be observed broken,
/// even under concurrent worker reporting.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is no longer
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn increment_job_progress(pool: &PgPool, id: i64, succeeded: bool) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE jobs \
         SET processed = processed + 1, \
             succeeded = succeeded + CASE WHEN $1 THEN 1 ELSE 0 END, \
             failed    = failed    + CASE WHEN $1 THEN 0 ELSE 1 END, \
             updated_at = NOW() \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(succeeded)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Moves a drained job to `waiting_commit`.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not `running`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn mark_waiting_commit(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE jobs SET status = 'waiting_commit', updated_at = NOW() \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a job as `completed` with its result summary.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not
/// `waiting_commit`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_job(
    pool: &PgPool,
    id: i64,
    summary: &serde_json::Value,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE jobs \
         SET status = 'completed', summary = $1, completed_at = NOW(), updated_at = NOW() \
         WHERE id = $2 AND status = 'waiting_commit'",
    )
    .bind(summary)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "waiting_commit",
        });
    }

    Ok(())
}

/// Marks a job as `failed` with a human-readable cause.
///
/// Accepted from any non-terminal state: submission-time validation has
/// already happened, so the remaining failure sources (auth, planning,
/// threshold, commit) can strike at any point of a live run.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is already terminal,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn fail_job(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE jobs \
         SET status = 'failed', error_message = $1, completed_at = NOW(), updated_at = NOW() \
         WHERE id = $2 AND status IN ('pending', 'running', 'waiting_commit')",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "pending|running|waiting_commit",
        });
    }

    Ok(())
}

/// Marks a job as `stopped`, recording a partial-commit summary when one was
/// produced.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is already terminal,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn stop_job(
    pool: &PgPool,
    id: i64,
    summary: Option<&serde_json::Value>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE jobs \
         SET status = 'stopped', summary = COALESCE($1, summary), \
             completed_at = NOW(), updated_at = NOW() \
         WHERE id = $2 AND status IN ('pending', 'running', 'waiting_commit')",
    )
    .bind(summary)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "pending|running|waiting_commit",
        });
    }

    Ok(())
}

/// Deletes a job row outright. Staging items cascade with it; products keep
/// their rows but lose the provenance reference (`ON DELETE SET NULL`).
///
/// Returns `true` when a row was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_job(pool: &PgPool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
