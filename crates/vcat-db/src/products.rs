//! Database operations for the `products` table — the durable catalog.
//!
//! Only the committer writes here. Identity is `(profile_id, canonical_url)`;
//! a re-commit updates the existing row instead of inserting a duplicate.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub profile_id: i64,
    pub canonical_url: String,
    pub name: String,
    pub image_url: String,
    pub file_urls: serde_json::Value,
    pub guessed_code: String,
    pub category: String,
    pub source_job_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upserts a catalog product from a staged extraction payload.
///
/// Merge semantics on conflict: a freshly extracted non-empty field
/// overwrites the stored value, but an empty field never clobbers a
/// previously known good one. Provenance (`source_job_id`) always moves to
/// the committing job.
///
/// Returns `true` when a new row was inserted, `false` on update.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_product(
    pool: &PgPool,
    profile_id: i64,
    source_job_id: i64,
    product: &vcat_core::ExtractedProduct,
) -> Result<bool, DbError> {
    let file_urls = serde_json::json!(product.file_urls);

    // xmax = 0 distinguishes a fresh insert from a conflict update.
    let inserted: bool = sqlx::query_scalar::<_, bool>(
        "INSERT INTO products \
             (profile_id, canonical_url, name, image_url, file_urls, \
              guessed_code, category, source_job_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (profile_id, canonical_url) DO UPDATE SET \
             name          = CASE WHEN EXCLUDED.name <> '' \
                                  THEN EXCLUDED.name ELSE products.name END, \
             image_url     = CASE WHEN EXCLUDED.image_url <> '' \
                                  THEN EXCLUDED.image_url ELSE products.image_url END, \
             file_urls     = CASE WHEN jsonb_array_length(EXCLUDED.file_urls) > 0 \
                                  THEN EXCLUDED.file_urls ELSE products.file_urls END, \
             guessed_code  = CASE WHEN EXCLUDED.guessed_code <> '' \
                                  THEN EXCLUDED.guessed_code ELSE products.guessed_code END, \
             category      = CASE WHEN EXCLUDED.category <> '' \
                                  THEN EXCLUDED.category ELSE products.category END, \
             source_job_id = EXCLUDED.source_job_id, \
             updated_at    = NOW() \
         RETURNING (xmax = 0) AS inserted",
    )
    .bind(profile_id)
    .bind(&product.canonical_url)
    .bind(&product.name)
    .bind(&product.image_url)
    .bind(file_urls)
    .bind(&product.guessed_code)
    .bind(&product.category)
    .bind(source_job_id)
    .fetch_one(pool)
    .await?;

    Ok(inserted)
}

/// Deletes all products whose provenance is the given job — the data-purge
/// path of a stop request. Returns the number of rows removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_products_for_job(pool: &PgPool, job_id: i64) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM products WHERE source_job_id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Returns one page of catalog products, optionally scoped to a profile.
///
/// Ordered by `id` for a stable pagination cursor.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products(
    pool: &PgPool,
    profile_id: Option<i64>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(
        "SELECT id, profile_id, canonical_url, name, image_url, file_urls, \
                guessed_code, category, source_job_id, created_at, updated_at \
         FROM products \
         WHERE ($1::bigint IS NULL OR profile_id = $1) \
         ORDER BY id ASC \
         LIMIT $2 OFFSET $3",
    )
    .bind(profile_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Counts catalog products, optionally scoped to a profile.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_products(pool: &PgPool, profile_id: Option<i64>) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM products WHERE ($1::bigint IS NULL OR profile_id = $1)",
    )
    .bind(profile_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
