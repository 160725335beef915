//! Read-only access to the externally owned `profiles` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `profiles` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRow {
    pub id: i64,
    pub public_id: Uuid,
    pub name: String,
    pub domain_root: String,
    pub auth_required: bool,
    pub credential_id: Option<i64>,
    pub extraction_rules: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fetches a profile by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_profile(pool: &PgPool, id: i64) -> Result<ProfileRow, DbError> {
    sqlx::query_as::<_, ProfileRow>(
        "SELECT id, public_id, name, domain_root, auth_required, credential_id, \
                extraction_rules, created_at, updated_at \
         FROM profiles \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Fetches a profile by its external UUID, or `None` when it does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_profile_by_public_id(
    pool: &PgPool,
    public_id: Uuid,
) -> Result<Option<ProfileRow>, DbError> {
    let row = sqlx::query_as::<_, ProfileRow>(
        "SELECT id, public_id, name, domain_root, auth_required, credential_id, \
                extraction_rules, created_at, updated_at \
         FROM profiles \
         WHERE public_id = $1",
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns all profiles ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_profiles(pool: &PgPool) -> Result<Vec<ProfileRow>, DbError> {
    let rows = sqlx::query_as::<_, ProfileRow>(
        "SELECT id, public_id, name, domain_root, auth_required, credential_id, \
                extraction_rules, created_at, updated_at \
         FROM profiles \
         ORDER BY name ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
