//! Read-only access to the externally owned `credentials` table.
//!
//! `secret_enc` stays encoded here; only the session manager decodes it, in
//! memory, for the duration of a login attempt.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `credentials` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CredentialRow {
    pub id: i64,
    pub name: String,
    pub service_url: Option<String>,
    pub username: String,
    pub secret_enc: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fetches a credential by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_credential(pool: &PgPool, id: i64) -> Result<CredentialRow, DbError> {
    sqlx::query_as::<_, CredentialRow>(
        "SELECT id, name, service_url, username, secret_enc, created_at, updated_at \
         FROM credentials \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
