//! Staging → catalog promotion.
//!
//! Phase one (extraction) only ever writes staging rows; this module is
//! phase two. Planning is a pure function over the staged rows so the
//! dedupe/merge decisions are testable without a database, and the applied
//! upserts are idempotent — a crash mid-commit leaves the job in
//! `waiting_commit`, safely re-runnable.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use vcat_core::ExtractedProduct;
use vcat_db::{DbError, StagingItemRow};

/// What the committer decided to do, before touching the catalog.
#[derive(Debug)]
pub struct CommitPlan {
    /// One upsert per canonical URL, newest staged payload winning.
    pub upserts: Vec<ExtractedProduct>,
    /// Total staged rows considered (ok and error).
    pub staged: usize,
    /// `ok` rows dropped as duplicates of a newer row with the same key.
    pub skipped: usize,
    /// `error` rows plus `ok` rows whose payload would not parse.
    pub errors: usize,
}

/// The job's result summary, persisted on `jobs.summary`.
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub staged: usize,
    pub promoted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_errors: Vec<String>,
}

impl CommitSummary {
    /// The JSONB shape stored on the job row.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "staged": self.staged,
            "promoted": self.promoted,
            "updated": self.updated,
            "skipped": self.skipped,
            "errors": self.errors,
        });
        if !self.sample_errors.is_empty() {
            value["sample_errors"] = serde_json::json!(self.sample_errors);
        }
        value
    }
}

/// Plans the promotion of a job's staged rows.
///
/// Rows must arrive in staging order (oldest first); when two `ok` rows map
/// to the same canonical URL the later one replaces the earlier in place,
/// so exactly one catalog upsert is produced per key.
#[must_use]
pub fn plan_commit(rows: &[StagingItemRow]) -> CommitPlan {
    let mut upserts: Vec<ExtractedProduct> = Vec::new();
    let mut index: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut skipped = 0usize;
    let mut errors = 0usize;

    for row in rows {
        if row.status != "ok" {
            errors += 1;
            continue;
        }

        let Some(product) = row
            .payload
            .as_ref()
            .and_then(|p| serde_json::from_value::<ExtractedProduct>(p.clone()).ok())
        else {
            tracing::warn!(url = %row.url, "staged ok row has no parseable payload");
            errors += 1;
            continue;
        };

        let key = if product.canonical_url.is_empty() {
            row.url.clone()
        } else {
            product.canonical_url.clone()
        };

        match index.get(&key) {
            Some(&slot) => {
                skipped += 1;
                upserts[slot] = product;
            }
            None => {
                index.insert(key, upserts.len());
                upserts.push(product);
            }
        }
    }

    CommitPlan {
        upserts,
        staged: rows.len(),
        skipped,
        errors,
    }
}

/// Applies a commit plan to the catalog.
///
/// Each upsert is independent: a failed catalog write is recorded in the
/// summary and does not block the remaining items.
///
/// # Errors
///
/// Returns [`DbError`] only when the staged rows cannot be read at all.
pub async fn run_commit(
    pool: &PgPool,
    profile_id: i64,
    job_id: i64,
) -> Result<CommitSummary, DbError> {
    let rows = vcat_db::list_staging_items(pool, job_id).await?;
    let plan = plan_commit(&rows);

    let mut summary = CommitSummary {
        staged: plan.staged,
        skipped: plan.skipped,
        errors: plan.errors,
        ..CommitSummary::default()
    };

    for product in &plan.upserts {
        match vcat_db::upsert_product(pool, profile_id, job_id, product).await {
            Ok(true) => summary.promoted += 1,
            Ok(false) => summary.updated += 1,
            Err(e) => {
                tracing::error!(
                    job_id,
                    url = %product.canonical_url,
                    error = %e,
                    "catalog upsert failed; continuing with remaining items"
                );
                summary.errors += 1;
                if summary.sample_errors.len() < 5 {
                    summary
                        .sample_errors
                        .push(format!("{}: {e}", product.canonical_url));
                }
            }
        }
    }

    tracing::info!(
        job_id,
        staged = summary.staged,
        promoted = summary.promoted,
        updated = summary.updated,
        skipped = summary.skipped,
        errors = summary.errors,
        "commit finished"
    );

    Ok(summary)
}
