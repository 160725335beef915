//! The job orchestrator: lifecycle, counters, stop/cancel, and the
//! extraction → staging → commit control flow of a single job.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use vcat_core::{AppConfig, JobStatus, JobType};
use vcat_db::JobRow;
use vcat_scraper::{
    flatten_product_urls, AuthMode, Credentials, DomainLimiter, ExtractionRules, PageClient,
    ScrapeError, Session, StructureScanner,
};

use crate::commit;
use crate::error::EngineError;
use crate::spec::{JobParams, JobSpec};
use crate::worker::{self, ItemOutcome};

struct ActiveJob {
    token: CancellationToken,
    purge_requested: bool,
}

/// Owns job lifecycle end to end.
///
/// One orchestrator serves the whole process; multiple jobs run
/// concurrently, each driving its own bounded worker pool. The per-domain
/// rate limiter is shared across jobs so parallel jobs against the same
/// vendor stay polite together.
pub struct Orchestrator {
    pool: PgPool,
    config: Arc<AppConfig>,
    limiter: Arc<DomainLimiter>,
    active: Mutex<HashMap<i64, ActiveJob>>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(pool: PgPool, config: Arc<AppConfig>) -> Self {
        let limiter = Arc::new(DomainLimiter::new(Duration::from_millis(
            config.crawler_inter_request_delay_ms,
        )));
        Self {
            pool,
            config,
            limiter,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Validates a job spec and creates the job in `pending`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidSpec`] — empty or malformed parameters; no job
    ///   row is created.
    /// - [`EngineError::ProfileNotFound`] — unknown profile reference.
    /// - [`EngineError::Db`] — persistence failure.
    pub async fn submit(&self, spec: &JobSpec) -> Result<JobRow, EngineError> {
        spec.validate()?;

        let profile = vcat_db::get_profile_by_public_id(&self.pool, spec.profile_id)
            .await?
            .ok_or(EngineError::ProfileNotFound(spec.profile_id))?;

        let params = serde_json::json!(spec.params());
        let job = vcat_db::create_job(&self.pool, profile.id, spec.job_type.as_str(), &params).await?;
        tracing::info!(
            job_id = job.id,
            public_id = %job.public_id,
            job_type = %job.job_type,
            profile = %profile.name,
            "job submitted"
        );
        Ok(job)
    }

    /// Runs a job in the background, logging instead of propagating its
    /// outcome. Used by the control surface, which only acknowledges the
    /// submission.
    pub fn spawn(self: Arc<Self>, job_id: i64) {
        tokio::spawn(async move {
            if let Err(e) = self.run(job_id).await {
                tracing::error!(job_id, error = %e, "job run failed");
            }
        });
    }

    /// Drives one job to a terminal state and returns its final row.
    ///
    /// Idempotent: a second call while the job is being driven is a no-op
    /// returning the current row, and re-running an interrupted `running` or
    /// `waiting_commit` job resumes instead of restarting.
    ///
    /// # Errors
    ///
    /// Returns the job-level failure after recording it on the job row
    /// (`failed` status with a human-readable cause).
    pub async fn run(self: Arc<Self>, job_id: i64) -> Result<JobRow, EngineError> {
        let token = {
            let mut active = self.active.lock().await;
            if active.contains_key(&job_id) {
                drop(active);
                return Ok(vcat_db::get_job(&self.pool, job_id).await?);
            }
            let token = CancellationToken::new();
            active.insert(
                job_id,
                ActiveJob {
                    token: token.clone(),
                    purge_requested: false,
                },
            );
            token
        };

        let result = self.drive(job_id, &token).await;
        self.active.lock().await.remove(&job_id);

        if let Err(e) = &result {
            fail_job_best_effort(&self.pool, job_id, &e.to_string()).await;
        }

        let job = vcat_db::get_job(&self.pool, job_id).await?;
        result.map(|()| job)
    }

    /// Signals cancellation to a job's pool and returns the acknowledged row.
    ///
    /// In-flight targets finish their current page; nothing new is
    /// dispatched. With `purge` the job's staged rows and its provenance
    /// products are deleted on drain and no commit happens; without it,
    /// already-staged results are promoted first when the stop policy says
    /// so. A job without a live driver (still `pending`, or orphaned by a
    /// restart) is settled directly.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Db`] when the job cannot be read or settled.
    pub async fn request_stop(&self, job_id: i64, purge: bool) -> Result<JobRow, EngineError> {
        let job = vcat_db::get_job(&self.pool, job_id).await?;

        let signalled = {
            let mut active = self.active.lock().await;
            match active.get_mut(&job_id) {
                Some(entry) => {
                    entry.purge_requested = entry.purge_requested || purge;
                    entry.token.cancel();
                    true
                }
                None => false,
            }
        };

        if signalled {
            tracing::info!(job_id, purge, "stop requested; pool will drain");
        } else if !JobStatus::parse(&job.status).is_some_and(JobStatus::is_terminal) {
            tracing::info!(job_id, purge, "stopping job with no live driver");
            self.finish_stopped(job_id, job.profile_id, purge).await?;
        }

        Ok(vcat_db::get_job(&self.pool, job_id).await?)
    }

    /// Deletes a terminal job together with its staged rows and provenance
    /// products.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSpec`] when the job is still live, or
    /// [`EngineError::Db`] on persistence failure.
    pub async fn purge_job(&self, job_id: i64) -> Result<(), EngineError> {
        let job = vcat_db::get_job(&self.pool, job_id).await?;
        if !JobStatus::parse(&job.status).is_some_and(JobStatus::is_terminal) {
            return Err(EngineError::InvalidSpec(format!(
                "job {} is still {}; stop it before purging",
                job.public_id, job.status
            )));
        }

        let products = vcat_db::delete_products_for_job(&self.pool, job_id).await?;
        vcat_db::delete_job(&self.pool, job_id).await?;
        tracing::info!(job_id, products, "job purged");
        Ok(())
    }

    /// Runs an ad hoc structure scan outside any job — the crawl-plan
    /// preview used by the control surface.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Scrape`] when the root page cannot be scanned.
    pub async fn scan_structure(
        &self,
        url: &str,
        deep: bool,
    ) -> Result<vcat_scraper::NavNode, EngineError> {
        let client = PageClient::new(
            self.config.crawler_request_timeout_secs,
            &self.config.crawler_user_agent,
            self.config.crawler_max_retries,
            self.config.crawler_retry_backoff_base_secs,
            Arc::clone(&self.limiter),
        )?;
        let rules = ExtractionRules::default();
        let scanner = StructureScanner::new(&client, &rules, self.scan_depth(deep));
        Ok(scanner.scan(url).await?)
    }

    /// Records one worker outcome: staging upsert plus the atomic counter
    /// increment. Persistence failures here are item-scoped and absorbed.
    pub async fn report_item_result(&self, job_id: i64, url: &str, outcome: &ItemOutcome) {
        let staged = match outcome {
            ItemOutcome::Ok(product) => {
                vcat_db::upsert_staging_item(
                    &self.pool,
                    job_id,
                    url,
                    "ok",
                    None,
                    Some(&serde_json::json!(product)),
                )
                .await
            }
            ItemOutcome::Error(e) => {
                vcat_db::upsert_staging_item(
                    &self.pool,
                    job_id,
                    url,
                    "error",
                    Some(&format!("{}: {e}", e.cause())),
                    None,
                )
                .await
            }
        };

        if let Err(e) = staged {
            tracing::error!(job_id, url, error = %e, "failed to stage item result");
            return;
        }

        if let Err(e) =
            vcat_db::increment_job_progress(&self.pool, job_id, outcome.succeeded()).await
        {
            tracing::warn!(job_id, url, error = %e, "failed to update job counters");
        }
    }

    async fn drive(&self, job_id: i64, token: &CancellationToken) -> Result<(), EngineError> {
        let job = vcat_db::get_job(&self.pool, job_id).await?;
        let status = JobStatus::parse(&job.status);
        match status {
            Some(JobStatus::Pending) => vcat_db::start_job(&self.pool, job_id).await?,
            Some(JobStatus::Running | JobStatus::WaitingCommit) => {
                tracing::info!(job_id, status = %job.status, "resuming interrupted job");
            }
            _ => return Ok(()),
        }

        let profile = vcat_db::get_profile(&self.pool, job.profile_id).await?;
        let params: JobParams = serde_json::from_value(job.params.clone()).unwrap_or_default();
        let rules: ExtractionRules =
            serde_json::from_value(profile.extraction_rules.clone()).unwrap_or_default();

        // A crash between drain and commit leaves `waiting_commit`; the
        // upserts are idempotent, so just finish the promotion.
        if status == Some(JobStatus::WaitingCommit) {
            let summary = commit::run_commit(&self.pool, profile.id, job_id).await?;
            vcat_db::complete_job(&self.pool, job_id, &summary.to_json()).await?;
            return Ok(());
        }

        let client = PageClient::new(
            self.config.crawler_request_timeout_secs,
            &self.config.crawler_user_agent,
            self.config.crawler_max_retries,
            self.config.crawler_retry_backoff_base_secs,
            Arc::clone(&self.limiter),
        )?;

        // Auth resolves and establishes before anything is dispatched; a
        // failed login fails the job with zero staging rows written.
        let credentials = match profile.credential_id {
            Some(credential_id) => {
                let row = vcat_db::get_credential(&self.pool, credential_id).await?;
                Some(Credentials {
                    username: row.username,
                    secret_enc: row.secret_enc,
                    service_url: row.service_url,
                })
            }
            None => None,
        };
        let mode =
            AuthMode::resolve(profile.auth_required, credentials.as_ref()).map_err(auth_failure)?;
        let mut session = Session::new(&client, mode, credentials);
        session.establish().await.map_err(auth_failure)?;

        if JobType::parse(&job.job_type) == Some(JobType::StructureScan) {
            let root = params.scan_root.clone().ok_or_else(|| {
                EngineError::InvalidSpec("structure_scan job has no scan_root".to_string())
            })?;
            let scanner = StructureScanner::new(&client, &rules, self.scan_depth(params.deep));
            let tree = scanner.scan(&root).await?;

            vcat_db::mark_waiting_commit(&self.pool, job_id).await?;
            vcat_db::complete_job(&self.pool, job_id, &serde_json::json!({ "tree": tree }))
                .await?;
            return Ok(());
        }

        // Plan the target list: explicit URLs, plus a structure scan when a
        // root was given.
        let mut targets = params.target_urls.clone();
        if let Some(root) = &params.scan_root {
            let scanner = StructureScanner::new(&client, &rules, self.scan_depth(params.deep));
            let tree = scanner.scan(root).await?;
            for url in flatten_product_urls(&tree) {
                if !targets.contains(&url) {
                    targets.push(url);
                }
            }
        }
        if targets.is_empty() {
            return Err(EngineError::InvalidSpec(
                "planning produced no extraction targets".to_string(),
            ));
        }

        // Idempotent resume: targets already staged `ok` are not re-fetched.
        let ok_urls: HashSet<String> = vcat_db::list_ok_staging_urls(&self.pool, job_id)
            .await?
            .into_iter()
            .collect();
        let total = targets.len();
        let pending: Vec<String> = targets
            .into_iter()
            .filter(|url| !ok_urls.contains(url))
            .collect();
        let already_ok = total - pending.len();

        vcat_db::reset_job_progress(
            &self.pool,
            job_id,
            saturating_i32(total),
            saturating_i32(already_ok),
        )
        .await?;
        tracing::info!(job_id, total, skipped = already_ok, "dispatching extraction targets");

        let session = Mutex::new(session);
        let dispatched = worker::run_pool(
            pending,
            self.config.crawler_workers,
            token,
            |url| {
                let client = &client;
                let session = &session;
                let rules = &rules;
                async move {
                    let outcome = worker::process_target(client, session, rules, &url).await;
                    self.report_item_result(job_id, &url, &outcome).await;
                }
            },
        )
        .await;
        tracing::info!(job_id, dispatched, "worker pool drained");

        let (cancelled, purge) = {
            let active = self.active.lock().await;
            active
                .get(&job_id)
                .map_or((token.is_cancelled(), false), |entry| {
                    (entry.token.is_cancelled(), entry.purge_requested)
                })
        };
        if cancelled {
            return self.finish_stopped(job_id, profile.id, purge).await;
        }

        // Failure-threshold policy: tolerate scattered item errors, fail the
        // job when the site as a whole looks broken or unreachable.
        let job = vcat_db::get_job(&self.pool, job_id).await?;
        if job.total_targets > 0 {
            let failed_fraction = f64::from(job.failed) / f64::from(job.total_targets);
            if failed_fraction > self.config.job_failure_threshold {
                return Err(EngineError::ThresholdExceeded {
                    failed: job.failed,
                    total: job.total_targets,
                });
            }
        }

        vcat_db::mark_waiting_commit(&self.pool, job_id).await?;
        let summary = commit::run_commit(&self.pool, profile.id, job_id).await?;
        vcat_db::complete_job(&self.pool, job_id, &summary.to_json()).await?;
        Ok(())
    }

    async fn finish_stopped(
        &self,
        job_id: i64,
        profile_id: i64,
        purge: bool,
    ) -> Result<(), EngineError> {
        if purge {
            let staging = vcat_db::delete_staging_for_job(&self.pool, job_id).await?;
            let products = vcat_db::delete_products_for_job(&self.pool, job_id).await?;
            tracing::info!(job_id, staging, products, "purged job data on stop");
            vcat_db::stop_job(&self.pool, job_id, None).await?;
            return Ok(());
        }

        if self.config.commit_on_stop {
            let summary = commit::run_commit(&self.pool, profile_id, job_id).await?;
            tracing::info!(job_id, promoted = summary.promoted, "partial commit on stop");
            vcat_db::stop_job(&self.pool, job_id, Some(&summary.to_json())).await?;
        } else {
            vcat_db::stop_job(&self.pool, job_id, None).await?;
        }
        Ok(())
    }

    fn scan_depth(&self, deep: bool) -> usize {
        if deep {
            self.config.scan_max_depth
        } else {
            1
        }
    }
}

fn auth_failure(e: ScrapeError) -> EngineError {
    match e {
        ScrapeError::AuthFailed { reason } => EngineError::AuthFailed(reason),
        other => EngineError::AuthFailed(other.to_string()),
    }
}

fn saturating_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

async fn fail_job_best_effort(pool: &PgPool, job_id: i64, message: &str) {
    if let Err(e) = vcat_db::fail_job(pool, job_id, message).await {
        tracing::error!(job_id, error = %e, "failed to record job failure");
    }
}
