use std::sync::Arc;

use clap::Args;
use uuid::Uuid;
use vcat_core::JobType;
use vcat_engine::{JobSpec, Orchestrator};

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// Profile to crawl under (public id).
    #[arg(long)]
    pub profile: Uuid,
    /// Explicit product page URL; repeatable.
    #[arg(long = "url")]
    pub urls: Vec<String>,
    /// Discover targets by scanning from this root URL instead of, or in
    /// addition to, explicit URLs.
    #[arg(long)]
    pub scan_root: Option<String>,
    /// Deep structure scan when planning from --scan-root.
    #[arg(long)]
    pub deep: bool,
}

pub async fn run(args: CrawlArgs) -> anyhow::Result<()> {
    let config = Arc::new(vcat_core::load_app_config()?);
    let pool = vcat_db::connect_pool(
        &config.database_url,
        vcat_db::PoolConfig::from_app_config(&config),
    )
    .await?;
    vcat_db::run_migrations(&pool).await?;

    let orchestrator = Arc::new(Orchestrator::new(pool, Arc::clone(&config)));

    let spec = JobSpec {
        profile_id: args.profile,
        job_type: JobType::BulkExtract,
        target_urls: args.urls,
        scan_root: args.scan_root,
        deep: args.deep,
    };

    let job = orchestrator.submit(&spec).await?;
    println!("job {} submitted", job.public_id);

    let job = orchestrator.run(job.id).await?;
    println!(
        "job {} {}: processed {} of {} (succeeded {}, failed {})",
        job.public_id, job.status, job.processed, job.total_targets, job.succeeded, job.failed
    );
    if let Some(summary) = &job.summary {
        println!("{}", serde_json::to_string_pretty(summary)?);
    }

    Ok(())
}
