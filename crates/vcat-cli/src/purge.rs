use std::sync::Arc;

use clap::Args;
use uuid::Uuid;
use vcat_engine::Orchestrator;

#[derive(Debug, Args)]
pub struct PurgeArgs {
    /// Job to purge (public id). Must be in a terminal state.
    #[arg(long)]
    pub job: Uuid,
}

pub async fn run(args: PurgeArgs) -> anyhow::Result<()> {
    let config = Arc::new(vcat_core::load_app_config()?);
    let pool = vcat_db::connect_pool(
        &config.database_url,
        vcat_db::PoolConfig::from_app_config(&config),
    )
    .await?;

    let job = vcat_db::get_job_by_public_id(&pool, args.job).await?;
    let orchestrator = Orchestrator::new(pool, Arc::clone(&config));
    orchestrator.purge_job(job.id).await?;
    println!("job {} purged", args.job);

    Ok(())
}
