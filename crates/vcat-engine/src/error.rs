use thiserror::Error;
use uuid::Uuid;

/// Job-level failures. Item-level extraction failures never surface here —
/// they are absorbed into staging rows and job counters.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid job spec: {0}")]
    InvalidSpec(String),

    #[error("profile {0} not found")]
    ProfileNotFound(Uuid),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("failure threshold exceeded: {failed} of {total} targets errored")]
    ThresholdExceeded { failed: i32, total: i32 },

    #[error(transparent)]
    Db(#[from] vcat_db::DbError),

    #[error(transparent)]
    Scrape(#[from] vcat_scraper::ScrapeError),
}
