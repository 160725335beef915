use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Application configuration, resolved once at startup and injected into the
/// stores and the orchestrator. Nothing downstream reads the environment.
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Per-target navigation/load timeout.
    pub crawler_request_timeout_secs: u64,
    pub crawler_user_agent: String,
    /// Width of the extraction worker pool per job.
    pub crawler_workers: usize,
    /// Minimum spacing between requests to the same domain, across all jobs.
    pub crawler_inter_request_delay_ms: u64,
    pub crawler_max_retries: u32,
    pub crawler_retry_backoff_base_secs: u64,
    /// Depth bound for deep structure scans; shallow scans use depth 1.
    pub scan_max_depth: usize,
    /// Fraction of failed targets above which the whole job fails.
    pub job_failure_threshold: f64,
    /// Whether a stop without data purge still promotes already-staged items.
    pub commit_on_stop: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"[redacted]")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "crawler_request_timeout_secs",
                &self.crawler_request_timeout_secs,
            )
            .field("crawler_user_agent", &self.crawler_user_agent)
            .field("crawler_workers", &self.crawler_workers)
            .field(
                "crawler_inter_request_delay_ms",
                &self.crawler_inter_request_delay_ms,
            )
            .field("crawler_max_retries", &self.crawler_max_retries)
            .field(
                "crawler_retry_backoff_base_secs",
                &self.crawler_retry_backoff_base_secs,
            )
            .field("scan_max_depth", &self.scan_max_depth)
            .field("job_failure_threshold", &self.job_failure_threshold)
            .field("commit_on_stop", &self.commit_on_stop)
            .finish()
    }
}
