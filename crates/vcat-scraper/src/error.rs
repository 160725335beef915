use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("timed out loading {url}")]
    Timeout { url: String },

    #[error("rate limited by {domain} (retry after {retry_after_secs}s)")]
    RateLimited {
        domain: String,
        retry_after_secs: u64,
    },

    #[error("page not found: {url}")]
    NotFound { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("selector \"{selector}\" is not valid CSS: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("no extractable fields at {url}")]
    EmptyExtraction { url: String },

    #[error("login prompt detected at {url}")]
    LoginDetected { url: String },

    #[error("authentication failed: {reason}")]
    AuthFailed { reason: String },
}

impl ScrapeError {
    /// Short machine-readable cause label, recorded alongside the full
    /// message in staging rows and result summaries.
    #[must_use]
    pub fn cause(&self) -> &'static str {
        match self {
            ScrapeError::Http(_) => "http",
            ScrapeError::Timeout { .. } => "timeout",
            ScrapeError::RateLimited { .. } => "rate_limited",
            ScrapeError::NotFound { .. } => "not_found",
            ScrapeError::UnexpectedStatus { .. } => "http_status",
            ScrapeError::InvalidUrl { .. } => "invalid_url",
            ScrapeError::InvalidSelector { .. } => "invalid_selector",
            ScrapeError::EmptyExtraction { .. } => "markup_drift",
            ScrapeError::LoginDetected { .. } => "auth_expired",
            ScrapeError::AuthFailed { .. } => "auth_failed",
        }
    }
}
