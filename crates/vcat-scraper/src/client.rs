//! HTTP client for fetching vendor catalog pages.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::error::ScrapeError;
use crate::rate_limit::{retry_with_backoff, DomainLimiter};

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// HTTP client for vendor pages.
///
/// One instance serves a single job: its cookie store carries the session
/// established by the auth manager and is discarded with the job. Rate
/// limiting is shared process-wide through the injected [`DomainLimiter`];
/// transient errors (429, network failures, timeouts) are retried with
/// exponential backoff up to `max_retries` additional attempts.
pub struct PageClient {
    client: Client,
    max_retries: u32,
    backoff_base_secs: u64,
    limiter: Arc<DomainLimiter>,
}

impl PageClient {
    /// Creates a `PageClient` with configured timeout, `User-Agent`, retry
    /// policy, and shared per-domain limiter.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed (e.g., invalid TLS config).
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_secs: u64,
        limiter: Arc<DomainLimiter>,
    ) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .cookie_store(true)
            .build()?;
        Ok(Self {
            client,
            max_retries,
            backoff_base_secs,
            limiter,
        })
    }

    /// Fetches one page and returns its body as text.
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::RateLimited`] — HTTP 429 after all retries exhausted.
    /// - [`ScrapeError::NotFound`] — HTTP 404 (not retried).
    /// - [`ScrapeError::UnexpectedStatus`] — any other non-2xx status.
    /// - [`ScrapeError::Timeout`] — per-target load timeout, retries exhausted.
    /// - [`ScrapeError::Http`] — network or TLS failure, retries exhausted.
    pub async fn fetch_page(&self, url: &str) -> Result<String, ScrapeError> {
        let domain = domain_of(url);

        retry_with_backoff(self.max_retries, self.backoff_base_secs, || {
            let url = url.to_owned();
            let domain = domain.clone();
            async move {
                self.limiter.acquire(&domain).await;

                let response = self
                    .client
                    .get(&url)
                    .header(reqwest::header::ACCEPT, HTML_ACCEPT)
                    .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
                    .send()
                    .await
                    .map_err(|e| classify_transport_error(e, &url))?;

                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    let retry_after_secs = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(60);

                    return Err(ScrapeError::RateLimited {
                        domain,
                        retry_after_secs,
                    });
                }

                if status == reqwest::StatusCode::NOT_FOUND {
                    return Err(ScrapeError::NotFound { url });
                }

                if !status.is_success() {
                    return Err(ScrapeError::UnexpectedStatus {
                        status: status.as_u16(),
                        url,
                    });
                }

                response
                    .text()
                    .await
                    .map_err(|e| classify_transport_error(e, &url))
            }
        })
        .await
    }

    /// Submits a form POST (login flows) and returns the final response body
    /// and status after redirects.
    ///
    /// Not retried: replaying a login submission on a flaky connection risks
    /// lockouts, and the session manager treats any failure as `AuthFailed`.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Timeout`] or [`ScrapeError::Http`] on transport
    /// failure.
    pub async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<(reqwest::StatusCode, String), ScrapeError> {
        let domain = domain_of(url);
        self.limiter.acquire(&domain).await;

        let response = self
            .client
            .post(url)
            .form(fields)
            .send()
            .await
            .map_err(|e| classify_transport_error(e, url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(e, url))?;

        Ok((status, body))
    }
}

/// Maps a transport-level `reqwest::Error` to the scrape taxonomy,
/// distinguishing per-target timeouts from other network failures.
fn classify_transport_error(err: reqwest::Error, url: &str) -> ScrapeError {
    if err.is_timeout() {
        ScrapeError::Timeout {
            url: url.to_owned(),
        }
    } else {
        ScrapeError::Http(err)
    }
}

/// Extracts the host portion of a URL for rate-limiter keying.
///
/// Unparseable URLs fall back to the raw string so they still serialize
/// behind a single key instead of bypassing the limiter.
#[must_use]
pub fn domain_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| url.to_owned())
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
