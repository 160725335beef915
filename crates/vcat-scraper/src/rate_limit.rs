//! Rate limiting and retry utilities for page fetching.
//!
//! Two mechanisms compose here: [`retry_with_backoff`] retries a single
//! target on transient HTTP errors, and [`DomainLimiter`] spaces out
//! requests to the same vendor domain across every job in the process.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::ScrapeError;

/// Returns `true` if `err` represents a transient condition that should be
/// retried after a backoff delay.
///
/// Retriable errors:
/// - [`ScrapeError::RateLimited`] — HTTP 429; the server has asked us to back off.
/// - [`ScrapeError::Http`] — network-level failure (connection reset, TLS, etc.).
/// - [`ScrapeError::Timeout`] — the page may load on a quieter attempt.
///
/// Everything else (404s, non-2xx statuses, selector and extraction
/// problems, auth walls) is deterministic and propagated immediately.
fn is_retriable(err: &ScrapeError) -> bool {
    matches!(
        err,
        ScrapeError::RateLimited { .. } | ScrapeError::Http(_) | ScrapeError::Timeout { .. }
    )
}

/// Executes `operation` with exponential backoff retries on transient errors.
///
/// On a retriable error the function sleeps for
/// `backoff_base_secs * 2^attempt` seconds and tries again, up to
/// `max_retries` additional attempts after the first try. Non-retriable
/// errors are returned immediately without sleeping.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, ScrapeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScrapeError>>,
{
    let mut last_err;
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                last_err = err;
            }
        }

        // Exponential backoff: base * 2^attempt seconds, capped to avoid overflow.
        let delay_secs = backoff_base_secs.saturating_mul(1u64 << attempt.min(62));
        tracing::warn!(
            attempt,
            max_retries,
            delay_secs,
            error = %last_err,
            "transient fetch error — retrying after backoff"
        );
        tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        attempt += 1;
    }
}

/// Per-domain request spacing, shared across all jobs in the process.
///
/// `acquire` returns once the caller may hit the domain, recording the
/// dispatch time. Waiting happens outside the map lock, so one slow domain
/// never delays dispatch to another.
#[derive(Debug)]
pub struct DomainLimiter {
    delay: Duration,
    last_dispatch: Mutex<HashMap<String, Instant>>,
}

impl DomainLimiter {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_dispatch: Mutex::new(HashMap::new()),
        }
    }

    /// Waits until at least the configured delay has passed since the last
    /// dispatch to `domain`, then claims the slot.
    pub async fn acquire(&self, domain: &str) {
        loop {
            let wait = {
                let mut map = self.last_dispatch.lock().await;
                match map.get(domain) {
                    Some(last) => {
                        let elapsed = last.elapsed();
                        if elapsed >= self.delay {
                            map.insert(domain.to_owned(), Instant::now());
                            None
                        } else {
                            Some(self.delay - elapsed)
                        }
                    }
                    None => {
                        map.insert(domain.to_owned(), Instant::now());
                        None
                    }
                }
            };

            match wait {
                None => return,
                Some(remaining) => tokio::time::sleep(remaining).await,
            }
        }
    }
}
