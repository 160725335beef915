//! The extraction worker pool.
//!
//! Targets stream through a bounded `buffer_unordered` window; the
//! cancellation token is consulted as each target is dequeued, so a stop
//! request lets at most pool-width in-flight targets finish and dispatches
//! nothing new.

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use vcat_core::ExtractedProduct;
use vcat_scraper::{detect_login_form, extract_product, ExtractionRules, PageClient, ScrapeError, Session};

/// Outcome of one extraction attempt, as reported to the orchestrator.
#[derive(Debug)]
pub enum ItemOutcome {
    Ok(ExtractedProduct),
    Error(ScrapeError),
}

impl ItemOutcome {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self, ItemOutcome::Ok(_))
    }
}

/// Drives `targets` through up to `width` concurrent invocations of
/// `process`, honoring `token` cooperatively between targets.
///
/// Returns the number of targets actually dispatched; the remainder were
/// skipped after cancellation.
pub async fn run_pool<F, Fut>(
    targets: Vec<String>,
    width: usize,
    token: &CancellationToken,
    process: F,
) -> usize
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    stream::iter(targets)
        .filter(|_| futures::future::ready(!token.is_cancelled()))
        .map(process)
        .buffer_unordered(width.max(1))
        .count()
        .await
}

/// Fetches and extracts one target with a prepared session.
///
/// An interactive-mode login wall pauses the target, establishes the
/// session, and refetches once; a second wall on the refreshed page is an
/// item error, not a loop.
pub async fn process_target(
    client: &PageClient,
    session: &Mutex<Session<'_>>,
    rules: &ExtractionRules,
    url: &str,
) -> ItemOutcome {
    match fetch_and_extract(client, session, rules, url).await {
        Ok(product) => ItemOutcome::Ok(product),
        Err(e) => {
            tracing::debug!(url, cause = e.cause(), error = %e, "target extraction failed");
            ItemOutcome::Error(e)
        }
    }
}

async fn fetch_and_extract(
    client: &PageClient,
    session: &Mutex<Session<'_>>,
    rules: &ExtractionRules,
    url: &str,
) -> Result<ExtractedProduct, ScrapeError> {
    let mut html = client.fetch_page(url).await?;

    if let Some(form) = detect_login_form(&html) {
        {
            let mut session = session.lock().await;
            session.login_interactive(url, &form).await?;
        }
        html = client.fetch_page(url).await?;

        if detect_login_form(&html).is_some() {
            return Err(ScrapeError::LoginDetected {
                url: url.to_string(),
            });
        }
    }

    extract_product(&html, url, rules)
}
