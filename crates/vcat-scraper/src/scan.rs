//! Structure scanning: discovery of a site's category/product navigation
//! tree, used to preview a crawl plan and to generate bulk-job target lists.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::PageClient;
use crate::error::ScrapeError;
use crate::extract::{extract_product_links, ExtractionRules};

/// Navigation links worth exploring live in these containers.
const NAV_SELECTOR: &str = "nav a, .menu a, #menu a, .navigation a, .nav a, header a";

/// Link texts/paths that are navigation noise, not catalog structure.
const NOISE_WORDS: [&str; 12] = [
    "home", "login", "cart", "checkout", "contact", "about", "privacy", "policy", "news", "blog",
    "terms", "account",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Category,
    Product,
}

/// One node of the discovered navigation tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavNode {
    pub name: String,
    pub url: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NavNode>,
}

/// Walks a site's navigation structure breadth-wise from a root URL.
///
/// Cycle protection is twofold: a visited-URL set stops self-referential
/// navigation, and the depth bound caps recursion regardless.
pub struct StructureScanner<'a> {
    client: &'a PageClient,
    rules: &'a ExtractionRules,
    max_depth: usize,
}

impl<'a> StructureScanner<'a> {
    #[must_use]
    pub fn new(client: &'a PageClient, rules: &'a ExtractionRules, max_depth: usize) -> Self {
        Self {
            client,
            rules,
            max_depth,
        }
    }

    /// Scans from `root_url` and returns the discovered tree.
    ///
    /// Child pages that fail to load are logged and skipped — one broken
    /// category must not sink the whole scan — but a root fetch failure is
    /// a planning failure and propagates.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`ScrapeError`] when the root page cannot be
    /// fetched or the profile's selectors are invalid.
    pub async fn scan(&self, root_url: &str) -> Result<NavNode, ScrapeError> {
        let mut visited = HashSet::new();
        visited.insert(root_url.to_string());
        self.scan_page(root_url.to_string(), name_from_url(root_url), 0, &mut visited)
            .await
    }

    fn scan_page<'s>(
        &'s self,
        url: String,
        name: String,
        depth: usize,
        visited: &'s mut HashSet<String>,
    ) -> Pin<Box<dyn Future<Output = Result<NavNode, ScrapeError>> + Send + 's>> {
        Box::pin(async move {
            let html = self.client.fetch_page(&url).await?;

            let mut children = Vec::new();

            for link in extract_product_links(&html, &url, self.rules)? {
                if !visited.insert(link.clone()) {
                    continue;
                }
                children.push(NavNode {
                    name: name_from_url(&link),
                    url: link,
                    kind: NodeKind::Product,
                    children: Vec::new(),
                });
            }

            for (child_name, child_url) in category_links(&html, &url) {
                if !visited.insert(child_url.clone()) {
                    continue;
                }

                if depth + 1 >= self.max_depth {
                    // Depth bound reached: record the category, do not descend.
                    children.push(NavNode {
                        name: child_name,
                        url: child_url,
                        kind: NodeKind::Category,
                        children: Vec::new(),
                    });
                    continue;
                }

                match self
                    .scan_page(child_url.clone(), child_name.clone(), depth + 1, visited)
                    .await
                {
                    Ok(node) => children.push(node),
                    Err(e) => {
                        tracing::warn!(url = %child_url, error = %e, "skipping unreachable category");
                        children.push(NavNode {
                            name: child_name,
                            url: child_url,
                            kind: NodeKind::Category,
                            children: Vec::new(),
                        });
                    }
                }
            }

            Ok(NavNode {
                name,
                url,
                kind: NodeKind::Category,
                children,
            })
        })
    }
}

/// Collects candidate category links from navigation containers, filtered
/// for noise and kept on the page's host.
fn category_links(html: &str, page_url: &str) -> Vec<(String, String)> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let Ok(nav_sel) = Selector::parse(NAV_SELECTOR) else {
        return Vec::new();
    };

    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for el in doc.select(&nav_sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let text = el.text().collect::<String>().trim().to_string();
        if text.len() < 3 {
            continue;
        }

        let lowered = format!("{} {}", text.to_lowercase(), href.to_lowercase());
        if NOISE_WORDS.iter().any(|w| lowered.contains(w)) {
            continue;
        }

        let Some(resolved) = resolve_on_host(&base, href) else {
            continue;
        };
        if resolved == page_url || !seen.insert(resolved.clone()) {
            continue;
        }

        links.push((text, resolved));
    }

    links
}

fn resolve_on_host(base: &Url, href: &str) -> Option<String> {
    let trimmed = href.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("javascript:") {
        return None;
    }
    let joined = base.join(trimmed).ok()?;
    if joined.host_str() != base.host_str() {
        return None;
    }
    Some(joined.into())
}

/// Derives a display name from the last meaningful path segment of a URL.
fn name_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments().and_then(|segments| {
                segments
                    .filter(|s| !s.is_empty())
                    .next_back()
                    .map(|s| s.replace(['-', '_'], " "))
            })
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| url.to_string())
}

/// Flattens a scanned tree into the product-URL target list for a bulk job.
#[must_use]
pub fn flatten_product_urls(node: &NavNode) -> Vec<String> {
    let mut urls = Vec::new();
    let mut seen = HashSet::new();
    collect_product_urls(node, &mut urls, &mut seen);
    urls
}

fn collect_product_urls(node: &NavNode, urls: &mut Vec<String>, seen: &mut HashSet<String>) {
    if node.kind == NodeKind::Product && seen.insert(node.url.clone()) {
        urls.push(node.url.clone());
    }
    for child in &node.children {
        collect_product_urls(child, urls, seen);
    }
}
