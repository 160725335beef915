//! Selector-rule extraction of structured product data from vendor HTML.
//!
//! Selector drift is an expected, per-item condition: a page where no rule
//! matches yields [`ScrapeError::EmptyExtraction`] so the gap shows up in
//! job counters and staging records instead of vanishing silently.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;
use vcat_core::ExtractedProduct;

use crate::error::ScrapeError;

/// Profile-specific CSS selector set driving extraction.
///
/// Stored per profile as JSON; absent fields fall back to generic selectors
/// that cover common storefront markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionRules {
    /// Container of one product teaser on a category/listing page.
    pub product_card: String,
    pub product_name: String,
    pub product_link: String,
    pub product_image: String,
    /// Attachment links on a product page (spec sheets, models, archives).
    pub file_links: String,
    pub product_code: String,
    /// Breadcrumb / category trail on a product page.
    pub category: String,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self {
            product_card: "article, li.product, div.product, div.item, div.card".to_string(),
            product_name: "h1, h2, h3, .product-title, .name, .title".to_string(),
            product_link: "a".to_string(),
            product_image: "img".to_string(),
            file_links: "a[href$='.pdf'], a[href$='.zip'], a[href$='.dwg']".to_string(),
            product_code: ".sku, .code, .reference, [itemprop='sku']".to_string(),
            category: ".breadcrumb li, .breadcrumb a, nav.breadcrumb a".to_string(),
        }
    }
}

/// Compiles one selector rule, mapping parse failures to a typed error so a
/// broken profile configuration reads as such in staging records.
fn selector(rule: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(rule).map_err(|e| ScrapeError::InvalidSelector {
        selector: rule.to_string(),
        reason: e.to_string(),
    })
}

fn parse_base(url: &str) -> Result<Url, ScrapeError> {
    Url::parse(url).map_err(|e| ScrapeError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Resolves `href` against `base`, dropping fragment-only and scripting
/// pseudo-links.
fn absolutize(base: &Url, href: &str) -> Option<String> {
    let trimmed = href.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.starts_with("javascript:")
        || trimmed.starts_with("mailto:")
        || trimmed.starts_with("tel:")
    {
        return None;
    }
    base.join(trimmed).ok().map(Into::into)
}

fn first_text(doc: &Html, sel: &Selector) -> String {
    doc.select(sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn image_source(el: ElementRef<'_>) -> Option<&str> {
    el.value().attr("src").or_else(|| el.value().attr("data-src"))
}

/// Applies the profile's structural rules to one product page.
///
/// The canonical URL is taken from `<link rel="canonical">` when present,
/// falling back to the fetched URL.
///
/// # Errors
///
/// - [`ScrapeError::InvalidUrl`] / [`ScrapeError::InvalidSelector`] on bad inputs.
/// - [`ScrapeError::EmptyExtraction`] when no rule matched anything usable.
pub fn extract_product(
    html: &str,
    url: &str,
    rules: &ExtractionRules,
) -> Result<ExtractedProduct, ScrapeError> {
    let base = parse_base(url)?;
    let doc = Html::parse_document(html);

    let name = first_text(&doc, &selector(&rules.product_name)?);
    let guessed_code = first_text(&doc, &selector(&rules.product_code)?);

    let image_url = doc
        .select(&selector(&rules.product_image)?)
        .find_map(image_source)
        .and_then(|src| absolutize(&base, src))
        .unwrap_or_default();

    let mut file_urls: Vec<String> = Vec::new();
    for el in doc.select(&selector(&rules.file_links)?) {
        if let Some(href) = el.value().attr("href").and_then(|h| absolutize(&base, h)) {
            if !file_urls.contains(&href) {
                file_urls.push(href);
            }
        }
    }

    let category = doc
        .select(&selector(&rules.category)?)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" / ");

    let canonical_url = doc
        .select(&selector("link[rel='canonical']")?)
        .find_map(|el| el.value().attr("href"))
        .and_then(|href| absolutize(&base, href))
        .unwrap_or_else(|| url.to_string());

    let product = ExtractedProduct {
        name,
        canonical_url,
        image_url,
        file_urls,
        guessed_code,
        category,
    };

    if product.is_empty() {
        return Err(ScrapeError::EmptyExtraction {
            url: url.to_string(),
        });
    }

    Ok(product)
}

/// Collects product-page links from a category/listing page.
///
/// Walks each `product_card` match, takes the first `product_link` inside it
/// (or the card itself when the card is an anchor), absolutizes against the
/// page URL, and keeps only same-host links, deduplicated in page order.
///
/// # Errors
///
/// Returns [`ScrapeError::InvalidUrl`] or [`ScrapeError::InvalidSelector`]
/// on bad inputs.
pub fn extract_product_links(
    html: &str,
    url: &str,
    rules: &ExtractionRules,
) -> Result<Vec<String>, ScrapeError> {
    let base = parse_base(url)?;
    let doc = Html::parse_document(html);
    let card_sel = selector(&rules.product_card)?;
    let link_sel = selector(&rules.product_link)?;

    let mut links: Vec<String> = Vec::new();
    for card in doc.select(&card_sel) {
        let href = if card.value().name() == "a" {
            card.value().attr("href")
        } else {
            card.select(&link_sel)
                .find_map(|el| el.value().attr("href"))
        };

        let Some(link) = href.and_then(|h| absolutize(&base, h)) else {
            continue;
        };
        if !same_host(&base, &link) {
            continue;
        }
        if !links.contains(&link) {
            links.push(link);
        }
    }

    Ok(links)
}

fn same_host(base: &Url, link: &str) -> bool {
    Url::parse(link)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .is_some_and(|host| Some(host.as_str()) == base.host_str())
}

/// A login form discovered in page markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    /// Form action, unresolved; `None` means "post back to the page URL".
    pub action: Option<String>,
    pub username_field: String,
    pub password_field: String,
}

/// Detects a login prompt: any form carrying a password input.
///
/// The username field is the first text/email input in the same form;
/// common field names are used as fallbacks when inputs are unnamed.
#[must_use]
pub fn detect_login_form(html: &str) -> Option<LoginForm> {
    let doc = Html::parse_document(html);
    let form_sel = Selector::parse("form").ok()?;
    let password_sel = Selector::parse("input[type='password']").ok()?;
    let username_sel =
        Selector::parse("input[type='text'], input[type='email'], input:not([type])").ok()?;

    for form in doc.select(&form_sel) {
        let Some(password) = form.select(&password_sel).next() else {
            continue;
        };

        let password_field = password
            .value()
            .attr("name")
            .unwrap_or("password")
            .to_string();
        let username_field = form
            .select(&username_sel)
            .find_map(|el| el.value().attr("name"))
            .unwrap_or("username")
            .to_string();

        return Some(LoginForm {
            action: form.value().attr("action").map(str::to_string),
            username_field,
            password_field,
        });
    }

    None
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
