use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

fn test_client(max_retries: u32) -> PageClient {
    let limiter = Arc::new(DomainLimiter::new(Duration::from_millis(0)));
    PageClient::new(5, "vcat-test/0.1", max_retries, 0, limiter).expect("client builds")
}

#[test]
fn domain_of_extracts_host() {
    assert_eq!(
        domain_of("https://vendor.example.com/products/1?page=2"),
        "vendor.example.com"
    );
}

#[test]
fn domain_of_falls_back_to_raw_input() {
    assert_eq!(domain_of("not a url"), "not a url");
}

#[tokio::test]
async fn fetch_page_returns_body_on_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products/tap"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><h1>Tap</h1></html>"))
        .mount(&server)
        .await;

    let client = test_client(0);
    let body = client
        .fetch_page(&format!("{}/products/tap", server.uri()))
        .await
        .expect("fetch should succeed");
    assert!(body.contains("<h1>Tap</h1>"));
}

#[tokio::test]
async fn fetch_page_maps_404_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = test_client(3);
    let result = client.fetch_page(&format!("{}/missing", server.uri())).await;
    assert!(matches!(result, Err(ScrapeError::NotFound { .. })));
    // 404 is deterministic; only one request should have been made.
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn fetch_page_retries_429_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .mount(&server)
        .await;

    let client = test_client(3);
    let body = client
        .fetch_page(&format!("{}/products", server.uri()))
        .await
        .expect("should recover after retries");
    assert_eq!(body, "recovered");
}

#[tokio::test]
async fn fetch_page_surfaces_rate_limit_after_retries_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let client = test_client(1);
    let result = client.fetch_page(&format!("{}/products", server.uri())).await;
    match result {
        Err(ScrapeError::RateLimited {
            retry_after_secs, ..
        }) => assert_eq!(retry_after_secs, 7),
        other => panic!("expected RateLimited, got: {other:?}"),
    }
}

#[tokio::test]
async fn fetch_page_maps_5xx_to_unexpected_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = test_client(0);
    let result = client.fetch_page(&format!("{}/products", server.uri())).await;
    assert!(
        matches!(result, Err(ScrapeError::UnexpectedStatus { status: 503, .. })),
        "expected UnexpectedStatus(503), got: {result:?}"
    );
}
