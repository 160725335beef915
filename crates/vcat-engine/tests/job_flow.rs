//! End-to-end job lifecycle tests: orchestrator + worker pool + committer
//! against a mock vendor site and a per-test migrated database.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sqlx::PgPool;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vcat_core::{AppConfig, Environment, JobType};
use vcat_engine::{EngineError, JobSpec, Orchestrator};

fn test_config(commit_on_stop: bool) -> Arc<AppConfig> {
    Arc::new(AppConfig {
        database_url: "postgres://unused".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        log_level: "info".to_string(),
        db_max_connections: 5,
        db_min_connections: 1,
        db_acquire_timeout_secs: 5,
        crawler_request_timeout_secs: 5,
        crawler_user_agent: "vcat-test/0.1".to_string(),
        crawler_workers: 4,
        crawler_inter_request_delay_ms: 0,
        crawler_max_retries: 0,
        crawler_retry_backoff_base_secs: 0,
        scan_max_depth: 3,
        job_failure_threshold: 0.5,
        commit_on_stop,
    })
}

async fn seed_profile(pool: &PgPool, name: &str) -> Uuid {
    let public_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO profiles (public_id, name, domain_root) VALUES ($1, $2, $3)",
    )
    .bind(public_id)
    .bind(name)
    .bind(format!("https://{name}.example.com"))
    .execute(pool)
    .await
    .expect("seed profile");
    public_id
}

async fn seed_auth_profile(pool: &PgPool, name: &str, login_url: &str) -> Uuid {
    let credential_id: i64 = sqlx::query_scalar(
        "INSERT INTO credentials (name, service_url, username, secret_enc) \
         VALUES ($1, $2, 'buyer@example.com', $3) RETURNING id",
    )
    .bind(format!("{name} portal"))
    .bind(login_url)
    .bind(BASE64.encode("hunter2"))
    .fetch_one(pool)
    .await
    .expect("seed credential");

    let public_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO profiles (public_id, name, domain_root, auth_required, credential_id) \
         VALUES ($1, $2, $3, TRUE, $4)",
    )
    .bind(public_id)
    .bind(name)
    .bind(format!("https://{name}.example.com"))
    .bind(credential_id)
    .execute(pool)
    .await
    .expect("seed auth profile");
    public_id
}

fn product_page(name: &str, canonical_path: &str) -> String {
    format!(
        r#"<html><head><link rel="canonical" href="{canonical_path}" /></head>
        <body><h1>{name}</h1><span class="sku">{name}-SKU</span></body></html>"#
    )
}

async fn mount_product(server: &MockServer, route: &str, name: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(product_page(name, route)))
        .mount(server)
        .await;
}

fn bulk_spec(profile_id: Uuid, urls: Vec<String>) -> JobSpec {
    JobSpec {
        profile_id,
        job_type: JobType::BulkExtract,
        target_urls: urls,
        scan_root: None,
        deep: false,
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn ten_targets_with_two_errors_complete_with_summary(pool: PgPool) {
    let server = MockServer::start().await;
    for i in 0..8 {
        mount_product(&server, &format!("/products/p{i}"), &format!("P{i}")).await;
    }
    for i in 8..10 {
        Mock::given(method("GET"))
            .and(path(format!("/products/p{i}")))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
    }

    let orchestrator = Arc::new(Orchestrator::new(pool.clone(), test_config(true)));
    let profile_id = seed_profile(&pool, "ten-targets").await;
    let urls = (0..10)
        .map(|i| format!("{}/products/p{i}", server.uri()))
        .collect();

    let job = orchestrator
        .submit(&bulk_spec(profile_id, urls))
        .await
        .expect("submit");
    assert_eq!(job.status, "pending");

    let job = Arc::clone(&orchestrator)
        .run(job.id)
        .await
        .expect("run to completion");

    assert_eq!(job.status, "completed");
    assert_eq!(job.total_targets, 10);
    assert_eq!(job.processed, 10);
    assert_eq!(job.succeeded, 8);
    assert_eq!(job.failed, 2);
    assert_eq!(job.processed, job.succeeded + job.failed);

    let summary = job.summary.expect("summary populated");
    assert_eq!(summary["promoted"], 8);
    assert_eq!(summary["errors"], 2);

    // Two error staging rows with typed causes remain visible.
    let rows = vcat_db::list_staging_items(&pool, job.id).await.expect("staging");
    assert_eq!(rows.len(), 10);
    assert_eq!(rows.iter().filter(|r| r.status == "error").count(), 2);
    assert!(rows
        .iter()
        .filter(|r| r.status == "error")
        .all(|r| r.error_detail.as_deref().is_some_and(|d| d.starts_with("http_status"))));
}

#[sqlx::test(migrations = "../../migrations")]
async fn failed_login_fails_job_before_any_dispatch(pool: PgPool) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<form action="/sessions"><input type="email" name="u"/><input type="password" name="p"/></form>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    mount_product(&server, "/products/secret", "Secret").await;

    let orchestrator = Arc::new(Orchestrator::new(pool.clone(), test_config(true)));
    let login_url = format!("{}/login", server.uri());
    let profile_id = seed_auth_profile(&pool, "auth-site", &login_url).await;

    let job = orchestrator
        .submit(&bulk_spec(
            profile_id,
            vec![format!("{}/products/secret", server.uri())],
        ))
        .await
        .expect("submit");

    let result = Arc::clone(&orchestrator).run(job.id).await;
    assert!(
        matches!(result, Err(EngineError::AuthFailed(_))),
        "expected AuthFailed, got: {result:?}"
    );

    let job = vcat_db::get_job(&pool, job.id).await.expect("get job");
    assert_eq!(job.status, "failed");
    assert!(job
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("authentication failed")));

    // Zero staging rows, zero workers dispatched.
    assert!(vcat_db::list_staging_items(&pool, job.id)
        .await
        .expect("staging")
        .is_empty());
    let product_hits = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().starts_with("/products/"))
        .count();
    assert_eq!(product_hits, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn resume_skips_targets_already_staged_ok(pool: PgPool) {
    let server = MockServer::start().await;
    mount_product(&server, "/products/a", "A").await;
    mount_product(&server, "/products/b", "B").await;

    let orchestrator = Arc::new(Orchestrator::new(pool.clone(), test_config(true)));
    let profile_public = seed_profile(&pool, "resume-site").await;
    let profile = vcat_db::get_profile_by_public_id(&pool, profile_public)
        .await
        .expect("profile query")
        .expect("profile exists");

    let url_a = format!("{}/products/a", server.uri());
    let url_b = format!("{}/products/b", server.uri());

    // An interrupted earlier run: job stuck in `running` with A staged ok.
    let job = vcat_db::create_job(
        &pool,
        profile.id,
        "bulk_extract",
        &serde_json::json!({ "target_urls": [url_a, url_b] }),
    )
    .await
    .expect("create");
    vcat_db::start_job(&pool, job.id).await.expect("start");
    vcat_db::upsert_staging_item(
        &pool,
        job.id,
        &url_a,
        "ok",
        None,
        Some(&serde_json::json!({"name": "A", "canonical_url": url_a})),
    )
    .await
    .expect("stage A");

    let job = Arc::clone(&orchestrator)
        .run(job.id)
        .await
        .expect("resume run");

    assert_eq!(job.status, "completed");
    assert_eq!(job.total_targets, 2);
    assert_eq!(job.processed, 2);
    assert_eq!(job.succeeded, 2);

    // A was never re-fetched.
    let a_hits = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/products/a")
        .count();
    assert_eq!(a_hits, 0, "ok-staged targets are not re-fetched on resume");

    // And nothing was duplicated.
    let rows = vcat_db::list_staging_items(&pool, job.id).await.expect("staging");
    assert_eq!(rows.len(), 2);
    assert_eq!(
        vcat_db::count_products(&pool, Some(profile.id))
            .await
            .expect("count"),
        2
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn shared_canonical_url_commits_to_one_product(pool: PgPool) {
    let server = MockServer::start().await;
    // Two page URLs declaring the same canonical product.
    for route in ["/products/mixer-red", "/products/mixer-blue"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(product_page("Mixer", "/products/mixer")),
            )
            .mount(&server)
            .await;
    }

    let orchestrator = Arc::new(Orchestrator::new(pool.clone(), test_config(true)));
    let profile_public = seed_profile(&pool, "canonical-site").await;
    let profile = vcat_db::get_profile_by_public_id(&pool, profile_public)
        .await
        .expect("profile query")
        .expect("profile exists");

    let job = orchestrator
        .submit(&bulk_spec(
            profile_public,
            vec![
                format!("{}/products/mixer-red", server.uri()),
                format!("{}/products/mixer-blue", server.uri()),
            ],
        ))
        .await
        .expect("submit");
    let job = Arc::clone(&orchestrator).run(job.id).await.expect("run");

    assert_eq!(job.status, "completed");
    let summary = job.summary.expect("summary");
    assert_eq!(summary["promoted"], 1);
    assert_eq!(summary["skipped"], 1);
    assert_eq!(
        vcat_db::count_products(&pool, Some(profile.id))
            .await
            .expect("count"),
        1,
        "exactly one product row per canonical key"
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn majority_failures_trip_the_threshold(pool: PgPool) {
    let server = MockServer::start().await;
    mount_product(&server, "/products/only-good", "Good").await;
    for route in ["/products/bad1", "/products/bad2", "/products/bad3"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
    }

    let orchestrator = Arc::new(Orchestrator::new(pool.clone(), test_config(true)));
    let profile_id = seed_profile(&pool, "threshold-site").await;
    let urls = vec![
        format!("{}/products/only-good", server.uri()),
        format!("{}/products/bad1", server.uri()),
        format!("{}/products/bad2", server.uri()),
        format!("{}/products/bad3", server.uri()),
    ];

    let job = orchestrator
        .submit(&bulk_spec(profile_id, urls))
        .await
        .expect("submit");
    let result = Arc::clone(&orchestrator).run(job.id).await;
    assert!(
        matches!(result, Err(EngineError::ThresholdExceeded { failed: 3, total: 4 })),
        "expected ThresholdExceeded, got: {result:?}"
    );

    let job = vcat_db::get_job(&pool, job.id).await.expect("get");
    assert_eq!(job.status, "failed");
    assert!(job
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("failure threshold exceeded")));
}

#[sqlx::test(migrations = "../../migrations")]
async fn stop_with_purge_leaves_no_job_data(pool: PgPool) {
    let orchestrator = Arc::new(Orchestrator::new(pool.clone(), test_config(true)));
    let profile_public = seed_profile(&pool, "purge-site").await;
    let profile = vcat_db::get_profile_by_public_id(&pool, profile_public)
        .await
        .expect("profile query")
        .expect("profile exists");

    // A driverless running job with staged and committed data.
    let job = vcat_db::create_job(&pool, profile.id, "bulk_extract", &serde_json::json!({}))
        .await
        .expect("create");
    vcat_db::start_job(&pool, job.id).await.expect("start");
    let url = "https://vendor.example.com/products/ghost";
    vcat_db::upsert_staging_item(
        &pool,
        job.id,
        url,
        "ok",
        None,
        Some(&serde_json::json!({"name": "Ghost", "canonical_url": url})),
    )
    .await
    .expect("stage");
    vcat_engine::run_commit(&pool, profile.id, job.id)
        .await
        .expect("commit");
    assert_eq!(
        vcat_db::count_products(&pool, Some(profile.id)).await.expect("count"),
        1
    );

    let job = orchestrator
        .request_stop(job.id, true)
        .await
        .expect("stop with purge");

    assert_eq!(job.status, "stopped");
    assert!(
        vcat_db::list_staging_items(&pool, job.id)
            .await
            .expect("staging")
            .is_empty(),
        "purge removes every staging row"
    );
    assert_eq!(
        vcat_db::count_products(&pool, Some(profile.id)).await.expect("count"),
        0,
        "purge removes job-provenance products"
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn stop_without_purge_commits_staged_items(pool: PgPool) {
    let orchestrator = Arc::new(Orchestrator::new(pool.clone(), test_config(true)));
    let profile_public = seed_profile(&pool, "stop-commit-site").await;
    let profile = vcat_db::get_profile_by_public_id(&pool, profile_public)
        .await
        .expect("profile query")
        .expect("profile exists");

    let job = vcat_db::create_job(&pool, profile.id, "bulk_extract", &serde_json::json!({}))
        .await
        .expect("create");
    vcat_db::start_job(&pool, job.id).await.expect("start");
    let url = "https://vendor.example.com/products/partial";
    vcat_db::upsert_staging_item(
        &pool,
        job.id,
        url,
        "ok",
        None,
        Some(&serde_json::json!({"name": "Partial", "canonical_url": url})),
    )
    .await
    .expect("stage");

    let job = orchestrator
        .request_stop(job.id, false)
        .await
        .expect("stop");

    assert_eq!(job.status, "stopped");
    let summary = job.summary.expect("partial commit summary");
    assert_eq!(summary["promoted"], 1);
    assert_eq!(
        vcat_db::count_products(&pool, Some(profile.id)).await.expect("count"),
        1,
        "commit-on-stop promotes already-staged items"
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn stop_without_purge_respects_disabled_commit_policy(pool: PgPool) {
    let orchestrator = Arc::new(Orchestrator::new(pool.clone(), test_config(false)));
    let profile_public = seed_profile(&pool, "stop-keep-site").await;
    let profile = vcat_db::get_profile_by_public_id(&pool, profile_public)
        .await
        .expect("profile query")
        .expect("profile exists");

    let job = vcat_db::create_job(&pool, profile.id, "bulk_extract", &serde_json::json!({}))
        .await
        .expect("create");
    vcat_db::start_job(&pool, job.id).await.expect("start");
    vcat_db::upsert_staging_item(
        &pool,
        job.id,
        "https://vendor.example.com/products/kept",
        "ok",
        None,
        Some(&serde_json::json!({"name": "Kept", "canonical_url": "https://vendor.example.com/products/kept"})),
    )
    .await
    .expect("stage");

    let job = orchestrator
        .request_stop(job.id, false)
        .await
        .expect("stop");

    assert_eq!(job.status, "stopped");
    // Staged rows are retained for a later manual commit, but not promoted.
    assert_eq!(
        vcat_db::list_staging_items(&pool, job.id)
            .await
            .expect("staging")
            .len(),
        1
    );
    assert_eq!(
        vcat_db::count_products(&pool, Some(profile.id)).await.expect("count"),
        0
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn invalid_spec_is_rejected_without_creating_a_job(pool: PgPool) {
    let orchestrator = Arc::new(Orchestrator::new(pool.clone(), test_config(true)));
    let profile_id = seed_profile(&pool, "invalid-spec-site").await;

    let result = orchestrator
        .submit(&bulk_spec(profile_id, vec![]))
        .await;
    assert!(matches!(result, Err(EngineError::InvalidSpec(_))));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
        .fetch_one(&pool)
        .await
        .expect("count jobs");
    assert_eq!(count, 0, "rejected submissions create no job row");
}

#[sqlx::test(migrations = "../../migrations")]
async fn unknown_profile_is_rejected(pool: PgPool) {
    let orchestrator = Arc::new(Orchestrator::new(pool.clone(), test_config(true)));
    let result = orchestrator
        .submit(&bulk_spec(
            Uuid::new_v4(),
            vec!["https://vendor.example.com/p/1".to_string()],
        ))
        .await;
    assert!(matches!(result, Err(EngineError::ProfileNotFound(_))));
}

#[sqlx::test(migrations = "../../migrations")]
async fn structure_scan_job_stores_the_tree(pool: PgPool) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
              <nav><a href="/kitchen">Kitchen taps</a></nav>
              <div class="product"><a href="/products/root-special">Special</a></div>
            </body></html>"#,
        ))
        .mount(&server)
        .await;
    mount_product(&server, "/kitchen", "Kitchen listing").await;

    let orchestrator = Arc::new(Orchestrator::new(pool.clone(), test_config(true)));
    let profile_id = seed_profile(&pool, "scan-site").await;

    let job = orchestrator
        .submit(&JobSpec {
            profile_id,
            job_type: JobType::StructureScan,
            target_urls: vec![],
            scan_root: Some(format!("{}/", server.uri())),
            deep: true,
        })
        .await
        .expect("submit");
    let job = Arc::clone(&orchestrator).run(job.id).await.expect("run");

    assert_eq!(job.status, "completed");
    let summary = job.summary.expect("summary");
    let tree = &summary["tree"];
    assert_eq!(tree["kind"], "category");
    assert!(
        tree["children"].as_array().is_some_and(|c| !c.is_empty()),
        "tree records discovered children"
    );

    // Scans only discover; they never stage or commit.
    assert!(vcat_db::list_staging_items(&pool, job.id)
        .await
        .expect("staging")
        .is_empty());
}
