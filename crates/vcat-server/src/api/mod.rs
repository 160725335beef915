mod catalog;
mod jobs;
mod scan;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub orchestrator: Arc<vcat_engine::Orchestrator>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "upstream_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn map_db_error(request_id: String, error: &vcat_db::DbError) -> ApiError {
    if matches!(error, vcat_db::DbError::NotFound) {
        return ApiError::new(request_id, "not_found", "record not found");
    }
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

pub(super) fn map_engine_error(request_id: String, error: &vcat_engine::EngineError) -> ApiError {
    use vcat_engine::EngineError;

    match error {
        EngineError::InvalidSpec(reason) => {
            ApiError::new(request_id, "validation_error", reason.clone())
        }
        EngineError::ProfileNotFound(id) => {
            ApiError::new(request_id, "not_found", format!("profile {id} not found"))
        }
        EngineError::Db(e) => map_db_error(request_id, e),
        EngineError::Scrape(e) => {
            tracing::warn!(error = %e, "scrape failed behind the control surface");
            ApiError::new(request_id, "upstream_error", e.to_string())
        }
        other => {
            tracing::error!(error = %other, "engine operation failed");
            ApiError::new(request_id, "internal_error", other.to_string())
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/jobs", post(jobs::submit_job))
        .route("/api/v1/jobs/active", get(jobs::list_active_jobs))
        .route("/api/v1/jobs/{id}", get(jobs::get_job))
        .route("/api/v1/jobs/{id}/stop", post(jobs::stop_job))
        .route("/api/v1/scan-structure", post(scan::scan_structure))
        .route("/api/v1/catalog/products", get(catalog::list_products))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match vcat_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::jobs::JobItem;
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use tower::ServiceExt;
    use uuid::Uuid;
    use vcat_core::{AppConfig, Environment};

    fn test_config() -> Arc<AppConfig> {
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
            crawler_workers: 2,
            crawler_inter_request_delay_ms: 0,
            crawler_max_retries: 0,
            crawler_retry_backoff_base_secs: 0,
            scan_max_depth: 2,
            job_failure_threshold: 0.5,
            commit_on_stop: true,
        })
    }

    fn test_app(pool: sqlx::PgPool) -> Router {
        let orchestrator = Arc::new(vcat_engine::Orchestrator::new(pool.clone(), test_config()));
        let auth = AuthState::from_env(true).expect("auth");
        build_app(
            AppState { pool, orchestrator },
            auth,
            default_rate_limit_state(),
        )
    }

    async fn seed_profile(pool: &sqlx::PgPool, name: &str) -> (i64, Uuid) {
        let public_id = Uuid::new_v4();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO profiles (public_id, name, domain_root) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(public_id)
        .bind(name)
        .bind(format!("https://{name}.example.com"))
        .fetch_one(pool)
        .await
        .expect("seed profile");
        (id, public_id)
    }

    #[test]
    fn normalize_limit_applies_defaults_and_bounds() {
        assert_eq!(normalize_limit(None), 50);
        assert_eq!(normalize_limit(Some(0)), 1);
        assert_eq!(normalize_limit(Some(1_000)), 200);
        assert_eq!(normalize_limit(Some(25)), 25);
    }

    #[test]
    fn api_error_validation_error_maps_to_bad_request() {
        let response = ApiError::new("req-1", "validation_error", "invalid input").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn api_error_upstream_error_maps_to_bad_gateway() {
        let response = ApiError::new("req-1", "upstream_error", "site down").into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn job_item_is_serializable() {
        // Proves the type compiles and serde works — no DB needed.
        let item = JobItem {
            job_id: Uuid::new_v4(),
            job_type: "bulk_extract".to_string(),
            status: "running".to_string(),
            queued: 5,
            total_targets: 10,
            processed: 5,
            succeeded: 4,
            failed: 1,
            error_message: None,
            summary: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        };
        let json = serde_json::to_string(&item).expect("serialize");
        assert!(json.contains("\"status\":\"running\""));
        assert!(json.contains("\"queued\":5"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn submit_job_rejects_empty_specs(pool: sqlx::PgPool) {
        let (_, profile_public) = seed_profile(&pool, "api-empty-spec").await;
        let app = test_app(pool);

        let body = serde_json::json!({
            "profile_id": profile_public,
            "job_type": "bulk_extract",
            "target_urls": [],
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn submit_job_rejects_unknown_profile(pool: sqlx::PgPool) {
        let app = test_app(pool);

        let body = serde_json::json!({
            "profile_id": Uuid::new_v4(),
            "job_type": "bulk_extract",
            "target_urls": ["https://vendor.example.com/p/1"],
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn active_jobs_lists_non_terminal_with_derived_queue(pool: sqlx::PgPool) {
        let (profile_id, _) = seed_profile(&pool, "api-active").await;

        let job = vcat_db::create_job(
            &pool,
            profile_id,
            "bulk_extract",
            &serde_json::json!({"target_urls": ["https://v.example.com/p/1"]}),
        )
        .await
        .expect("create");
        vcat_db::start_job(&pool, job.id).await.expect("start");
        vcat_db::reset_job_progress(&pool, job.id, 10, 0)
            .await
            .expect("totals");
        for _ in 0..4 {
            vcat_db::increment_job_progress(&pool, job.id, true)
                .await
                .expect("progress");
        }

        let app = test_app(pool);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/jobs/active")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        let data = json["data"].as_array().expect("data array");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["status"], "running");
        assert_eq!(data[0]["processed"], 4);
        assert_eq!(data[0]["queued"], 6, "queued derives as total - processed");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn get_job_returns_404_for_unknown_id(pool: sqlx::PgPool) {
        let app = test_app(pool);
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/jobs/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn stop_endpoint_acknowledges_and_purges(pool: sqlx::PgPool) {
        let (profile_id, _) = seed_profile(&pool, "api-stop").await;
        let job = vcat_db::create_job(&pool, profile_id, "bulk_extract", &serde_json::json!({}))
            .await
            .expect("create");
        vcat_db::start_job(&pool, job.id).await.expect("start");
        vcat_db::upsert_staging_item(
            &pool,
            job.id,
            "https://v.example.com/p/1",
            "ok",
            None,
            Some(&serde_json::json!({"name": "P1", "canonical_url": "https://v.example.com/p/1"})),
        )
        .await
        .expect("stage");

        let app = test_app(pool.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/jobs/{}/stop", job.public_id))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"delete_data": true}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(json["data"]["status"], "stopped");

        assert!(vcat_db::list_staging_items(&pool, job.id)
            .await
            .expect("staging")
            .is_empty());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn catalog_products_paginate(pool: sqlx::PgPool) {
        let (profile_id, _) = seed_profile(&pool, "api-catalog").await;
        let job = vcat_db::create_job(&pool, profile_id, "bulk_extract", &serde_json::json!({}))
            .await
            .expect("provenance job");
        for i in 0..3 {
            let product = vcat_core::ExtractedProduct {
                name: format!("Product {i}"),
                canonical_url: format!("https://v.example.com/p/{i}"),
                ..vcat_core::ExtractedProduct::default()
            };
            vcat_db::upsert_product(&pool, profile_id, job.id, &product)
                .await
                .expect("seed product");
        }

        let app = test_app(pool);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/catalog/products?page=2&limit=2")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(json["data"]["total"], 3);
        assert_eq!(json["data"]["page"], 2);
        let items = json["data"]["items"].as_array().expect("items");
        assert_eq!(items.len(), 1, "second page holds the remainder");
        assert_eq!(items[0]["name"], "Product 2");
    }
}
