use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct ProductQuery {
    pub profile_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProductItem {
    product_id: i64,
    canonical_url: String,
    name: String,
    image_url: String,
    file_urls: serde_json::Value,
    guessed_code: String,
    category: String,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct PaginatedProducts {
    items: Vec<ProductItem>,
    page: i64,
    limit: i64,
    total: i64,
}

pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ApiResponse<PaginatedProducts>>, ApiError> {
    let profile_id = match query.profile_id {
        Some(public_id) => {
            let profile = vcat_db::get_profile_by_public_id(&state.pool, public_id)
                .await
                .map_err(|e| map_db_error(req_id.0.clone(), &e))?
                .ok_or_else(|| {
                    ApiError::new(
                        req_id.0.clone(),
                        "not_found",
                        format!("profile {public_id} not found"),
                    )
                })?;
            Some(profile.id)
        }
        None => None,
    };

    let limit = normalize_limit(query.limit);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * limit;

    let rows = vcat_db::list_products(&state.pool, profile_id, limit, offset)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let total = vcat_db::count_products(&state.pool, profile_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let items = rows
        .into_iter()
        .map(|row| ProductItem {
            product_id: row.id,
            canonical_url: row.canonical_url,
            name: row.name,
            image_url: row.image_url,
            file_urls: row.file_urls,
            guessed_code: row.guessed_code,
            category: row.category,
            updated_at: row.updated_at,
        })
        .collect();

    Ok(Json(ApiResponse {
        data: PaginatedProducts {
            items,
            page,
            limit,
            total,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
