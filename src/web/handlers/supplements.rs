//! Supplement browsing handlers.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::ranking::{self, RankQuery, SortKey};
use crate::web::config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::web::state::SharedState;
use crate::web::utils::{api_error, rating_to_json};

/// `GET /api/supplements` — the ranked, filtered listing. Filter parameters
/// (`conditions`, `benefits`, `side_effects`, `brands`, `dosage`,
/// `frequency`) restrict which ratings are aggregated; `name` narrows the
/// supplements themselves; unknown parameters are ignored.
pub async fn list_supplements_handler(
    State(state): State<SharedState>,
    Query(mut params): Query<HashMap<String, String>>,
) -> Response {
    let name_search = params.remove("name");
    let sort = SortKey::parse(params.remove("sort_by").as_deref());
    let offset = params
        .remove("offset")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let limit = params
        .remove("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE);

    let query = RankQuery {
        filters: params,
        name_search,
        sort,
        offset,
        limit,
    };

    let st = state.lock().await;
    match ranking::rank(&st.storage, &query) {
        Ok(page) => (StatusCode::OK, axum::Json(serde_json::json!(page))).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `GET /api/supplements/:id` — one supplement with its unfiltered aggregate
/// and its ratings.
pub async fn get_supplement_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Response {
    let st = state.lock().await;

    let supplement = match st.storage.get_supplement(id) {
        Ok(Some(s)) => s,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "supplement not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let (avg_rating, rating_count) = match st.storage.supplement_aggregate(id) {
        Ok(agg) => agg,
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let ratings = st.storage.list_ratings_for_supplement(id).unwrap_or_default();
    let rating_json: Vec<serde_json::Value> = ratings
        .iter()
        .map(|r| rating_to_json(r, &st.storage))
        .collect();

    let json = serde_json::json!({
        "id": supplement.id,
        "name": supplement.name,
        "category": supplement.category,
        "dosage_unit": supplement.dosage_unit,
        "avg_rating": avg_rating,
        "rating_count": rating_count,
        "ratings": rating_json,
    });
    (StatusCode::OK, axum::Json(json)).into_response()
}

/// `GET /api/conditions` — reference listing for filter pickers.
pub async fn list_conditions_handler(State(state): State<SharedState>) -> Response {
    let st = state.lock().await;
    match st.storage.list_conditions() {
        Ok(conditions) => (StatusCode::OK, axum::Json(serde_json::json!(conditions))).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `GET /api/brands` — reference listing for filter pickers.
pub async fn list_brands_handler(State(state): State<SharedState>) -> Response {
    let st = state.lock().await;
    match st.storage.list_brands() {
        Ok(brands) => (StatusCode::OK, axum::Json(serde_json::json!(brands))).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
