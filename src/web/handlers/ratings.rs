//! Rating handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::storage::{NewRating, StorageError};
use crate::web::state::SharedState;
use crate::web::utils::{actor_id, api_error, comment_to_json, rating_to_json};

#[derive(Deserialize)]
pub struct CreateRatingRequest {
    supplement_id: i64,
    score: i64,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    dosage: Option<String>,
    #[serde(default)]
    dosage_frequency: Option<i64>,
    #[serde(default)]
    frequency_unit: Option<String>,
    #[serde(default)]
    brands: Option<String>,
    /// Condition ids per role.
    #[serde(default)]
    conditions: Vec<i64>,
    #[serde(default)]
    benefits: Vec<i64>,
    #[serde(default)]
    side_effects: Vec<i64>,
}

pub async fn create_rating_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<CreateRatingRequest>,
) -> Response {
    let actor = match actor_id(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let st = state.lock().await;

    match st.storage.get_supplement(req.supplement_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "supplement not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    let new = NewRating {
        user_id: actor,
        supplement_id: req.supplement_id,
        score: req.score,
        comment: req.comment,
        dosage: req.dosage,
        dosage_frequency: req.dosage_frequency,
        frequency_unit: req.frequency_unit,
        brands: req.brands,
        purposes: req.conditions,
        benefits: req.benefits,
        side_effects: req.side_effects,
    };

    match st.storage.create_rating(&new) {
        Ok(id) => {
            let rating = st.storage.get_rating(id).ok().flatten();
            match rating {
                Some(r) => (
                    StatusCode::CREATED,
                    axum::Json(rating_to_json(&r, &st.storage)),
                )
                    .into_response(),
                None => api_error(StatusCode::INTERNAL_SERVER_ERROR, "rating vanished"),
            }
        }
        Err(StorageError::AlreadyExists(msg)) => api_error(StatusCode::CONFLICT, msg),
        Err(StorageError::InvalidInput(msg)) => api_error(StatusCode::BAD_REQUEST, msg),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct UpdateRatingRequest {
    score: i64,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    brands: Option<String>,
}

/// `PUT /api/ratings/:id` — owner or admin only; sets the edited flag.
pub async fn update_rating_handler(
    State(state): State<SharedState>,
    Path(rating_id): Path<i64>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<UpdateRatingRequest>,
) -> Response {
    let actor = match actor_id(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let st = state.lock().await;

    let rating = match st.storage.get_rating(rating_id) {
        Ok(Some(r)) => r,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "rating not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let is_admin = st
        .storage
        .get_user(actor)
        .ok()
        .flatten()
        .map(|u| u.is_admin)
        .unwrap_or(false);
    if rating.user_id != actor && !is_admin {
        return api_error(StatusCode::FORBIDDEN, "only the owner may edit a rating");
    }

    match st.storage.update_rating(
        rating_id,
        req.score,
        req.comment.as_deref(),
        req.brands.as_deref(),
    ) {
        Ok(()) => match st.storage.get_rating(rating_id).ok().flatten() {
            Some(r) => {
                (StatusCode::OK, axum::Json(rating_to_json(&r, &st.storage))).into_response()
            }
            None => api_error(StatusCode::INTERNAL_SERVER_ERROR, "rating vanished"),
        },
        Err(StorageError::InvalidInput(msg)) => api_error(StatusCode::BAD_REQUEST, msg),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `GET /api/ratings/:id/comments` — comments attached directly to a rating.
pub async fn list_rating_comments_handler(
    State(state): State<SharedState>,
    Path(rating_id): Path<i64>,
) -> Response {
    let st = state.lock().await;

    match st.storage.get_rating(rating_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "rating not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    match st.storage.list_comments_for_rating(rating_id) {
        Ok(comments) => {
            let json: Vec<serde_json::Value> = comments
                .iter()
                .map(|c| comment_to_json(c, &st.storage))
                .collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
