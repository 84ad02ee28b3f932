//! Comment and reply-tree handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::storage::StorageError;
use crate::web::state::SharedState;
use crate::web::utils::{actor_id, api_error, comment_to_json};

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    #[serde(default)]
    rating_id: Option<i64>,
    #[serde(default)]
    parent_comment_id: Option<i64>,
    content: String,
}

pub async fn create_comment_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<CreateCommentRequest>,
) -> Response {
    let actor = match actor_id(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if req.content.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "content required");
    }

    let st = state.lock().await;
    match st
        .storage
        .create_comment(actor, req.rating_id, req.parent_comment_id, &req.content)
    {
        Ok(id) => match st.storage.get_comment(id).ok().flatten() {
            Some(c) => (
                StatusCode::CREATED,
                axum::Json(comment_to_json(&c, &st.storage)),
            )
                .into_response(),
            None => api_error(StatusCode::INTERNAL_SERVER_ERROR, "comment vanished"),
        },
        Err(StorageError::InvalidInput(msg)) => api_error(StatusCode::BAD_REQUEST, msg),
        Err(StorageError::NotFound(msg)) => api_error(StatusCode::NOT_FOUND, msg),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct UpdateCommentRequest {
    content: String,
}

/// `PUT /api/comments/:id` — owner or admin only; sets the edited flag.
pub async fn update_comment_handler(
    State(state): State<SharedState>,
    Path(comment_id): Path<i64>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<UpdateCommentRequest>,
) -> Response {
    let actor = match actor_id(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if req.content.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "content required");
    }

    let st = state.lock().await;
    let comment = match st.storage.get_comment(comment_id) {
        Ok(Some(c)) => c,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "comment not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let is_admin = st
        .storage
        .get_user(actor)
        .ok()
        .flatten()
        .map(|u| u.is_admin)
        .unwrap_or(false);
    if comment.user_id != actor && !is_admin {
        return api_error(StatusCode::FORBIDDEN, "only the owner may edit a comment");
    }

    match st.storage.update_comment(comment_id, &req.content) {
        Ok(()) => match st.storage.get_comment(comment_id).ok().flatten() {
            Some(c) => {
                (StatusCode::OK, axum::Json(comment_to_json(&c, &st.storage))).into_response()
            }
            None => api_error(StatusCode::INTERNAL_SERVER_ERROR, "comment vanished"),
        },
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `GET /api/comments/:id/replies` — direct replies plus the rating this
/// comment is ultimately about, resolved by walking the parent links.
pub async fn list_replies_handler(
    State(state): State<SharedState>,
    Path(comment_id): Path<i64>,
) -> Response {
    let st = state.lock().await;

    match st.storage.get_comment(comment_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "comment not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    let replies = match st.storage.list_replies(comment_id) {
        Ok(r) => r,
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let root_rating_id = st.storage.resolve_root_rating(comment_id).unwrap_or(None);

    let json: Vec<serde_json::Value> = replies
        .iter()
        .map(|c| comment_to_json(c, &st.storage))
        .collect();
    let body = serde_json::json!({
        "root_rating_id": root_rating_id,
        "replies": json,
    });
    (StatusCode::OK, axum::Json(body)).into_response()
}
