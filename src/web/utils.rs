//! Shared utility functions for the web layer.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::storage::{CommentRow, ConditionRole, RatingRow, Storage};

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

/// Resolve the acting user from the `X-User-Id` header placed by the
/// upstream auth layer. Authentication itself happens before requests reach
/// this server.
pub fn actor_id(headers: &HeaderMap) -> Result<i64, Response> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "missing or invalid X-User-Id header"))
}

/// Resolve the actor and require the admin flag on their user row.
pub fn require_admin(headers: &HeaderMap, storage: &Storage) -> Result<i64, Response> {
    let actor = actor_id(headers)?;
    match storage.get_user(actor) {
        Ok(Some(user)) if user.is_admin => Ok(actor),
        Ok(Some(_)) => Err(api_error(
            StatusCode::FORBIDDEN,
            "admin privileges required",
        )),
        Ok(None) => Err(api_error(StatusCode::UNAUTHORIZED, "unknown user")),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// Build the JSON representation of a rating including its condition tags
/// in all three roles.
pub fn rating_to_json(r: &RatingRow, storage: &Storage) -> serde_json::Value {
    let purposes = storage
        .rating_condition_names(r.id, ConditionRole::Purpose)
        .unwrap_or_default();
    let benefits = storage
        .rating_condition_names(r.id, ConditionRole::Benefit)
        .unwrap_or_default();
    let side_effects = storage
        .rating_condition_names(r.id, ConditionRole::SideEffect)
        .unwrap_or_default();

    serde_json::json!({
        "id": r.id,
        "user_id": r.user_id,
        "supplement_id": r.supplement_id,
        "score": r.score,
        "comment": r.comment,
        "dosage": r.dosage,
        "dosage_frequency": r.dosage_frequency,
        "frequency_unit": r.frequency_unit,
        "brands": r.brands,
        "upvote_count": r.upvote_count,
        "is_edited": r.is_edited,
        "conditions": purposes,
        "benefits": benefits,
        "side_effects": side_effects,
        "created_at": r.created_at,
        "updated_at": r.updated_at,
    })
}

/// Build the JSON representation of a comment including its reply count.
pub fn comment_to_json(c: &CommentRow, storage: &Storage) -> serde_json::Value {
    let reply_count = storage.list_replies(c.id).map(|r| r.len()).unwrap_or(0);
    serde_json::json!({
        "id": c.id,
        "rating_id": c.rating_id,
        "parent_comment_id": c.parent_comment_id,
        "user_id": c.user_id,
        "content": c.content,
        "upvote_count": c.upvote_count,
        "is_edited": c.is_edited,
        "reply_count": reply_count,
        "created_at": c.created_at,
    })
}
