//! Vote toggle handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::logging;
use crate::storage::VoteTarget;
use crate::votes::{self, VoteError};
use crate::web::state::SharedState;
use crate::web::utils::{actor_id, api_error};

pub async fn vote_rating_handler(
    State(state): State<SharedState>,
    Path(rating_id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    toggle_response(state, headers, VoteTarget::Rating(rating_id)).await
}

pub async fn vote_comment_handler(
    State(state): State<SharedState>,
    Path(comment_id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    toggle_response(state, headers, VoteTarget::Comment(comment_id)).await
}

async fn toggle_response(state: SharedState, headers: HeaderMap, target: VoteTarget) -> Response {
    let actor = match actor_id(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let st = state.lock().await;
    match votes::toggle(&st.storage, actor, target) {
        Ok(outcome) => {
            crate::slog!(
                "vote {:?} by {} on target {} (count now {})",
                outcome.state,
                logging::user_id(actor),
                target.id(),
                outcome.count
            );
            let json = serde_json::json!({
                "state": outcome.state,
                "count": outcome.count,
            });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(VoteError::NotFound) => api_error(StatusCode::NOT_FOUND, "vote target not found"),
        Err(VoteError::SelfVote) => {
            api_error(StatusCode::FORBIDDEN, "cannot vote on your own post")
        }
        Err(VoteError::Storage(e)) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
