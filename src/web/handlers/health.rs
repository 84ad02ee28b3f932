//! Health check handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::web::state::SharedState;

pub async fn health_handler(State(state): State<SharedState>) -> Response {
    // The lock round-trip doubles as a liveness check on the state.
    let _st = state.lock().await;
    let json = serde_json::json!({ "status": "ok" });
    (StatusCode::OK, axum::Json(json)).into_response()
}
