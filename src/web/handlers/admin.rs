//! Admin handlers: bulk CSV ingest and maintenance operations.
//!
//! Authorization happens upstream; these handlers only re-check the admin
//! flag on the acting user's row before touching anything.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::ingest::{self, IngestError, IngestStatus};
use crate::storage::EntityKind;
use crate::web::state::SharedState;
use crate::web::utils::{api_error, require_admin};

/// `POST /api/admin/ingest/:kind` — CSV body; returns the structured report
/// with created/updated counts and per-row errors. Response status reflects
/// the batch outcome: 200 full success, 207 partial, 400 nothing ingested.
pub async fn ingest_csv_handler(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let kind = match EntityKind::parse(&kind) {
        Some(k) => k,
        None => {
            return api_error(
                StatusCode::BAD_REQUEST,
                "entity kind must be supplement, condition, or brand",
            )
        }
    };

    let st = state.lock().await;
    if let Err(resp) = require_admin(&headers, &st.storage) {
        return resp;
    }

    match ingest::ingest_csv(&st.storage, kind, &body) {
        Ok(report) => {
            let status = match report.status() {
                IngestStatus::Full => StatusCode::OK,
                IngestStatus::Partial => StatusCode::MULTI_STATUS,
                IngestStatus::Failed => StatusCode::BAD_REQUEST,
            };
            let json = serde_json::json!({
                "status": report.status(),
                "created": report.created,
                "updated": report.updated,
                "row_errors": report.row_errors,
            });
            (status, axum::Json(json)).into_response()
        }
        Err(e @ (IngestError::Malformed(_) | IngestError::MissingColumn(_) | IngestError::Empty)) => {
            api_error(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `POST /api/admin/recount-upvotes` — re-derive every upvote counter from
/// the voter rows. The counters are caches; this is the repair path.
pub async fn recount_upvotes_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Response {
    let st = state.lock().await;
    if let Err(resp) = require_admin(&headers, &st.storage) {
        return resp;
    }

    match st.storage.recount_upvotes() {
        Ok(corrected) => {
            crate::slog!("recount: {} counter(s) corrected", corrected);
            let json = serde_json::json!({ "corrected": corrected });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct RenameBrandRequest {
    new_name: String,
}

/// `POST /api/admin/brands/:name/rename` — rename a brand and rewrite the
/// denormalized brand text on affected ratings.
pub async fn rename_brand_handler(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<RenameBrandRequest>,
) -> Response {
    let new_name = req.new_name.trim();
    if new_name.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "new_name required");
    }

    let st = state.lock().await;
    if let Err(resp) = require_admin(&headers, &st.storage) {
        return resp;
    }

    match st.storage.rename_brand(&name, new_name) {
        Ok(rewritten) => {
            crate::slog!(
                "brand '{}' renamed to '{}', {} rating(s) rewritten",
                name,
                new_name,
                rewritten
            );
            let json = serde_json::json!({ "ratings_rewritten": rewritten });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(crate::storage::StorageError::NotFound(msg)) => api_error(StatusCode::NOT_FOUND, msg),
        Err(crate::storage::StorageError::AlreadyExists(msg)) => {
            api_error(StatusCode::CONFLICT, msg)
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
