//! Handler-level tests driven without a listening socket.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use stackrate::storage::Storage;
use stackrate::web::handlers::ratings::{create_rating_handler, CreateRatingRequest};
use stackrate::web::state::{AppState, SharedState};

fn shared_state() -> SharedState {
    let storage = Storage::open_in_memory().unwrap();
    Arc::new(tokio::sync::Mutex::new(AppState { storage }))
}

fn actor_headers(id: i64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-user-id", id.to_string().parse().unwrap());
    headers
}

fn rating_request(supplement_id: i64, score: i64) -> CreateRatingRequest {
    serde_json::from_value(serde_json::json!({
        "supplement_id": supplement_id,
        "score": score,
    }))
    .unwrap()
}

#[tokio::test]
async fn create_rating_rejects_missing_supplement() {
    let state = shared_state();
    let author = {
        let st = state.lock().await;
        st.storage.create_user("author", false).unwrap()
    };

    let resp = create_rating_handler(
        State(state),
        actor_headers(author),
        axum::Json(rating_request(42, 4)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_rating_accepts_existing_supplement() {
    let state = shared_state();
    let (author, supp) = {
        let st = state.lock().await;
        let author = st.storage.create_user("author", false).unwrap();
        let supp = st
            .storage
            .create_supplement("Zinc", "Minerals", None)
            .unwrap();
        (author, supp)
    };

    let resp = create_rating_handler(
        State(state),
        actor_headers(author),
        axum::Json(rating_request(supp, 5)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}
