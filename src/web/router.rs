//! Axum router construction.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;

use crate::web::config::MAX_CSV_SIZE;
use crate::web::handlers;
use crate::web::state::SharedState;

/// Build the complete Axum router with all API routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_handler))
        // Supplements API
        .route(
            "/api/supplements",
            get(handlers::supplements::list_supplements_handler),
        )
        .route(
            "/api/supplements/:id",
            get(handlers::supplements::get_supplement_handler),
        )
        // Reference data
        .route(
            "/api/conditions",
            get(handlers::supplements::list_conditions_handler),
        )
        .route(
            "/api/brands",
            get(handlers::supplements::list_brands_handler),
        )
        // Ratings API
        .route("/api/ratings", post(handlers::ratings::create_rating_handler))
        .route(
            "/api/ratings/:id",
            put(handlers::ratings::update_rating_handler),
        )
        .route(
            "/api/ratings/:id/comments",
            get(handlers::ratings::list_rating_comments_handler),
        )
        .route(
            "/api/ratings/:id/vote",
            post(handlers::votes::vote_rating_handler),
        )
        // Comments API
        .route(
            "/api/comments",
            post(handlers::comments::create_comment_handler),
        )
        .route(
            "/api/comments/:id",
            put(handlers::comments::update_comment_handler),
        )
        .route(
            "/api/comments/:id/replies",
            get(handlers::comments::list_replies_handler),
        )
        .route(
            "/api/comments/:id/vote",
            post(handlers::votes::vote_comment_handler),
        )
        // Admin API
        .route(
            "/api/admin/ingest/:kind",
            post(handlers::admin::ingest_csv_handler)
                .layer(DefaultBodyLimit::max(MAX_CSV_SIZE)),
        )
        .route(
            "/api/admin/recount-upvotes",
            post(handlers::admin::recount_upvotes_handler),
        )
        .route(
            "/api/admin/brands/:name/rename",
            post(handlers::admin::rename_brand_handler),
        )
        .with_state(state)
}
