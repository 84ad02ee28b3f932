//! stackrate-web: REST API server over the SQLite store.
//!
//! Serves ranked supplement browsing, ratings, threaded comments, vote
//! toggles, and admin CSV ingest. Authentication and sessions live in an
//! upstream layer; the acting user arrives as an `X-User-Id` header.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod utils;

use std::sync::Arc;

use clap::Parser;

use crate::storage::Storage;

use config::{Cli, Config};
use state::{AppState, SharedState};

/// Entry point: parse CLI, open the database, start the server.
pub async fn run() {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);

    crate::logging::init();

    crate::slog!("stackrate-web starting");
    crate::slog!("  data directory: {}", config.data_dir.display());

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        crate::slog!("failed to create data directory: {}", e);
        std::process::exit(1);
    }

    let db_path = config.db_path();
    let storage = match Storage::open(&db_path) {
        Ok(s) => s,
        Err(e) => {
            crate::slog!("failed to open database: {}", e);
            std::process::exit(1);
        }
    };
    crate::slog!("  database: {}", db_path.display());

    let state: SharedState = Arc::new(tokio::sync::Mutex::new(AppState { storage }));

    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    crate::slog!("stackrate-web listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
