//! Configuration types and constants for the stackrate-web server.

use std::path::PathBuf;

use clap::Parser;

/// Hard cap on the page size a ranking request can ask for.
pub(crate) const MAX_PAGE_SIZE: u32 = 100;
pub(crate) const DEFAULT_PAGE_SIZE: u32 = 50;

/// Maximum CSV body accepted by the ingest endpoint.
pub(crate) const MAX_CSV_SIZE: usize = 5 * 1024 * 1024; // 5 MiB

/// Web server for the stackrate supplement-rating backend.
///
/// Serves a REST API over a SQLite database: ranked supplement browsing,
/// ratings, threaded comments, vote toggles, and admin CSV ingest.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "stackrate-web", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: STACKRATE_WEB_BIND] [default: 127.0.0.1:3000]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Data directory for the database [env: STACKRATE_HOME] [default: ~/.stackrate]
    #[arg(long, short = 'd')]
    pub data_dir: Option<PathBuf>,
}

pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let data_dir = cli
            .data_dir
            .or_else(|| std::env::var("STACKRATE_HOME").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".stackrate"))
                    .unwrap_or_else(|_| PathBuf::from(".stackrate"))
            });

        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("STACKRATE_WEB_BIND").ok())
            .unwrap_or_else(|| "127.0.0.1:3000".to_string());

        Self {
            bind_addr,
            data_dir,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("stackrate.db")
    }
}
